use accord_recon::normalize::{canonical_code, clean_text, fold_key, format_minor, parse_money, Field};
use proptest::prelude::*;

fn value<T>(field: Field<T>) -> Option<T> {
    match field {
        Field::Value(v) => Some(v),
        _ => None,
    }
}

proptest! {
    #[test]
    fn clean_text_is_idempotent(raw in "\\PC{0,40}") {
        if let Some(once) = value(clean_text(&raw).field) {
            let twice = value(clean_text(&once).field);
            prop_assert_eq!(twice.as_deref(), Some(once.as_str()));
        }
    }

    #[test]
    fn fold_key_is_idempotent(raw in "\\PC{0,40}") {
        let once = fold_key(&raw);
        prop_assert_eq!(fold_key(&once), once);
    }

    #[test]
    fn fold_key_has_no_ascii_uppercase(raw in "[A-Za-zİIıÇŞĞÜÖ ]{0,30}") {
        prop_assert!(!fold_key(&raw).chars().any(|c| c.is_ascii_uppercase()));
    }

    #[test]
    fn canonical_code_is_idempotent(raw in "[a-zA-Z0-9 ._/-]{0,20}") {
        if let Some(once) = value(canonical_code(&raw).field) {
            let again = canonical_code(&once);
            prop_assert!(!again.modified);
            prop_assert_eq!(value(again.field), Some(once));
        }
    }

    #[test]
    fn formatted_minor_units_parse_back(minor in -10_000_000i64..10_000_000) {
        let parsed = value(parse_money(&format_minor(minor)).field);
        prop_assert_eq!(parsed.map(|m| m.minor), Some(minor));
    }
}
