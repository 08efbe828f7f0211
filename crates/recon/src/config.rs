use std::collections::BTreeMap;

use accord_core::EntityType;
use serde::Deserialize;

use crate::error::ProfileError;

// ---------------------------------------------------------------------------
// Ingestion profile
// ---------------------------------------------------------------------------

/// Declares how one kind of source maps onto one entity type.
///
/// ```toml
/// name = "crm-companies"
/// entity = "company"
///
/// [source]
/// kind = "delimited"
/// delimiter = ";"
///
/// [columns]
/// code = "Firma Kodu"
/// name = ["Firma Adı", "Unvan"]
///
/// [denylist]
/// entries = ["Test Firma"]
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestProfile {
    pub name: String,
    pub entity: EntityType,
    /// Rows with at least this many modified fields are flagged for review.
    #[serde(default = "default_review_threshold")]
    pub review_threshold: usize,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnAliases>,
    #[serde(default)]
    pub denylist: DenylistConfig,
}

fn default_review_threshold() -> usize {
    2
}

pub const SOURCE_KINDS: &[&str] = &["delimited", "workbook", "document"];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// One of [`SOURCE_KINDS`]; inferred from the file extension when unset.
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub sheet: Option<String>,
    #[serde(default)]
    pub delimiter: Option<String>,
    /// Field order of headerless documents, mapped by position.
    #[serde(default)]
    pub positional: Vec<String>,
}

impl SourceConfig {
    pub fn delimiter_byte(&self) -> Option<u8> {
        match self.delimiter.as_deref() {
            Some("\\t") | Some("tab") => Some(b'\t'),
            Some(d) if d.len() == 1 => d.bytes().next(),
            _ => None,
        }
    }
}

/// Source headers accepted for one field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ColumnAliases {
    One(String),
    Many(Vec<String>),
}

impl ColumnAliases {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s.clone()],
            Self::Many(v) => v.clone(),
        }
    }
}

/// Static known-bad names, merged with the store's runtime list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DenylistConfig {
    #[serde(default)]
    pub entries: Vec<String>,
}

// ---------------------------------------------------------------------------
// Fields per entity type
// ---------------------------------------------------------------------------

/// Fields a profile may map for `entity`.
pub fn known_fields(entity: EntityType) -> &'static [&'static str] {
    match entity {
        EntityType::Company => &["code", "name", "tax_id", "city", "phone", "email"],
        EntityType::Person => &[
            "code",
            "name",
            "first_name",
            "last_name",
            "company_code",
            "email",
            "phone",
            "title",
        ],
        EntityType::Product => &["code", "name", "unit", "unit_price", "currency"],
        EntityType::ProposalLine => &[
            "proposal_number",
            "line_number",
            "product_code",
            "description",
            "quantity",
            "unit_price",
            "currency",
            "issued_on",
        ],
    }
}

/// Fields every row must carry. Persons need `name` or `last_name`, checked separately.
pub fn required_fields(entity: EntityType) -> &'static [&'static str] {
    match entity {
        EntityType::Company | EntityType::Product => &["name"],
        EntityType::Person => &[],
        EntityType::ProposalLine => &[
            "proposal_number",
            "line_number",
            "description",
            "quantity",
            "unit_price",
        ],
    }
}

/// One mapped column as the source readers expect it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub field: String,
    pub aliases: Vec<String>,
    pub required: bool,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl IngestProfile {
    pub fn from_toml(input: &str) -> Result<Self, ProfileError> {
        let profile: IngestProfile =
            toml::from_str(input).map_err(|e| ProfileError::Parse(e.to_string()))?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.name.trim().is_empty() {
            return Err(ProfileError::Invalid("name must not be empty".into()));
        }

        if self.review_threshold == 0 {
            return Err(ProfileError::Invalid(
                "review_threshold must be at least 1".into(),
            ));
        }

        if let Some(kind) = &self.source.kind {
            if !SOURCE_KINDS.contains(&kind.as_str()) {
                return Err(ProfileError::Invalid(format!(
                    "source.kind '{kind}' must be one of {}",
                    SOURCE_KINDS.join(", ")
                )));
            }
        }

        if self.source.delimiter.is_some() && self.source.delimiter_byte().is_none() {
            return Err(ProfileError::Invalid(
                "source.delimiter must be a single ASCII character or \"tab\"".into(),
            ));
        }

        let known = known_fields(self.entity);
        for field in &self.source.positional {
            if !known.contains(&field.as_str()) {
                return Err(ProfileError::Invalid(format!(
                    "source.positional names unknown field '{field}'"
                )));
            }
        }
        for (field, aliases) in &self.columns {
            if !known.contains(&field.as_str()) {
                return Err(ProfileError::Invalid(format!(
                    "unknown field '{field}' for {} (known: {})",
                    self.entity,
                    known.join(", ")
                )));
            }
            let aliases = aliases.to_vec();
            if aliases.is_empty() || aliases.iter().any(|a| a.trim().is_empty()) {
                return Err(ProfileError::Invalid(format!(
                    "column mapping for '{field}' must name at least one non-empty header"
                )));
            }
        }

        for field in required_fields(self.entity) {
            if !self.columns.contains_key(*field) {
                return Err(ProfileError::Invalid(format!(
                    "required field '{field}' has no column mapping"
                )));
            }
        }

        if self.entity == EntityType::Person
            && !self.columns.contains_key("name")
            && !self.columns.contains_key("last_name")
        {
            return Err(ProfileError::Invalid(
                "person profiles must map 'name' or 'last_name'".into(),
            ));
        }

        if self.denylist.entries.iter().any(|e| e.trim().is_empty()) {
            return Err(ProfileError::Invalid(
                "denylist entries must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Header aliases for `field`. An unmapped field is looked up by its own name.
    pub fn aliases(&self, field: &str) -> Vec<String> {
        self.columns
            .get(field)
            .map(ColumnAliases::to_vec)
            .unwrap_or_else(|| vec![field.to_string()])
    }

    /// Columns the source readers expect, with the ones a header row must
    /// carry marked. Ordered by `source.positional`, then by field order.
    pub fn column_specs(&self) -> Vec<ColumnSpec> {
        let required = required_fields(self.entity);
        let person_key = if self.columns.contains_key("name") {
            "name"
        } else {
            "last_name"
        };

        let mut order: Vec<&str> = self.source.positional.iter().map(String::as_str).collect();
        for field in known_fields(self.entity) {
            if self.columns.contains_key(*field) && !order.contains(field) {
                order.push(field);
            }
        }

        order
            .into_iter()
            .map(|field| ColumnSpec {
                field: field.to_string(),
                aliases: self.aliases(field),
                required: required.contains(&field)
                    || (self.entity == EntityType::Person && field == person_key),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
