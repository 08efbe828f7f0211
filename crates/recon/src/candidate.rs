//! Schema mapping: raw rows to typed candidates, and candidates to the
//! uniform record shape the resolver and store work with.

use std::collections::BTreeMap;

use accord_core::{CellValue, EntityType, RawRow};
use chrono::NaiveDate;
use serde::Serialize;

use crate::config::IngestProfile;
use crate::error::RowValidationError;
use crate::normalize::{self, Field, Money, NameForms, Normalized};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanyCandidate {
    pub code: Option<String>,
    pub name: NameForms,
    pub tax_id: Option<String>,
    pub city: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonCandidate {
    pub code: Option<String>,
    pub name: NameForms,
    pub company_code: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductCandidate {
    pub code: Option<String>,
    pub name: NameForms,
    pub unit: Option<String>,
    pub unit_price: Option<Money>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProposalLineCandidate {
    pub proposal_number: String,
    pub line_number: String,
    pub product_code: Option<String>,
    pub description: NameForms,
    pub quantity: f64,
    pub unit_price: Money,
    pub currency: Option<String>,
    pub issued_on: Option<NaiveDate>,
}

/// A normalized row, not yet matched against the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CandidateEntity {
    Company(CompanyCandidate),
    Person(PersonCandidate),
    Product(ProductCandidate),
    ProposalLine(ProposalLineCandidate),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub source_row_index: usize,
    pub entity: CandidateEntity,
    /// Fields whose canonical value differs from the raw cell.
    pub modified_fields: Vec<String>,
    pub warnings: Vec<String>,
}

/// Uniform projection of a candidate. Attribute values are canonical strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityRecord {
    pub entity_type: EntityType,
    pub code: Option<String>,
    pub name: NameForms,
    pub attributes: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

struct Extractor<'a> {
    row: &'a RawRow,
    profile: &'a IngestProfile,
    modified: Vec<String>,
    warnings: Vec<String>,
}

impl<'a> Extractor<'a> {
    fn cell(&self, field: &str) -> CellValue {
        self.profile
            .aliases(field)
            .iter()
            .find_map(|alias| self.row.get(alias))
            .cloned()
            .unwrap_or(CellValue::Empty)
    }

    fn optional<T>(&mut self, field: &str, normalizer: impl FnOnce(&CellValue) -> Normalized<T>) -> Option<T> {
        let (value, modified) = normalizer(&self.cell(field)).into_parts();
        match value {
            Field::Value(v) => {
                if modified {
                    self.modified.push(field.to_string());
                }
                Some(v)
            }
            Field::Empty => None,
            Field::Invalid(raw) => {
                self.warnings
                    .push(format!("ignored invalid {field} '{raw}'"));
                None
            }
        }
    }

    fn required<T>(
        &mut self,
        field: &str,
        normalizer: impl FnOnce(&CellValue) -> Normalized<T>,
    ) -> Result<T, RowValidationError> {
        let (value, modified) = normalizer(&self.cell(field)).into_parts();
        match value {
            Field::Value(v) => {
                if modified {
                    self.modified.push(field.to_string());
                }
                Ok(v)
            }
            Field::Empty => Err(RowValidationError::Missing {
                field: field.to_string(),
            }),
            Field::Invalid(raw) => Err(RowValidationError::Invalid {
                field: field.to_string(),
                raw,
            }),
        }
    }

    fn text(cell: &CellValue) -> Normalized<String> {
        normalize::clean_text(&cell.to_text())
    }

    fn code(cell: &CellValue) -> Normalized<String> {
        normalize::canonical_code(&cell.to_text())
    }

    fn email(cell: &CellValue) -> Normalized<String> {
        normalize::email(&cell.to_text())
    }

    fn phone(cell: &CellValue) -> Normalized<String> {
        normalize::phone(&cell.to_text())
    }

    fn company_name(cell: &CellValue) -> Normalized<NameForms> {
        normalize::company_name(&cell.to_text())
    }

    fn person_name(cell: &CellValue) -> Normalized<NameForms> {
        normalize::person_name(&cell.to_text())
    }

    /// Person name from `name`, or composed from `first_name` and `last_name`.
    fn person_full_name(&mut self) -> Result<NameForms, RowValidationError> {
        if self.profile.columns.contains_key("name") {
            return self.required("name", Self::person_name);
        }
        let first = self.cell("first_name").to_text();
        let last = self.cell("last_name").to_text();
        if last.trim().is_empty() {
            return Err(RowValidationError::Missing {
                field: "last_name".to_string(),
            });
        }
        let composed = format!("{} {}", first.trim(), last.trim());
        let (value, modified) = normalize::person_name(&composed).into_parts();
        match value {
            Field::Value(v) => {
                if modified {
                    self.modified.push("name".to_string());
                }
                Ok(v)
            }
            _ => Err(RowValidationError::Missing {
                field: "last_name".to_string(),
            }),
        }
    }

    fn currency(&mut self) -> Option<String> {
        self.optional("currency", |cell| {
            let code = normalize::canonical_code(&cell.to_text());
            let acceptable = code.field.value().map_or(true, |c| c.len() == 3 || c == "TL");
            if acceptable {
                code
            } else {
                Normalized {
                    field: Field::Invalid(cell.to_text()),
                    modified: false,
                }
            }
        })
        .map(|c| if c == "TL" { "TRY".to_string() } else { c })
    }
}

/// Map and normalize one row according to `profile`.
pub fn extract(row: &RawRow, profile: &IngestProfile) -> Result<Candidate, RowValidationError> {
    let mut x = Extractor {
        row,
        profile,
        modified: Vec::new(),
        warnings: row.warnings.clone(),
    };

    let entity = match profile.entity {
        EntityType::Company => CandidateEntity::Company(CompanyCandidate {
            code: x.optional("code", Extractor::code),
            name: x.required("name", Extractor::company_name)?,
            tax_id: x.optional("tax_id", Extractor::code),
            city: x.optional("city", Extractor::text),
            phone: x.optional("phone", Extractor::phone),
            email: x.optional("email", Extractor::email),
        }),
        EntityType::Person => CandidateEntity::Person(PersonCandidate {
            code: x.optional("code", Extractor::code),
            name: x.person_full_name()?,
            company_code: x.optional("company_code", Extractor::code),
            email: x.optional("email", Extractor::email),
            phone: x.optional("phone", Extractor::phone),
            title: x.optional("title", Extractor::text),
        }),
        EntityType::Product => {
            let code = x.optional("code", Extractor::code);
            let name = x.required("name", Extractor::company_name)?;
            let unit = x.optional("unit", Extractor::text);
            let unit_price = x.optional("unit_price", normalize::money_cell);
            let currency = x
                .currency()
                .or_else(|| unit_price.and_then(|m| m.currency).map(|c| c.to_string()));
            CandidateEntity::Product(ProductCandidate {
                code,
                name,
                unit,
                unit_price,
                currency,
            })
        }
        EntityType::ProposalLine => {
            let proposal_number = x.required("proposal_number", Extractor::text)?;
            let line_number = x.required("line_number", Extractor::text)?;
            let product_code = x.optional("product_code", Extractor::code);
            let description = x.required("description", Extractor::company_name)?;
            let quantity = x.required("quantity", normalize::decimal_cell)?;
            let unit_price = x.required("unit_price", normalize::money_cell)?;
            let currency = x
                .currency()
                .or_else(|| unit_price.currency.map(|c| c.to_string()));
            let issued_on = x.optional("issued_on", normalize::date_cell);
            CandidateEntity::ProposalLine(ProposalLineCandidate {
                proposal_number,
                line_number,
                product_code,
                description,
                quantity,
                unit_price,
                currency,
                issued_on,
            })
        }
    };

    Ok(Candidate {
        source_row_index: row.index,
        entity,
        modified_fields: x.modified,
        warnings: x.warnings,
    })
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

fn put(attributes: &mut BTreeMap<String, String>, key: &str, value: Option<String>) {
    if let Some(v) = value {
        attributes.insert(key.to_string(), v);
    }
}

impl CandidateEntity {
    pub fn entity_type(&self) -> EntityType {
        match self {
            Self::Company(_) => EntityType::Company,
            Self::Person(_) => EntityType::Person,
            Self::Product(_) => EntityType::Product,
            Self::ProposalLine(_) => EntityType::ProposalLine,
        }
    }

    pub fn to_record(&self) -> EntityRecord {
        let mut attributes = BTreeMap::new();
        let (code, name) = match self {
            Self::Company(c) => {
                put(&mut attributes, "tax_id", c.tax_id.clone());
                put(&mut attributes, "city", c.city.clone());
                put(&mut attributes, "phone", c.phone.clone());
                put(&mut attributes, "email", c.email.clone());
                (c.code.clone(), c.name.clone())
            }
            Self::Person(p) => {
                put(&mut attributes, "company_code", p.company_code.clone());
                put(&mut attributes, "email", p.email.clone());
                put(&mut attributes, "phone", p.phone.clone());
                put(&mut attributes, "title", p.title.clone());
                (p.code.clone(), p.name.clone())
            }
            Self::Product(p) => {
                put(&mut attributes, "unit", p.unit.clone());
                put(
                    &mut attributes,
                    "unit_price",
                    p.unit_price.map(|m| normalize::format_minor(m.minor)),
                );
                put(&mut attributes, "currency", p.currency.clone());
                (p.code.clone(), p.name.clone())
            }
            Self::ProposalLine(l) => {
                put(&mut attributes, "proposal_number", Some(l.proposal_number.clone()));
                put(&mut attributes, "line_number", Some(l.line_number.clone()));
                put(&mut attributes, "product_code", l.product_code.clone());
                put(
                    &mut attributes,
                    "quantity",
                    Some(CellValue::Number(l.quantity).to_text()),
                );
                put(
                    &mut attributes,
                    "unit_price",
                    Some(normalize::format_minor(l.unit_price.minor)),
                );
                put(&mut attributes, "currency", l.currency.clone());
                put(
                    &mut attributes,
                    "issued_on",
                    l.issued_on.map(|d| d.format("%Y-%m-%d").to_string()),
                );
                let code = normalize::canonical_code(&format!("{}-{}", l.proposal_number, l.line_number))
                    .field
                    .into_value();
                (code, l.description.clone())
            }
        };

        EntityRecord {
            entity_type: self.entity_type(),
            code,
            name,
            attributes,
        }
    }
}
