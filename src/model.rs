use crate::error::CatalogError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Closed set of product categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    Pant,
    Shirt,
    Tshirt,
    Cap,
    Belt,
    Shoes,
}

impl ProductType {
    pub const ALL: [ProductType; 6] = [
        ProductType::Pant,
        ProductType::Shirt,
        ProductType::Tshirt,
        ProductType::Cap,
        ProductType::Belt,
        ProductType::Shoes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Pant => "pant",
            ProductType::Shirt => "shirt",
            ProductType::Tshirt => "tshirt",
            ProductType::Cap => "cap",
            ProductType::Belt => "belt",
            ProductType::Shoes => "shoes",
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductType {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| {
                CatalogError::Validation(format!(
                    "unknown product_type '{}', expected one of: pant, shirt, tshirt, cap, belt, shoes",
                    s
                ))
            })
    }
}

/// Closed set of size codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SizeCode {
    Xs,
    S,
    M,
    L,
    Xl,
    Xxl,
}

impl SizeCode {
    pub const ALL: [SizeCode; 6] = [
        SizeCode::Xs,
        SizeCode::S,
        SizeCode::M,
        SizeCode::L,
        SizeCode::Xl,
        SizeCode::Xxl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SizeCode::Xs => "XS",
            SizeCode::S => "S",
            SizeCode::M => "M",
            SizeCode::L => "L",
            SizeCode::Xl => "XL",
            SizeCode::Xxl => "XXL",
        }
    }
}

impl fmt::Display for SizeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SizeCode {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|c| c.as_str() == s)
            .copied()
            .ok_or_else(|| {
                CatalogError::Validation(format!(
                    "unknown size '{}', expected one of: XS, S, M, L, XL, XXL",
                    s
                ))
            })
    }
}

/// A stored variant record. The (product_type, product_name, size) triple is
/// unique across all records and immutable once set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantRecord {
    /// Store-assigned identifier
    pub id: Uuid,
    /// Product category
    pub product_type: ProductType,
    /// Submitter-chosen product name, non-empty
    pub product_name: String,
    /// Size code
    pub size: SizeCode,
    /// Non-negative price
    pub price: f64,
    /// Non-negative quantity on hand
    pub amount: i64,
    /// Object storage key for the product image, if one was uploaded
    pub image_key: Option<String>,
    /// Full signed URL persisted by older revisions; read-only legacy field
    pub image_url: Option<String>,
    /// When the record was created
    pub created_at: DateTime<Utc>,
    /// When the mutable fields were last overwritten
    pub updated_at: DateTime<Utc>,
}

/// An inbound product submission, as delivered by the HTTP layer.
/// `product_type` and `size` are raw strings here; the upsert engine
/// validates them against the closed sets before any store access.
#[derive(Debug, Clone)]
pub struct VariantSubmission {
    pub product_type: String,
    pub product_name: String,
    pub size: String,
    pub price: f64,
    pub amount: i64,
    pub image_key: Option<String>,
}

/// Fields for a brand-new variant record. The store assigns the id.
#[derive(Debug, Clone)]
pub struct NewVariant {
    pub product_type: ProductType,
    pub product_name: String,
    pub size: SizeCode,
    pub price: f64,
    pub amount: i64,
    pub image_key: Option<String>,
}

/// Outcome of an upsert against the unique triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpsertOutcome {
    /// First submission of this triple; a record was inserted
    Created,
    /// The triple existed and at least one mutable field changed
    Updated,
    /// The triple existed with identical fields; nothing was written
    NoOp,
}

impl UpsertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertOutcome::Created => "created",
            UpsertOutcome::Updated => "updated",
            UpsertOutcome::NoOp => "no-op",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_type_parse() {
        assert_eq!("tshirt".parse::<ProductType>().unwrap(), ProductType::Tshirt);
        assert_eq!("belt".parse::<ProductType>().unwrap(), ProductType::Belt);
        assert!("hoodie".parse::<ProductType>().is_err());
        // Closed set is case-sensitive
        assert!("Tshirt".parse::<ProductType>().is_err());
    }

    #[test]
    fn test_size_code_parse() {
        assert_eq!("XL".parse::<SizeCode>().unwrap(), SizeCode::Xl);
        assert_eq!("M".parse::<SizeCode>().unwrap(), SizeCode::M);
        assert!("xl".parse::<SizeCode>().is_err());
        assert!("XXXL".parse::<SizeCode>().is_err());
    }

    #[test]
    fn test_enum_serde_round_trip() {
        let json = serde_json::to_string(&ProductType::Tshirt).unwrap();
        assert_eq!(json, "\"tshirt\"");
        let json = serde_json::to_string(&SizeCode::Xxl).unwrap();
        assert_eq!(json, "\"XXL\"");
        let parsed: SizeCode = serde_json::from_str("\"XS\"").unwrap();
        assert_eq!(parsed, SizeCode::Xs);
    }

    #[test]
    fn test_upsert_outcome_serialization() {
        assert_eq!(
            serde_json::to_string(&UpsertOutcome::NoOp).unwrap(),
            "\"no-op\""
        );
        assert_eq!(
            serde_json::to_string(&UpsertOutcome::Created).unwrap(),
            "\"created\""
        );
        assert_eq!(UpsertOutcome::Updated.as_str(), "updated");
    }
}
