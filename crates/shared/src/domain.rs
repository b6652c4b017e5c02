use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::StatusError;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(CaseId);
id_newtype!(ItemId);
id_newtype!(OrderId);

/// Field names used when records cross the generic data-service boundary.
pub mod fields {
    pub const ID: &str = "id";
    pub const STATUS: &str = "status";
    pub const CASE_ID: &str = "caseId";
    pub const QUANTITY: &str = "quantity";
    pub const PRODUCT_CODE: &str = "productCode";
    pub const PRODUCT_NAME: &str = "productName";
}

/// Generic record payload exchanged with the record data service.
pub type FieldSet = serde_json::Map<String, serde_json::Value>;

/// Case lifecycle. Variants are declared in lifecycle order, so `Ord` follows
/// the only direction a case is allowed to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CaseStatus {
    #[serde(rename = "Open")]
    Open,
    #[serde(rename = "Submit to Vendor")]
    SubmittedToVendor,
    #[serde(rename = "Order Created")]
    OrderCreated,
}

impl CaseStatus {
    pub const ALL: [Self; 3] = [Self::Open, Self::SubmittedToVendor, Self::OrderCreated];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::SubmittedToVendor => "Submit to Vendor",
            Self::OrderCreated => "Order Created",
        }
    }

    /// Items and re-submission are frozen once the case has left `Open`.
    pub fn is_locked(self) -> bool {
        matches!(self, Self::SubmittedToVendor | Self::OrderCreated)
    }

    pub fn advance_to(self, next: Self) -> Result<Self, StatusError> {
        if next < self {
            return Err(StatusError::Backward { from: self, to: next });
        }
        Ok(next)
    }
}

impl FromStr for CaseStatus {
    type Err = StatusError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "Open" => Ok(Self::Open),
            "Submit to Vendor" => Ok(Self::SubmittedToVendor),
            "Order Created" => Ok(Self::OrderCreated),
            other => Err(StatusError::Unknown(other.to_string())),
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub id: CaseId,
    pub status: CaseStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub order_number: String,
    pub case_id: CaseId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRef {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: ItemId,
    pub case_id: CaseId,
    pub product: Option<ProductRef>,
    pub quantity: u32,
}

/// Flattened table row for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRow {
    pub id: ItemId,
    pub case_id: CaseId,
    pub product_code: String,
    pub product_name: String,
    pub quantity: u32,
}

impl From<&ItemRecord> for ItemRow {
    fn from(record: &ItemRecord) -> Self {
        let (product_code, product_name) = match &record.product {
            Some(product) => (product.code.clone(), product.name.clone()),
            None => (String::new(), String::new()),
        };
        Self {
            id: record.id.clone(),
            case_id: record.case_id.clone(),
            product_code,
            product_name,
            quantity: record.quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityEdit {
    pub id: ItemId,
    pub quantity: u32,
}

impl QuantityEdit {
    pub fn new(id: impl Into<String>, quantity: u32) -> Self {
        Self {
            id: ItemId(id.into()),
            quantity,
        }
    }

    pub fn to_fields(&self) -> FieldSet {
        let mut out = FieldSet::new();
        out.insert(fields::ID.into(), self.id.0.clone().into());
        out.insert(fields::QUANTITY.into(), self.quantity.into());
        out
    }
}
