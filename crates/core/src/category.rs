use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Classifier categories understood by the router.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "invoice-request-query")]
    InvoiceRequestQuery,
    #[serde(rename = "download-invoice")]
    DownloadInvoice,
    #[serde(rename = "soa-request")]
    SoaRequest,
    #[serde(rename = "customer-analytics")]
    CustomerAnalytics,
    #[serde(rename = "generic-query")]
    GenericQuery,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::InvoiceRequestQuery,
        Category::DownloadInvoice,
        Category::SoaRequest,
        Category::CustomerAnalytics,
        Category::GenericQuery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvoiceRequestQuery => "invoice-request-query",
            Self::DownloadInvoice => "download-invoice",
            Self::SoaRequest => "soa-request",
            Self::CustomerAnalytics => "customer-analytics",
            Self::GenericQuery => "generic-query",
        }
    }

    /// Categories answered from structured data and fixed templates.
    pub fn is_deterministic(&self) -> bool {
        !matches!(self, Self::GenericQuery)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown category `{}`", self.0)
    }
}

impl std::error::Error for UnknownCategory {}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| UnknownCategory(value.to_string()))
    }
}
