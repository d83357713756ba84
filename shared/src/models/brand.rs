//! The co-hosted brands

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the two businesses sharing the backend. Used as a partition key
/// for ledgers, stock-affecting documents and document numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Brand {
    #[serde(rename = "GT")]
    Gt,
    #[serde(rename = "SK")]
    Sk,
}

impl Brand {
    pub const ALL: [Brand; 2] = [Brand::Gt, Brand::Sk];

    /// Short code, also used as the document number prefix
    pub fn code(&self) -> &'static str {
        match self {
            Brand::Gt => "GT",
            Brand::Sk => "SK",
        }
    }
}

impl std::fmt::Display for Brand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Brand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Brand::ALL
            .into_iter()
            .find(|b| b.code().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown brand: {}", s))
    }
}
