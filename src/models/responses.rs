//! Response envelopes shared by every paginated endpoint

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Number of records matched by a query
///
/// Exact when the query carried a `found` window count, otherwise a lower
/// bound such as `">100"` when a full page came back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Found {
    Count(i64),
    AtLeast(String),
}

impl Found {
    pub fn more_than(limit: i64) -> Self {
        Found::AtLeast(format!(">{}", limit))
    }
}

impl fmt::Display for Found {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Found::Count(n) => write!(f, "{}", n),
            Found::AtLeast(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub name: String,
    pub website: String,
    pub page: i64,
    pub limit: i64,
    pub found: Option<Found>,
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            name: "openaq-api".to_string(),
            website: "/".to_string(),
            page: 1,
            limit: 100,
            found: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OpenAQResult {
    pub meta: Meta,
    pub results: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_defaults() {
        let meta = Meta::default();
        assert_eq!(meta.name, "openaq-api");
        assert_eq!(meta.website, "/");
        assert_eq!(meta.page, 1);
        assert_eq!(meta.limit, 100);
        assert!(meta.found.is_none());
    }

    #[test]
    fn test_found_serializes_untagged() {
        assert_eq!(serde_json::to_string(&Found::Count(42)).unwrap(), "42");
        assert_eq!(
            serde_json::to_string(&Found::more_than(100)).unwrap(),
            "\">100\""
        );
    }
}
