/// Session-level configuration for building tables and resolving names.
use crate::error::{Result, TableError};
use serde::{Deserialize, Serialize};

/// Hint for selecting the kind of index kept on base-table columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexHint {
    /// Sorted row lists maintained on every insert and remove (default).
    ///
    /// - O(log N) equality and range probes
    /// - O(N) insert/remove bookkeeping
    #[default]
    Sorted,

    /// No maintained structure; every selection scans the table.
    ///
    /// - O(N) probes
    /// - no insert/remove bookkeeping
    Scan,
}

impl IndexHint {
    /// Parse an index hint from a string.
    ///
    /// Accepts: "sorted", "scan"
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sorted" | "insert" => Ok(IndexHint::Sorted),
            "scan" | "blind" => Ok(IndexHint::Scan),
            _ => Err(TableError::InvalidConfig(format!(
                "Unknown index hint: '{}'. Use 'sorted' or 'scan'",
                s
            ))),
        }
    }
}

/// Settings that normally come from the owning connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Resolve identifiers ignoring ASCII case.
    pub case_insensitive: bool,
    /// Index kind for base tables created in this session.
    pub index_hint: IndexHint,
}

impl SessionConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_hint_from_str() {
        assert_eq!(IndexHint::from_str("Sorted").unwrap(), IndexHint::Sorted);
        assert_eq!(IndexHint::from_str("blind").unwrap(), IndexHint::Scan);
        assert!(matches!(IndexHint::from_str("btree"), Err(TableError::InvalidConfig(_))));
    }

    #[test]
    fn test_session_config_from_json() {
        let cfg = SessionConfig::from_json(r#"{"case_insensitive": true, "index_hint": "scan"}"#).unwrap();
        assert!(cfg.case_insensitive);
        assert_eq!(cfg.index_hint, IndexHint::Scan);

        let defaults = SessionConfig::from_json("{}").unwrap();
        assert_eq!(defaults, SessionConfig::default());

        assert!(matches!(SessionConfig::from_json("[1]"), Err(TableError::Json(_))));
    }
}
