//! Logical tables of the state-diff dataset and their fallback schemas.
//! A table with no files is still registered, as an empty relation with
//! exactly these columns, so queries against it return zero rows instead of failing.

use serde::{Deserialize, Serialize};

use crate::sql::quote_ident;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlType {
    Varchar,
    BigInt,
    Double,
    Boolean,
}

impl SqlType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Varchar => "VARCHAR",
            SqlType::BigInt => "BIGINT",
            SqlType::Double => "DOUBLE",
            SqlType::Boolean => "BOOLEAN",
        }
    }

    /// Accepts the common spellings engines use for the same type.
    pub fn parse(s: &str) -> Option<SqlType> {
        match s.trim().to_ascii_uppercase().as_str() {
            "VARCHAR" | "TEXT" | "STRING" => Some(SqlType::Varchar),
            "BIGINT" | "INT8" | "LONG" | "INTEGER" | "INT" => Some(SqlType::BigInt),
            "DOUBLE" | "FLOAT8" | "FLOAT" | "REAL" => Some(SqlType::Double),
            "BOOLEAN" | "BOOL" => Some(SqlType::Boolean),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    pub columns: Vec<(String, SqlType)>,
}

impl TableSpec {
    pub fn new(name: &str, columns: &[(&str, SqlType)]) -> Self {
        Self { name: name.to_string(), columns: columns.iter().map(|(c, t)| (c.to_string(), *t)).collect() }
    }

    /// `SELECT CAST(NULL AS T) AS c, ... WHERE 1=0`
    pub fn empty_projection_sql(&self) -> String {
        let cols: Vec<String> = self
            .columns
            .iter()
            .map(|(c, t)| format!("CAST(NULL AS {}) AS {}", t.as_sql(), quote_ident(c)))
            .collect();
        format!("SELECT {} WHERE 1=0", cols.join(", "))
    }
}

/// Fixed, ordered set of logical tables. Registration follows this order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    tables: Vec<TableSpec>,
}

impl Catalog {
    pub fn new(tables: Vec<TableSpec>) -> Self { Self { tables } }

    /// Starknet state-diff tables.
    pub fn state_diff() -> Self {
        use SqlType::Varchar;
        Self::new(vec![
            TableSpec::new("storage_diffs", &[("address", Varchar), ("key", Varchar), ("value", Varchar)]),
            TableSpec::new("declared_classes", &[("class_hash", Varchar), ("compiled_class_hash", Varchar)]),
            TableSpec::new("deployed_or_replaced", &[("address", Varchar), ("class_hash", Varchar)]),
            TableSpec::new("nonces", &[("contract_address", Varchar), ("nonce", Varchar)]),
        ])
    }

    pub fn tables(&self) -> &[TableSpec] { &self.tables }

    pub fn get(&self, name: &str) -> Option<&TableSpec> { self.tables.iter().find(|t| t.name == name) }

    pub fn contains(&self, name: &str) -> bool { self.get(name).is_some() }
}

impl Default for Catalog {
    fn default() -> Self { Self::state_diff() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_diff_catalog_order_is_fixed() {
        let c = Catalog::state_diff();
        let names: Vec<&str> = c.tables().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["storage_diffs", "declared_classes", "deployed_or_replaced", "nonces"]);
        assert!(c.contains("nonces"));
        assert!(!c.contains("blocks"));
    }

    #[test]
    fn empty_projection_has_every_column() {
        let c = Catalog::state_diff();
        let sql = c.get("nonces").unwrap().empty_projection_sql();
        assert_eq!(
            sql,
            "SELECT CAST(NULL AS VARCHAR) AS contract_address, CAST(NULL AS VARCHAR) AS nonce WHERE 1=0"
        );
    }

    #[test]
    fn type_spellings() {
        assert_eq!(SqlType::parse("text"), Some(SqlType::Varchar));
        assert_eq!(SqlType::parse("BIGINT"), Some(SqlType::BigInt));
        assert_eq!(SqlType::parse("bool"), Some(SqlType::Boolean));
        assert_eq!(SqlType::parse("geometry"), None);
    }
}
