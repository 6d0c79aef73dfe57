//! View composition
//! ----------------
//! Builds the statements that register one logical table: per-chunk temp
//! views over at most `chunk_size` file scans each, then the final view as
//! the union of the chunk views in chunk order. Chunking keeps any single
//! statement's text bounded no matter how many files a table has.

use serde::{Deserialize, Serialize};

use crate::catalog::TableSpec;
use crate::sql::{locator_literal, quote_ident};

pub const DEFAULT_VIEW_CHUNK: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Arrow,
    Parquet,
}

impl FileFormat {
    pub fn scan_function(&self) -> &'static str {
        match self {
            FileFormat::Arrow => "read_ipc",
            FileFormat::Parquet => "read_parquet",
        }
    }

    /// `read_parquet('<escaped locator>')`
    pub fn scan_expr(&self, locator: &str) -> String {
        format!("{}({})", self.scan_function(), locator_literal(locator))
    }
}

impl std::fmt::Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.scan_function()) }
}

/// Statements registering one view, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewPlan {
    pub view: String,
    pub chunk_views: Vec<String>,
    pub statements: Vec<String>,
}

pub fn chunk_view_name(view: &str, idx: usize) -> String { format!("v_{}_{}", view, idx) }

pub fn chunk_count(files: usize, chunk_size: usize) -> usize { files.div_ceil(chunk_size.max(1)) }

/// Plan a union view over `files` (already absolute). Callers handle the
/// empty case with [`empty_view_sql`].
pub fn plan_union_view(view: &str, files: &[String], format: FileFormat, chunk_size: usize) -> ViewPlan {
    let chunk_size = chunk_size.max(1);
    let mut chunk_views = Vec::with_capacity(chunk_count(files.len(), chunk_size));
    let mut statements = Vec::with_capacity(chunk_views.capacity() + 1);
    for (idx, group) in files.chunks(chunk_size).enumerate() {
        let body = group
            .iter()
            .map(|f| format!("SELECT * FROM {}", format.scan_expr(f)))
            .collect::<Vec<_>>()
            .join(" UNION ALL ");
        let name = chunk_view_name(view, idx);
        statements.push(format!("CREATE OR REPLACE TEMP VIEW {} AS {}", quote_ident(&name), body));
        chunk_views.push(name);
    }
    let body = chunk_views
        .iter()
        .map(|v| format!("SELECT * FROM {}", quote_ident(v)))
        .collect::<Vec<_>>()
        .join(" UNION ALL ");
    statements.push(format!("CREATE OR REPLACE VIEW {} AS {}", quote_ident(view), body));
    ViewPlan { view: view.to_string(), chunk_views, statements }
}

/// Zero-row view carrying the table's fallback schema.
pub fn empty_view_sql(spec: &TableSpec) -> String {
    format!("CREATE OR REPLACE VIEW {} AS {}", quote_ident(&spec.name), spec.empty_projection_sql())
}

/// One-row existence check used to decide whether a format is readable.
pub fn probe_sql(format: FileFormat, locator: &str) -> String {
    format!("SELECT 1 FROM {} LIMIT 1", format.scan_expr(locator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;

    fn files(n: usize) -> Vec<String> { (0..n).map(|i| format!("http://h/data/f{}.parquet", i)).collect() }

    #[test]
    fn two_files_one_chunk() {
        let plan = plan_union_view("a", &files(2), FileFormat::Parquet, 16);
        assert_eq!(plan.chunk_views, vec!["v_a_0"]);
        assert_eq!(
            plan.statements,
            vec![
                "CREATE OR REPLACE TEMP VIEW v_a_0 AS SELECT * FROM read_parquet('http://h/data/f0.parquet') UNION ALL SELECT * FROM read_parquet('http://h/data/f1.parquet')",
                "CREATE OR REPLACE VIEW a AS SELECT * FROM v_a_0",
            ]
        );
    }

    #[test]
    fn chunk_count_is_ceiling() {
        for (n, c, expect) in [(1, 16, 1), (16, 16, 1), (17, 16, 2), (33, 16, 3), (5, 2, 3), (4, 1, 4)] {
            let plan = plan_union_view("t", &files(n), FileFormat::Arrow, c);
            assert_eq!(plan.chunk_views.len(), expect, "n={} c={}", n, c);
            assert_eq!(plan.statements.len(), expect + 1);
            assert_eq!(chunk_count(n, c), expect);
        }
    }

    #[test]
    fn every_file_appears_once_in_order() {
        let fs = files(37);
        let plan = plan_union_view("t", &fs, FileFormat::Parquet, 16);
        let joined = plan.statements[..plan.statements.len() - 1].join("\n");
        let mut last = 0usize;
        for f in &fs {
            let needle = format!("'{}'", f);
            assert_eq!(joined.matches(&needle).count(), 1, "{}", f);
            let pos = joined.find(&needle).unwrap();
            assert!(pos >= last);
            last = pos;
        }
        assert_eq!(
            plan.statements.last().unwrap(),
            "CREATE OR REPLACE VIEW t AS SELECT * FROM v_t_0 UNION ALL SELECT * FROM v_t_1 UNION ALL SELECT * FROM v_t_2"
        );
    }

    #[test]
    fn locators_are_escaped() {
        let plan = plan_union_view("t", &["http://h/it's#1.arrow".to_string()], FileFormat::Arrow, 16);
        assert!(plan.statements[0].contains("read_ipc('http://h/it''s%231.arrow')"));
    }

    #[test]
    fn empty_view_uses_fallback_schema() {
        let c = Catalog::state_diff();
        assert_eq!(
            empty_view_sql(c.get("deployed_or_replaced").unwrap()),
            "CREATE OR REPLACE VIEW deployed_or_replaced AS SELECT CAST(NULL AS VARCHAR) AS address, CAST(NULL AS VARCHAR) AS class_hash WHERE 1=0"
        );
    }

    #[test]
    fn plans_are_deterministic() {
        let a = plan_union_view("t", &files(40), FileFormat::Parquet, 16);
        let b = plan_union_view("t", &files(40), FileFormat::Parquet, 16);
        assert_eq!(a, b);
    }
}
