//! LocalEngine
//! -----------
//! In-process engine on polars. Views are materialized into DataFrames at
//! CREATE time (so an unreadable file fails the CREATE that names it);
//! free-form statements are planned by the polars SQL context with every
//! registered relation visible under its name.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use polars::prelude::*;
use polars::sql::SQLContext;
use reqwest::Url;
use serde_json::Value;
use tracing::{debug, info};

use super::statement::{self, ColumnDef, ExtensionVerb, Literal, Source, Statement, ViewBody};
use super::{QueryEngine, ResultColumn, ResultSet};
use crate::catalog::SqlType;
use crate::error::{AppError, AppResult};
use crate::fetch::Fetcher;

/// Extensions this engine provides natively; INSTALL/LOAD of these is a no-op.
pub const BUILTIN_EXTENSIONS: [&str; 4] = ["httpfs", "arrow", "parquet", "json"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    View,
    Table,
}

#[derive(Clone)]
struct Relation {
    frame: DataFrame,
    kind: RelationKind,
    primary_key: Option<String>,
    schema: Vec<ColumnDef>,
}

#[derive(Default)]
struct EngineState {
    relations: BTreeMap<String, Relation>,
    loaded: BTreeSet<String>,
}

pub struct LocalEngine {
    fetcher: Arc<dyn Fetcher>,
    state: Mutex<EngineState>,
}

impl LocalEngine {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher, state: Mutex::new(EngineState::default()) }
    }

    /// Names of every registered view and table.
    pub fn relation_names(&self) -> Vec<String> { self.state.lock().relations.keys().cloned().collect() }

    pub fn relation_kind(&self, name: &str) -> Option<RelationKind> {
        self.state.lock().relations.get(name).map(|r| r.kind)
    }

    pub fn loaded_extensions(&self) -> Vec<String> { self.state.lock().loaded.iter().cloned().collect() }

    async fn load_file(&self, src: &Source) -> AppResult<DataFrame> {
        let (url, parquet) = match src {
            Source::Parquet(u) => (u, true),
            Source::Ipc(u) => (u, false),
            Source::Relation(name) => return self.relation_frame(name),
        };
        let parsed = Url::parse(url).map_err(|e| AppError::query("io_error", format!("invalid file URL '{}': {}", url, e)))?;
        let bytes = self
            .fetcher
            .fetch_bytes(&parsed)
            .await
            .map_err(|e| AppError::query("io_error", format!("cannot read {}: {}", url, e.message())))?;
        let df = if parquet {
            ParquetReader::new(Cursor::new(bytes)).finish()
        } else {
            IpcReader::new(Cursor::new(bytes)).finish()
        };
        df.map_err(|e| AppError::query("io_error", format!("{}: {}", url, e)))
    }

    fn relation_frame(&self, name: &str) -> AppResult<DataFrame> {
        let st = self.state.lock();
        st.relations
            .get(name)
            .map(|r| r.frame.clone())
            .ok_or_else(|| missing_relation(name))
    }

    async fn eval_view_body(&self, body: &ViewBody) -> AppResult<DataFrame> {
        match body {
            ViewBody::Union(sources) => {
                let mut out: Option<DataFrame> = None;
                for src in sources {
                    let df = self.load_file(src).await?;
                    match out.as_mut() {
                        None => out = Some(df),
                        Some(acc) => {
                            acc.vstack_mut(&df).map_err(|e| {
                                AppError::query("engine_error", format!("UNION ALL schema mismatch: {}", e))
                            })?;
                        }
                    }
                }
                out.ok_or_else(|| AppError::query("syntax_error", "empty UNION"))
            }
            ViewBody::Empty(cols) => empty_frame(cols.iter().map(|(n, t)| (n.as_str(), *t))),
            ViewBody::Sql(sql) => self.run_sql(sql).await,
        }
    }

    /// Plan and collect `sql` against a snapshot of every registered relation.
    /// Inline file scans are loaded first and exposed under generated names.
    async fn run_sql(&self, sql: &str) -> AppResult<DataFrame> {
        let (sql, scans) = statement::extract_inline_scans(sql);
        let mut loaded = Vec::with_capacity(scans.len());
        for scan in &scans {
            loaded.push((scan.alias.as_str(), self.load_file(&scan.source).await?));
        }
        let mut ctx = SQLContext::new();
        {
            let st = self.state.lock();
            for (name, rel) in st.relations.iter() {
                ctx.register(name, rel.frame.clone().lazy());
            }
        }
        for (alias, df) in loaded {
            ctx.register(alias, df.lazy());
        }
        let lf = ctx.execute(&sql).map_err(|e| AppError::query("engine_error", e.to_string()))?;
        lf.collect().map_err(|e| AppError::query("engine_error", e.to_string()))
    }

    fn put_relation(&self, name: &str, rel: Relation) {
        let kind = rel.kind;
        let rows = rel.frame.height();
        self.state.lock().relations.insert(name.to_string(), rel);
        debug!(target: "harborx::engine", "{:?} {} replaced ({} rows)", kind, name, rows);
    }

    fn insert_rows(&self, table: &str, rows: &[Vec<Literal>]) -> AppResult<usize> {
        let mut st = self.state.lock();
        let rel = st.relations.get_mut(table).ok_or_else(|| missing_relation(table))?;
        if rel.kind != RelationKind::Table {
            return Err(AppError::query("engine_error", format!("cannot insert into view {}", table)));
        }
        for row in rows {
            if row.len() != rel.schema.len() {
                return Err(AppError::query(
                    "engine_error",
                    format!("table {} has {} columns but {} values were supplied", table, rel.schema.len(), row.len()),
                ));
            }
        }
        if let Some(pk) = rel.primary_key.clone() {
            let idx = rel.schema.iter().position(|c| c.name == pk).unwrap_or(0);
            let column = rel.frame.column(pk.as_str())?;
            let mut seen: HashSet<String> = HashSet::with_capacity(column.len() + rows.len());
            for i in 0..column.len() {
                if let Some(k) = cell_key(column.get(i)?) { seen.insert(k); }
            }
            for row in rows {
                let key = literal_key(&row[idx]);
                if let Some(k) = key {
                    if !seen.insert(k.clone()) {
                        return Err(AppError::query(
                            "constraint_error",
                            format!("duplicate key \"{}: {}\" violates primary key constraint", pk, k),
                        ));
                    }
                }
            }
        }
        let mut columns: Vec<Column> = Vec::with_capacity(rel.schema.len());
        for (j, def) in rel.schema.iter().enumerate() {
            columns.push(literal_column(&def.name, def.ty, rows.iter().map(|r| &r[j]))?);
        }
        let batch = DataFrame::new(columns)?;
        rel.frame.vstack_mut(&batch)?;
        Ok(rows.len())
    }
}

#[async_trait]
impl QueryEngine for LocalEngine {
    async fn execute(&self, sql: &str) -> AppResult<ResultSet> {
        match statement::parse(sql)? {
            Statement::CreateView { name, body } => {
                let frame = self.eval_view_body(&body).await?;
                let schema = frame_schema(&frame);
                self.put_relation(&name, Relation { frame, kind: RelationKind::View, primary_key: None, schema });
                Ok(ResultSet::empty())
            }
            Statement::CreateTable { name, columns } => {
                let frame = empty_frame(columns.iter().map(|c| (c.name.as_str(), c.ty)))?;
                let primary_key = columns.iter().find(|c| c.primary_key).map(|c| c.name.clone());
                self.put_relation(&name, Relation { frame, kind: RelationKind::Table, primary_key, schema: columns });
                Ok(ResultSet::empty())
            }
            Statement::CreateTableAs { name, body } => {
                let frame = self.run_sql(&body).await?;
                let schema = frame_schema(&frame);
                self.put_relation(&name, Relation { frame, kind: RelationKind::Table, primary_key: None, schema });
                Ok(ResultSet::empty())
            }
            Statement::Insert { table, rows } => {
                let n = self.insert_rows(&table, &rows)?;
                debug!(target: "harborx::engine", "inserted {} rows into {}", n, table);
                Ok(ResultSet::empty())
            }
            Statement::Extension { verb, name } => {
                let lname = name.to_ascii_lowercase();
                if !BUILTIN_EXTENSIONS.contains(&lname.as_str()) {
                    return Err(AppError::query(
                        "extension_unavailable",
                        format!("Extension \"{}\" is not available in the local engine", name),
                    ));
                }
                if verb == ExtensionVerb::Load && self.state.lock().loaded.insert(lname) {
                    info!(target: "harborx::engine", "extension {} loaded", name);
                }
                Ok(ResultSet::empty())
            }
            Statement::Drop { name, if_exists } => {
                let removed = self.state.lock().relations.remove(&name).is_some();
                if !removed && !if_exists { return Err(missing_relation(&name)); }
                Ok(ResultSet::empty())
            }
            Statement::Query(sql) => {
                let df = self.run_sql(&sql).await?;
                Ok(dataframe_to_result(&df))
            }
        }
    }
}

fn missing_relation(name: &str) -> AppError {
    AppError::query("engine_error", format!("Catalog Error: Table with name {} does not exist!", name))
}

fn dtype_of(ty: SqlType) -> DataType {
    match ty {
        SqlType::Varchar => DataType::String,
        SqlType::BigInt => DataType::Int64,
        SqlType::Double => DataType::Float64,
        SqlType::Boolean => DataType::Boolean,
    }
}

fn sql_type_of(dt: &DataType) -> SqlType {
    match dt {
        DataType::Boolean => SqlType::Boolean,
        DataType::Float32 | DataType::Float64 => SqlType::Double,
        dt if dt.is_integer() => SqlType::BigInt,
        _ => SqlType::Varchar,
    }
}

fn frame_schema(df: &DataFrame) -> Vec<ColumnDef> {
    df.get_columns()
        .iter()
        .map(|c| ColumnDef { name: c.name().to_string(), ty: sql_type_of(c.dtype()), primary_key: false })
        .collect()
}

/// Zero-row frame with the given typed columns.
pub fn empty_frame<'a, I>(cols: I) -> AppResult<DataFrame>
where
    I: IntoIterator<Item = (&'a str, SqlType)>,
{
    let columns: Vec<Column> = cols
        .into_iter()
        .map(|(name, ty)| Series::new_empty(name.into(), &dtype_of(ty)).into())
        .collect();
    Ok(DataFrame::new(columns)?)
}

fn literal_column<'a, I>(name: &str, ty: SqlType, values: I) -> AppResult<Column>
where
    I: Iterator<Item = &'a Literal>,
{
    let bad = |l: &Literal| AppError::query("conversion_error", format!("cannot store {:?} in {} column {}", l, ty.as_sql(), name));
    let series = match ty {
        SqlType::Varchar => {
            let v: Vec<Option<String>> = values
                .map(|l| match l {
                    Literal::Null => None,
                    Literal::Str(s) => Some(s.clone()),
                    Literal::Int(i) => Some(i.to_string()),
                    Literal::Float(f) => Some(f.to_string()),
                    Literal::Bool(b) => Some(b.to_string()),
                })
                .collect();
            Series::new(name.into(), v)
        }
        SqlType::BigInt => {
            let v = values
                .map(|l| match l {
                    Literal::Null => Ok(None),
                    Literal::Int(i) => Ok(Some(*i)),
                    Literal::Str(s) => s.trim().parse::<i64>().map(Some).map_err(|_| bad(l)),
                    other => Err(bad(other)),
                })
                .collect::<AppResult<Vec<Option<i64>>>>()?;
            Series::new(name.into(), v)
        }
        SqlType::Double => {
            let v = values
                .map(|l| match l {
                    Literal::Null => Ok(None),
                    Literal::Int(i) => Ok(Some(*i as f64)),
                    Literal::Float(f) => Ok(Some(*f)),
                    Literal::Str(s) => s.trim().parse::<f64>().map(Some).map_err(|_| bad(l)),
                    other => Err(bad(other)),
                })
                .collect::<AppResult<Vec<Option<f64>>>>()?;
            Series::new(name.into(), v)
        }
        SqlType::Boolean => {
            let v = values
                .map(|l| match l {
                    Literal::Null => Ok(None),
                    Literal::Bool(b) => Ok(Some(*b)),
                    other => Err(bad(other)),
                })
                .collect::<AppResult<Vec<Option<bool>>>>()?;
            Series::new(name.into(), v)
        }
    };
    Ok(series.into())
}

fn literal_key(l: &Literal) -> Option<String> {
    match l {
        Literal::Null => None,
        Literal::Str(s) => Some(s.clone()),
        Literal::Int(i) => Some(i.to_string()),
        Literal::Float(f) => Some(f.to_string()),
        Literal::Bool(b) => Some(b.to_string()),
    }
}

fn cell_key(av: AnyValue) -> Option<String> {
    match any_to_json(av) {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn hex_bytes(b: &[u8]) -> String {
    let mut s = String::with_capacity(2 + b.len() * 2);
    s.push_str("0x");
    for x in b { s.push_str(&format!("{:02x}", x)); }
    s
}

fn any_to_json(av: AnyValue) -> Value {
    match av {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Bool(b),
        AnyValue::String(s) => Value::String(s.to_string()),
        AnyValue::StringOwned(s) => Value::String(s.to_string()),
        AnyValue::Int32(v) => Value::from(v),
        AnyValue::Int64(v) => Value::from(v),
        AnyValue::UInt32(v) => Value::from(v),
        AnyValue::UInt64(v) => Value::from(v),
        AnyValue::Float32(v) => serde_json::Number::from_f64(v as f64).map(Value::Number).unwrap_or(Value::Null),
        AnyValue::Float64(v) => serde_json::Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null),
        AnyValue::Binary(b) => Value::String(hex_bytes(b)),
        AnyValue::BinaryOwned(b) => Value::String(hex_bytes(&b)),
        other => Value::String(other.to_string()),
    }
}

/// Flatten a DataFrame into a [`ResultSet`].
pub fn dataframe_to_result(df: &DataFrame) -> ResultSet {
    let columns: Vec<ResultColumn> = df
        .get_columns()
        .iter()
        .map(|c| ResultColumn { name: c.name().to_string(), data_type: c.dtype().to_string() })
        .collect();
    let mut rows: Vec<Vec<Value>> = Vec::with_capacity(df.height());
    for row_idx in 0..df.height() {
        let mut row = Vec::with_capacity(columns.len());
        for c in df.get_columns() {
            row.push(c.get(row_idx).map(any_to_json).unwrap_or(Value::Null));
        }
        rows.push(row);
    }
    ResultSet { columns, rows }
}
