//! Statement classification for the local engine.
//! Recognises the DDL/DML shapes the registry and label merger emit; anything
//! else is handed to the SQL planner untouched.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::catalog::SqlType;
use crate::error::{AppError, AppResult};
use crate::sql::unquote_literal;

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateView { name: String, body: ViewBody },
    CreateTable { name: String, columns: Vec<ColumnDef> },
    CreateTableAs { name: String, body: String },
    Insert { table: String, rows: Vec<Vec<Literal>> },
    Extension { verb: ExtensionVerb, name: String },
    Drop { name: String, if_exists: bool },
    Query(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewBody {
    /// `SELECT * FROM src UNION ALL SELECT * FROM src ...`
    Union(Vec<Source>),
    /// `SELECT CAST(NULL AS T) AS c, ... WHERE 1=0`
    Empty(Vec<(String, SqlType)>),
    Sql(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Parquet(String),
    Ipc(String),
    Relation(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: SqlType,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionVerb {
    Install,
    Load,
}

static SELECT_STAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)^SELECT\s+\*\s+FROM\s+(.+)$").unwrap());
static SCAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^(read_parquet|read_ipc|read_arrow)\s*\(\s*('.*')\s*\)$").unwrap());
static INLINE_SCAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(read_parquet|read_ipc|read_arrow)\s*\(\s*('(?:[^']|'')*')\s*\)").unwrap());
static EMPTY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)^SELECT\s+(.+?)\s+WHERE\s+1\s*=\s*0$").unwrap());
static CAST_NULL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)^CAST\s*\(\s*NULL\s+AS\s+(\w+)\s*\)\s+AS\s+("(?:[^"]|"")+"|\w+)$"#).unwrap());
static IDENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^("(?:[^"]|"")+"|[A-Za-z_][A-Za-z0-9_.]*)"#).unwrap());

pub fn parse(sql: &str) -> AppResult<Statement> {
    let s = sql.trim().trim_end_matches(';').trim();
    if let Some(rest) = eat_kw(s, "CREATE") {
        return parse_create(rest, sql);
    }
    if let Some(rest) = eat_kw(s, "INSERT") {
        let rest = eat_kw(rest, "INTO").ok_or_else(|| syntax("expected INTO after INSERT"))?;
        return parse_insert(rest);
    }
    if let Some(rest) = eat_kw(s, "INSTALL") {
        return Ok(Statement::Extension { verb: ExtensionVerb::Install, name: parse_ident(rest)?.0 });
    }
    if let Some(rest) = eat_kw(s, "LOAD") {
        return Ok(Statement::Extension { verb: ExtensionVerb::Load, name: parse_ident(rest)?.0 });
    }
    if let Some(rest) = eat_kw(s, "DROP") {
        let rest = eat_kw(rest, "VIEW")
            .or_else(|| eat_kw(rest, "TABLE"))
            .ok_or_else(|| syntax("expected VIEW or TABLE after DROP"))?;
        let (if_exists, rest) = match eat_kw(rest, "IF").and_then(|r| eat_kw(r, "EXISTS")) {
            Some(r) => (true, r),
            None => (false, rest),
        };
        return Ok(Statement::Drop { name: parse_ident(rest)?.0, if_exists });
    }
    Ok(Statement::Query(s.to_string()))
}

fn parse_create(rest: &str, original: &str) -> AppResult<Statement> {
    let rest = eat_kw(rest, "OR").and_then(|r| eat_kw(r, "REPLACE")).unwrap_or(rest);
    let rest = eat_kw(rest, "TEMPORARY").or_else(|| eat_kw(rest, "TEMP")).unwrap_or(rest);
    if let Some(rest) = eat_kw(rest, "VIEW") {
        let (name, rest) = parse_ident(rest)?;
        let body = eat_kw(rest, "AS").ok_or_else(|| syntax("expected AS in CREATE VIEW"))?;
        return Ok(Statement::CreateView { name, body: parse_view_body(body) });
    }
    if let Some(rest) = eat_kw(rest, "TABLE") {
        let (name, rest) = parse_ident(rest)?;
        if let Some(body) = eat_kw(rest, "AS") {
            return Ok(Statement::CreateTableAs { name, body: body.trim().to_string() });
        }
        let inner = rest
            .trim()
            .strip_prefix('(')
            .and_then(|r| r.strip_suffix(')'))
            .ok_or_else(|| syntax("expected column list in CREATE TABLE"))?;
        let mut columns = Vec::new();
        for def in split_top_level(inner, ',') {
            columns.push(parse_column_def(def)?);
        }
        if columns.is_empty() { return Err(syntax("CREATE TABLE needs at least one column")); }
        return Ok(Statement::CreateTable { name, columns });
    }
    // CREATE of anything else goes to the planner as-is
    Ok(Statement::Query(original.trim().to_string()))
}

fn parse_column_def(def: &str) -> AppResult<ColumnDef> {
    let (name, rest) = parse_ident(def)?;
    let mut words = rest.split_whitespace();
    let ty_word = words.next().ok_or_else(|| syntax(format!("missing type for column {}", name)))?;
    let ty = SqlType::parse(ty_word).ok_or_else(|| syntax(format!("unsupported column type {}", ty_word)))?;
    let tail: Vec<String> = words.map(|w| w.to_ascii_uppercase()).collect();
    let primary_key = tail.windows(2).any(|w| w[0] == "PRIMARY" && w[1] == "KEY");
    Ok(ColumnDef { name, ty, primary_key })
}

/// Classify a view body. Anything not matching the two registry shapes
/// exactly is kept as SQL.
pub fn parse_view_body(body: &str) -> ViewBody {
    let body = body.trim();
    let parts = split_union_all(body);
    let mut sources = Vec::with_capacity(parts.len());
    for part in &parts {
        match parse_select_star(part) {
            Some(src) => sources.push(src),
            None => {
                sources.clear();
                break;
            }
        }
    }
    if !sources.is_empty() && sources.len() == parts.len() {
        return ViewBody::Union(sources);
    }
    if let Some(cols) = parse_empty_projection(body) {
        return ViewBody::Empty(cols);
    }
    ViewBody::Sql(body.to_string())
}

fn parse_select_star(part: &str) -> Option<Source> {
    let from = SELECT_STAR_RE.captures(part.trim())?.get(1)?.as_str().trim();
    if let Some(c) = SCAN_RE.captures(from) {
        let func = c.get(1)?.as_str().to_ascii_lowercase();
        let url = unquote_literal(c.get(2)?.as_str())?;
        return Some(if func == "read_parquet" { Source::Parquet(url) } else { Source::Ipc(url) });
    }
    let (name, rest) = parse_ident(from).ok()?;
    if !rest.trim().is_empty() { return None; }
    Some(Source::Relation(name))
}

/// A file scan written inline in a free-form query.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineScan {
    pub alias: String,
    pub source: Source,
}

/// Replace every `read_parquet('..')` / `read_ipc('..')` call in `sql` with a
/// generated relation name. Identical calls share one alias.
pub fn extract_inline_scans(sql: &str) -> (String, Vec<InlineScan>) {
    let mut scans: Vec<InlineScan> = Vec::new();
    let mut out = String::with_capacity(sql.len());
    let mut last = 0;
    for c in INLINE_SCAN_RE.captures_iter(sql) {
        let (Some(whole), Some(func), Some(lit)) = (c.get(0), c.get(1), c.get(2)) else { continue };
        let Some(url) = unquote_literal(lit.as_str()) else { continue };
        let source = if func.as_str().eq_ignore_ascii_case("read_parquet") { Source::Parquet(url) } else { Source::Ipc(url) };
        let alias = match scans.iter().find(|s| s.source == source) {
            Some(s) => s.alias.clone(),
            None => {
                let alias = format!("__scan_{}", scans.len());
                scans.push(InlineScan { alias: alias.clone(), source });
                alias
            }
        };
        out.push_str(&sql[last..whole.start()]);
        out.push_str(&alias);
        last = whole.end();
    }
    out.push_str(&sql[last..]);
    (out, scans)
}

fn parse_empty_projection(body: &str) -> Option<Vec<(String, SqlType)>> {
    let list = EMPTY_RE.captures(body)?.get(1)?.as_str();
    let mut cols = Vec::new();
    for item in split_top_level(list, ',') {
        let c = CAST_NULL_RE.captures(item.trim())?;
        let ty = SqlType::parse(c.get(1)?.as_str())?;
        cols.push((unquote_ident(c.get(2)?.as_str()), ty));
    }
    if cols.is_empty() { None } else { Some(cols) }
}

fn parse_insert(rest: &str) -> AppResult<Statement> {
    let (table, rest) = parse_ident(rest)?;
    let values = eat_kw(rest, "VALUES").ok_or_else(|| syntax("only INSERT ... VALUES is supported"))?;
    let mut rows = Vec::new();
    for tuple in split_top_level(values, ',') {
        let inner = tuple
            .trim()
            .strip_prefix('(')
            .and_then(|r| r.strip_suffix(')'))
            .ok_or_else(|| syntax(format!("malformed VALUES tuple: {}", tuple.trim())))?;
        let mut row = Vec::new();
        for lit in split_top_level(inner, ',') {
            row.push(parse_literal(lit)?);
        }
        rows.push(row);
    }
    if rows.is_empty() { return Err(syntax("INSERT without rows")); }
    Ok(Statement::Insert { table, rows })
}

fn parse_literal(s: &str) -> AppResult<Literal> {
    let t = s.trim();
    if t.starts_with('\'') {
        return unquote_literal(t)
            .map(Literal::Str)
            .ok_or_else(|| syntax(format!("unterminated string literal: {}", t)));
    }
    match t.to_ascii_uppercase().as_str() {
        "NULL" => return Ok(Literal::Null),
        "TRUE" => return Ok(Literal::Bool(true)),
        "FALSE" => return Ok(Literal::Bool(false)),
        _ => {}
    }
    if let Ok(i) = t.parse::<i64>() { return Ok(Literal::Int(i)); }
    if let Ok(f) = t.parse::<f64>() { return Ok(Literal::Float(f)); }
    Err(syntax(format!("unsupported literal: {}", t)))
}

/// Case-insensitive keyword at the start of `s`, followed by a word boundary.
fn eat_kw<'a>(s: &'a str, kw: &str) -> Option<&'a str> {
    let t = s.trim_start();
    if t.len() < kw.len() || !t.is_char_boundary(kw.len()) { return None; }
    let (head, tail) = t.split_at(kw.len());
    if !head.eq_ignore_ascii_case(kw) { return None; }
    match tail.chars().next() {
        None => Some(tail),
        Some(c) if c.is_whitespace() || c == '(' || c == ';' => Some(tail),
        _ => None,
    }
}

fn parse_ident(s: &str) -> AppResult<(String, &str)> {
    let t = s.trim_start();
    let m = IDENT_RE.find(t).ok_or_else(|| syntax(format!("expected identifier near '{}'", head_of(t))))?;
    Ok((unquote_ident(m.as_str()), &t[m.end()..]))
}

fn unquote_ident(s: &str) -> String {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        s[1..s.len() - 1].replace("\"\"", "\"")
    } else {
        s.to_string()
    }
}

/// Split on `delim` outside quotes and parentheses.
pub fn split_top_level(s: &str, delim: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut in_str = false;
    let mut in_ident = false;
    let mut start = 0usize;
    for (i, ch) in s.char_indices() {
        match ch {
            '\'' if !in_ident => in_str = !in_str,
            '"' if !in_str => in_ident = !in_ident,
            '(' if !in_str && !in_ident => depth += 1,
            ')' if !in_str && !in_ident => depth -= 1,
            c if c == delim && depth == 0 && !in_str && !in_ident => {
                out.push(&s[start..i]);
                start = i + ch.len_utf8();
            }
            _ => {}
        }
    }
    let last = &s[start..];
    if !last.trim().is_empty() || !out.is_empty() { out.push(last); }
    out.retain(|p| !p.trim().is_empty());
    out
}

/// Split on ` UNION ALL ` at top level.
fn split_union_all(s: &str) -> Vec<&str> {
    let upper = s.to_ascii_uppercase();
    let bytes = s.as_bytes();
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut in_str = false;
    let mut start = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'\'' { in_str = !in_str; }
        if !in_str {
            if b == b'(' { depth += 1; }
            if b == b')' { depth -= 1; }
            if depth == 0 && b.is_ascii_whitespace() {
                if let Some(len) = union_all_at(&upper[i..]) {
                    out.push(&s[start..i]);
                    i += len;
                    start = i;
                    continue;
                }
            }
        }
        i += 1;
    }
    out.push(&s[start..]);
    out
}

/// Length of a leading `<ws>UNION<ws>ALL<ws>` in `upper`, if present.
fn union_all_at(upper: &str) -> Option<usize> {
    let t = upper.trim_start().strip_prefix("UNION")?;
    let t2 = t.trim_start();
    if t2.len() == t.len() { return None; }
    let t3 = t2.strip_prefix("ALL")?;
    let t4 = t3.trim_start();
    if t4.len() == t3.len() { return None; }
    Some(upper.len() - t4.len())
}

fn head_of(s: &str) -> String { s.chars().take(24).collect() }

fn syntax(msg: impl Into<String>) -> AppError { AppError::query("syntax_error", msg.into()) }
