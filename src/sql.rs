//! SQL text helpers
//! ----------------
//! Every literal or identifier interpolated into engine statements goes
//! through this module: file locators, label keys and values, relation names.

/// Quote a string as a single-quoted SQL literal, doubling embedded quotes.
pub fn quote_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        if ch == '\'' { out.push('\''); }
        out.push(ch);
    }
    out.push('\'');
    out
}

/// Reverse of [`quote_literal`]. Returns None when `s` is not a complete literal.
pub fn unquote_literal(s: &str) -> Option<String> {
    let t = s.trim();
    if t.len() < 2 || !t.starts_with('\'') || !t.ends_with('\'') { return None; }
    let inner = &t[1..t.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\'' {
            // a lone quote inside the body means the literal ended early
            if chars.peek() == Some(&'\'') { chars.next(); } else { return None; }
        }
        out.push(ch);
    }
    Some(out)
}

/// Relation/column names: plain identifiers pass through, everything else is double-quoted.
pub fn quote_ident(name: &str) -> String {
    let plain = !name.is_empty()
        && name.chars().next().map(|c| c.is_ascii_alphabetic() || c == '_').unwrap_or(false)
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain { return name.to_string(); }
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Make an absolute file locator safe for the engine's URL handling.
/// A `#` would be read as a fragment marker by the remote reader.
pub fn escape_locator(url: &str) -> String {
    url.replace('#', "%23")
}

/// Locator prepared for embedding: fragment-escaped then literal-quoted.
pub fn locator_literal(url: &str) -> String {
    quote_literal(&escape_locator(url))
}
