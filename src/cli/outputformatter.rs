use serde_json::Value;

use terminal_size::{terminal_size, Height, Width};

use crate::engine::ResultSet;

/// Bytes shown before a binary cell is elided.
const BINARY_PREVIEW_BYTES: usize = 16;

// Render a result set as an ASCII table fitted to `termw` columns.
// Nothing is produced for an empty set; callers print their own notice.
pub fn render_table(rs: &ResultSet, termw: usize, color: bool) -> Vec<String> {
    if rs.columns.is_empty() { return Vec::new(); }
    let cols: Vec<String> = rs.columns.iter().map(|c| c.name.clone()).collect();
    let rows: Vec<Vec<String>> = rs
        .rows
        .iter()
        .map(|r| {
            rs.columns
                .iter()
                .enumerate()
                .map(|(i, c)| cell_text(r.get(i).unwrap_or(&Value::Null), &c.data_type))
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = cols.iter().map(|s| visible_len(s).min(termw)).collect();
    for r in &rows {
        for (i, cell) in r.iter().enumerate().take(cols.len()) {
            let w = visible_len(cell);
            if w > widths[i] { widths[i] = w.min(termw); }
        }
    }

    let mut out = Vec::with_capacity(rows.len() + 5);
    let sep = build_separator(&widths);
    out.push(fit_line_to_width(&sep, termw));
    out.push(fit_line_to_width(&build_header(&cols, &widths, color), termw));
    out.push(fit_line_to_width(&sep, termw));
    for r in &rows {
        out.push(fit_line_to_width(&build_row(r, &widths), termw));
    }
    out.push(fit_line_to_width(&sep, termw));
    out.push(fit_line_to_width(&format!("rows: {}, cols: {}", rows.len(), cols.len()), termw));
    out
}

pub fn print_result_set(rs: &ResultSet) {
    if rs.rows.is_empty() {
        println!("(no rows)");
        return;
    }
    let termw = get_terminal_width();
    crate::tprintln!("[cli.outputformatter] detected terminal width={} columns", termw);
    for line in render_table(rs, termw, true) {
        println!("{}", line);
    }
}

/// Text for one cell. Binary values are shown as `0x` plus their leading
/// bytes, with an ellipsis when cut.
pub fn cell_text(v: &Value, data_type: &str) -> String {
    match v {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) if data_type.eq_ignore_ascii_case("binary") => preview_hex(s),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn preview_hex(s: &str) -> String {
    let hex = s.strip_prefix("0x").unwrap_or(s);
    let keep = BINARY_PREVIEW_BYTES * 2;
    if hex.len() <= keep { return format!("0x{}", hex); }
    format!("0x{}…", &hex[..keep])
}

fn build_separator(widths: &[usize]) -> String {
    let mut s = String::new();
    s.push('+');
    for w in widths {
        s.push_str(&"-".repeat(*w + 2));
        s.push('+');
    }
    s
}

fn build_row(cells: &[String], widths: &[usize]) -> String {
    let mut s = String::new();
    s.push('|');
    for (i, w) in widths.iter().enumerate() {
        let cell = cells.get(i).cloned().unwrap_or_default();
        let (text, align_right) = (truncate(&cell, *w), is_numeric_like(&cell));
        s.push(' ');
        let pad = w.saturating_sub(visible_len(&text));
        if align_right {
            s.push_str(&" ".repeat(pad));
            s.push_str(&text);
        } else {
            s.push_str(&text);
            s.push_str(&" ".repeat(pad));
        }
        s.push_str(" |");
    }
    s
}

// Header names are left-aligned, green when `color` is set.
fn build_header(cells: &[String], widths: &[usize], color: bool) -> String {
    let mut s = String::new();
    s.push('|');
    for (i, w) in widths.iter().enumerate() {
        let cell = cells.get(i).cloned().unwrap_or_default();
        let text = truncate(&cell, *w);
        s.push(' ');
        if color {
            s.push_str(&format!("\x1b[32m{}\x1b[0m", text));
        } else {
            s.push_str(&text);
        }
        s.push_str(&" ".repeat(w.saturating_sub(visible_len(&text))));
        s.push_str(" |");
    }
    s
}

pub fn truncate(s: &str, max: usize) -> String {
    let len = s.chars().count();
    if len <= max { return s.to_string(); }
    if max <= 1 { return "…".to_string(); }
    s.chars().take(max - 1).collect::<String>() + "…"
}

fn is_numeric_like(s: &str) -> bool {
    let st = s.trim();
    if st.is_empty() || st.starts_with("0x") { return false; }
    let mut has_digit = false;
    for ch in st.chars() {
        if ch.is_ascii_digit() { has_digit = true; continue; }
        if ".-+eE,_".contains(ch) { continue; }
        return false;
    }
    has_digit
}

// --- Terminal fitting & ANSI helpers ---

pub fn get_terminal_width() -> usize {
    match terminal_size() {
        Some((Width(w), Height(_))) if w > 20 => (w - 4) as usize,
        _ => 80,
    }
}

pub fn fit_line_to_width(s: &str, maxw: usize) -> String {
    if visible_len(s) <= maxw { return s.to_string(); }
    elide_middle_preserving_ansi(s, maxw)
}

// Visible Unicode chars, ANSI CSI sequences skipped.
pub fn visible_len(s: &str) -> usize {
    let mut count = 0;
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch == '\x1b' {
            if chars.next() == Some('[') {
                for c in chars.by_ref() {
                    if c.is_ascii_alphabetic() { break; }
                }
            }
            continue;
        }
        count += 1;
    }
    count
}

struct Tok {
    ansi: bool,
    text: String,
    vis: usize,
}

fn tokenize(s: &str) -> Vec<Tok> {
    let mut toks: Vec<Tok> = Vec::new();
    let mut chars = s.chars().peekable();
    while let Some(&ch) = chars.peek() {
        if ch == '\x1b' {
            let mut text = String::new();
            text.push(ch);
            chars.next();
            if chars.peek() == Some(&'[') {
                text.push('[');
                chars.next();
                for c in chars.by_ref() {
                    text.push(c);
                    if c.is_ascii_alphabetic() { break; }
                }
            }
            toks.push(Tok { ansi: true, text, vis: 0 });
            continue;
        }
        let mut text = String::new();
        while let Some(&c) = chars.peek() {
            if c == '\x1b' { break; }
            text.push(c);
            chars.next();
        }
        let vis = text.chars().count();
        toks.push(Tok { ansi: false, text, vis });
    }
    toks
}

fn elide_middle_preserving_ansi(s: &str, maxw: usize) -> String {
    if maxw <= 3 { return "…".repeat(maxw.min(1)); }
    let budget = maxw - 3;
    let front_keep = budget / 2;
    let back_keep = budget - front_keep;
    let toks = tokenize(s);

    let mut front = String::new();
    let mut collected = 0usize;
    for t in &toks {
        if t.ansi {
            front.push_str(&t.text);
        } else if collected + t.vis <= front_keep {
            front.push_str(&t.text);
            collected += t.vis;
        } else {
            front.extend(t.text.chars().take(front_keep - collected));
            break;
        }
    }

    let mut back_parts: Vec<String> = Vec::new();
    let mut collected = 0usize;
    for t in toks.iter().rev() {
        if t.ansi {
            back_parts.push(t.text.clone());
        } else if collected + t.vis <= back_keep {
            back_parts.push(t.text.clone());
            collected += t.vis;
        } else {
            let need = back_keep - collected;
            back_parts.push(t.text.chars().skip(t.vis - need).collect());
            break;
        }
    }
    back_parts.reverse();

    // reset at the end so a cut escape cannot bleed colour
    format!("{}...{}\x1b[0m", front, back_parts.concat())
}
