//! Horizontal bar charts for label/count panels.

use serde_json::Value;

use super::outputformatter::{cell_text, truncate, visible_len};
use crate::engine::ResultSet;

/// Bars never drop below this share of the track so small entries stay visible.
pub const MIN_BAR_PERCENT: f64 = 2.0;

const LABEL_WIDTH: usize = 32;
const VALUE_WIDTH: usize = 12;

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub label: String,
    pub value: f64,
    /// Share of the total, before the minimum is applied.
    pub percent: f64,
}

fn numeric(v: Option<&Value>) -> f64 {
    match v {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// One bar per row, sized by its share of the column total.
pub fn bars(rs: &ResultSet, label: &str, value: &str) -> Vec<Bar> {
    let (li, vi) = (rs.column_index(label), rs.column_index(value));
    let values: Vec<f64> = rs.rows.iter().map(|r| numeric(vi.and_then(|i| r.get(i)))).collect();
    let sum: f64 = values.iter().sum();
    let total = if sum == 0.0 { 1.0 } else { sum };
    rs.rows
        .iter()
        .zip(values)
        .map(|(r, v)| Bar {
            label: li.and_then(|i| r.get(i)).map(|x| cell_text(x, "")).unwrap_or_default(),
            value: v,
            percent: v * 100.0 / total,
        })
        .collect()
}

pub fn render_bars(bars: &[Bar], termw: usize) -> Vec<String> {
    let track = termw.saturating_sub(LABEL_WIDTH + VALUE_WIDTH + 4).max(10);
    bars.iter()
        .map(|b| {
            let filled = ((b.percent.max(MIN_BAR_PERCENT) / 100.0) * track as f64).round() as usize;
            let filled = filled.clamp(1, track);
            let label = truncate(&b.label, LABEL_WIDTH);
            format!(
                "{}{} {}{} {:>w$}",
                label,
                " ".repeat(LABEL_WIDTH - visible_len(&label)),
                "█".repeat(filled),
                " ".repeat(track - filled),
                format_count(b.value),
                w = VALUE_WIDTH
            )
        })
        .collect()
}

fn format_count(v: f64) -> String {
    if v.fract() != 0.0 { return format!("{:.2}", v); }
    let digits = format!("{}", v as i64);
    let (sign, digits) = match digits.strip_prefix('-') {
        Some(d) => ("-", d.to_string()),
        None => ("", digits),
    };
    let mut out = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 { out.push(','); }
        out.push(ch);
    }
    format!("{}{}", sign, out)
}
