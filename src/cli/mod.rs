pub mod charts;
pub mod outputformatter;

use crate::dashboard::{PanelKind, PanelResult};

/// Lines for one dashboard panel: title, then bars or a table.
pub fn render_panel(p: &PanelResult, termw: usize, color: bool) -> Vec<String> {
    let mut out = vec![format!("== {} ==", p.panel.title)];
    if p.rows.rows.is_empty() {
        out.push("(no rows)".to_string());
        return out;
    }
    match p.panel.kind {
        PanelKind::Bars => {
            let bars = charts::bars(&p.rows, p.panel.label, p.panel.value);
            out.extend(charts::render_bars(&bars, termw));
        }
        PanelKind::Table => out.extend(outputformatter::render_table(&p.rows, termw, color)),
    }
    out
}
