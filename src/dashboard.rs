//! Fixed dashboard panels over the state-diff views and `wallet_map`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::ResultSet;
use crate::error::AppResult;
use crate::facade::Explorer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelKind {
    Bars,
    Table,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Panel {
    pub id: &'static str,
    pub title: &'static str,
    pub sql: &'static str,
    pub kind: PanelKind,
    /// Bar label column, or the first column shown for tables.
    pub label: &'static str,
    pub value: &'static str,
}

/// Only labeled wallets count; the inner join drops unknown classes.
pub const WALLET_SHARE: Panel = Panel {
    id: "wallet_share",
    title: "Wallet share (known classes)",
    sql: "SELECT w.wallet AS wallet, COUNT(*) AS cnt \
          FROM deployed_or_replaced d \
          INNER JOIN wallet_map w ON d.class_hash = w.class_hash \
          GROUP BY w.wallet \
          ORDER BY cnt DESC, wallet \
          LIMIT 12",
    kind: PanelKind::Bars,
    label: "wallet",
    value: "cnt",
};

/// `0x1` is the system contract and would dwarf everything else.
pub const TOP_STORAGE_WRITERS: Panel = Panel {
    id: "top_storage_writers",
    title: "Top storage writers",
    sql: "SELECT address, COUNT(*) AS writes \
          FROM storage_diffs \
          WHERE address IS NOT NULL AND lower(address) <> '0x1' \
          GROUP BY address \
          ORDER BY writes DESC, address \
          LIMIT 20",
    kind: PanelKind::Bars,
    label: "address",
    value: "writes",
};

pub const LATEST_NONCES: Panel = Panel {
    id: "latest_nonces",
    title: "Latest nonces",
    sql: "SELECT contract_address, MAX(nonce) AS latest_nonce \
          FROM nonces \
          GROUP BY contract_address \
          ORDER BY contract_address \
          LIMIT 50",
    kind: PanelKind::Table,
    label: "contract_address",
    value: "latest_nonce",
};

pub const PANELS: [Panel; 3] = [WALLET_SHARE, TOP_STORAGE_WRITERS, LATEST_NONCES];

#[derive(Debug, Clone)]
pub struct PanelResult {
    pub panel: Panel,
    pub rows: ResultSet,
}

/// Run every panel query in order. The first failing query aborts.
pub async fn load(explorer: &Explorer) -> AppResult<Vec<PanelResult>> {
    let mut out = Vec::with_capacity(PANELS.len());
    for panel in PANELS {
        let rows = explorer.execute(panel.sql).await?;
        debug!(target: "harborx::facade", "{}: {} rows", panel.id, rows.row_count());
        out.push(PanelResult { panel, rows });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panel_queries_bound_their_output() {
        assert!(WALLET_SHARE.sql.ends_with("LIMIT 12"));
        assert!(TOP_STORAGE_WRITERS.sql.ends_with("LIMIT 20"));
        assert!(LATEST_NONCES.sql.ends_with("LIMIT 50"));
        assert!(WALLET_SHARE.sql.contains("INNER JOIN wallet_map"));
        assert!(TOP_STORAGE_WRITERS.sql.contains("<> '0x1'"));
    }
}
