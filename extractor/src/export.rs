use std::{fs, path::Path};

use anyhow::{Context, Result};
use csv::Writer;
use serde_json::Value;
use tracing::debug;

use crate::{client::Row, sql::Network};

const TX_COLUMNS: [&str; 7] = [
    "tx_hash",
    "block_timestamp",
    "from_address",
    "to_address",
    "gas_limit",
    "gas_used",
    "tx_fee",
];

/// Writes one `<address>_tx.csv` under `out_root/<network>/` for every
/// address with matching rows. A row matches when its from-address or
/// to-address equals the address as stored. Addresses with no matching
/// rows leave no file.
pub fn partition_and_write(
    rows: &[Row],
    addresses: &[String],
    network: Network,
    out_root: &Path,
) -> Result<()> {
    let dir = out_root.join(network.as_str());
    for address in addresses {
        let matching: Vec<&Row> = rows.iter().filter(|row| involves(row, address)).collect();
        if matching.is_empty() {
            continue;
        }
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        let path = dir.join(format!("{address}_tx.csv"));
        write_transactions_csv(&matching, network, &path)?;
        debug!(%address, rows = matching.len(), path = %path.display(), "wrote address transactions");
    }
    Ok(())
}

fn involves(row: &Row, address: &str) -> bool {
    field_str(row, "from_address") == Some(address) || field_str(row, "to_address") == Some(address)
}

fn field_str<'a>(row: &'a Row, key: &str) -> Option<&'a str> {
    row.get(key).and_then(Value::as_str)
}

fn write_transactions_csv(rows: &[&Row], network: Network, path: &Path) -> Result<()> {
    let value_column = network.value_column().map(str::to_ascii_lowercase);
    let mut columns: Vec<&str> = TX_COLUMNS.to_vec();
    if let Some(column) = value_column.as_deref() {
        columns.push(column);
    }

    let mut writer =
        Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    writer.write_record(&columns).context("write csv header")?;
    for row in rows {
        let record: Vec<String> = columns.iter().map(|column| cell(row, column)).collect();
        writer.write_record(&record).context("write csv row")?;
    }
    writer.flush().context("flush csv")?;
    Ok(())
}

/// Writes a whole result set to one CSV, columns taken from the first row.
/// An empty set writes nothing.
pub fn write_rows_csv(rows: &[Row], path: &Path) -> Result<()> {
    let Some(first) = rows.first() else {
        return Ok(());
    };
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }

    let columns: Vec<&str> = first.keys().map(String::as_str).collect();
    let mut writer =
        Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    writer.write_record(&columns).context("write csv header")?;
    for row in rows {
        let record: Vec<String> = columns.iter().map(|column| cell(row, column)).collect();
        writer.write_record(&record).context("write csv row")?;
    }
    writer.flush().context("flush csv")?;
    Ok(())
}

fn cell(row: &Row, column: &str) -> String {
    match row.get(column) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
