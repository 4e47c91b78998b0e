use std::io::Write;

use csv::Writer;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::account::Transaction;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Serialize)]
struct HistoryRow<'a> {
    timestamp: String,
    #[serde(rename = "type")]
    kind: String,
    amount: Decimal,
    balance_after: Decimal,
    counterparty: Option<&'a str>,
}

/// Fixed-width table, one row per transaction. Outflows are shown in parentheses.
pub fn print_history_table<W>(output: &mut W, history: &[Transaction]) -> std::io::Result<()>
where
    W: Write,
{
    writeln!(output, "--- Transaction History ---")?;
    if history.is_empty() {
        return writeln!(output, "No transactions recorded.");
    }
    writeln!(
        output,
        "{:<20} {:<20} {:<10} {:<15} {:<15}",
        "Date/Time", "Type", "Amount", "Balance After", "To/From Account"
    )?;
    for tx in history {
        let amount = if tx.amount().is_sign_negative() {
            format!("({})", tx.amount().abs())
        } else {
            tx.amount().to_string()
        };
        writeln!(
            output,
            "{:<20} {:<20} {:<10} {:<15} {:<15}",
            tx.timestamp().format(TIMESTAMP_FORMAT).to_string(),
            tx.kind().to_string(),
            amount,
            tx.balance_after().to_string(),
            tx.counterparty().map(String::as_str).unwrap_or("N/A"),
        )?;
    }
    Ok(())
}

pub fn print_history_csv<W>(output: &mut W, history: &[Transaction]) -> anyhow::Result<()>
where
    W: Write,
{
    let mut writer = Writer::from_writer(output);
    for tx in history {
        let row = HistoryRow {
            timestamp: tx.timestamp().format(TIMESTAMP_FORMAT).to_string(),
            kind: tx.kind().to_string(),
            amount: tx.amount(),
            balance_after: tx.balance_after(),
            counterparty: tx.counterparty().map(String::as_str),
        };
        if let Err(err) = writer.serialize(row) {
            anyhow::bail!("Failed to write to CSV: {err}")
        }
    }
    // Ensure all data is flushed to the output
    if let Err(err) = writer.flush() {
        anyhow::bail!("Failed to flush CSV writer: {err}")
    }
    Ok(())
}
