use crate::balance::BalanceSnapshot;
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use std::collections::BTreeMap;

/// Balance history as reconstructed by `Store::load_all_snapshots`.
pub type BalanceHistory = BTreeMap<String, BTreeMap<String, Vec<BalanceSnapshot>>>;

#[derive(Debug, Clone)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Table,
        }
    }
}

pub fn format_balances(history: &BalanceHistory, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => format_balances_table(history),
        OutputFormat::Json => format_balances_json(history),
        OutputFormat::Csv => format_balances_csv(history),
    }
}

/// One table per network. Zero balances are noise in a human-readable report
/// and are left out; the JSON and CSV forms keep everything.
fn format_balances_table(history: &BalanceHistory) -> String {
    if history.is_empty() {
        return "No balances recorded.".to_string();
    }

    let mut out = String::new();
    for (network, addresses) in history {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec!["Address", "Token Contract", "Name", "Balance", "Status"]);

        for (address, snapshots) in addresses {
            for snapshot in snapshots {
                for (token, record) in snapshot {
                    if record.balance == "0" {
                        continue;
                    }
                    table.add_row(vec![
                        Cell::new(address),
                        Cell::new(token),
                        Cell::new(record.name.as_deref().unwrap_or("-")),
                        Cell::new(&record.balance),
                        Cell::new(format!("{:?}", record.status).to_lowercase()),
                    ]);
                }
            }
        }

        out.push_str(network);
        out.push('\n');
        out.push_str(&table.to_string());
        out.push('\n');
    }

    out
}

fn format_balances_json(history: &BalanceHistory) -> String {
    serde_json::to_string_pretty(history).unwrap_or_else(|_| "{}".to_string())
}

fn format_balances_csv(history: &BalanceHistory) -> String {
    let mut wtr = Writer::from_writer(vec![]);

    let _ = wtr.write_record(["network", "address", "token", "name", "balance", "status"]);

    for (network, addresses) in history {
        for (address, snapshots) in addresses {
            for snapshot in snapshots {
                for (token, record) in snapshot {
                    let _ = wtr.write_record([
                        network,
                        address,
                        token,
                        record.name.as_deref().unwrap_or(""),
                        &record.balance,
                        &format!("{:?}", record.status).to_lowercase(),
                    ]);
                }
            }
        }
    }

    String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
}
