use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use token_scanner::report::{OutputFormat, format_balances};
use token_scanner::store::Store;

#[derive(Parser)]
#[command(name = "report")]
#[command(about = "Render recorded token balances", long_about = None)]
struct Cli {
    /// Output format: table, json or csv
    #[arg(short, long, default_value = "table")]
    format: String,

    /// Directory holding balance snapshot files
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format.as_str());

    let history = Store::load_all_snapshots(&cli.data_dir)?;
    println!("{}", format_balances(&history, &format));

    Ok(())
}
