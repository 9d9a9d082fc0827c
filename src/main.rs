use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cintara_taxbit::{ExportPipeline, ExportRequest, PipelineConfig, TokenRegistry};

#[derive(Parser)]
#[command(name = "cintara-taxbit", version, about = "Export a Cintara wallet's transactions as TaxBit CSV")]
struct Cli {
    /// Extra token registrations (JSON), on top of TAXBIT_TOKENS_FILE
    #[arg(long, global = true)]
    tokens: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export transactions for one wallet
    Export {
        /// Wallet address (cintara1... or 0x...)
        #[arg(long)]
        address: String,

        /// First day (YYYY-MM-DD or RFC 3339), inclusive
        #[arg(long)]
        start: Option<String>,

        /// Last day (YYYY-MM-DD or RFC 3339), inclusive
        #[arg(long)]
        end: Option<String>,

        /// SQLite KV store (overrides TAXBIT_KV_PATH)
        #[arg(long)]
        kv: Option<PathBuf>,

        /// Node RPC URL (overrides TAXBIT_RPC_URL)
        #[arg(long)]
        rpc: Option<String>,

        #[arg(long)]
        scan_cap: Option<usize>,

        #[arg(long)]
        match_cap: Option<usize>,

        /// Write CSV here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// List registered tokens
    Tokens,
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = PipelineConfig::from_env().context("Invalid TAXBIT_* configuration")?;

    let mut registry = TokenRegistry::with_defaults();
    for file in config.tokens_file.iter().chain(cli.tokens.iter()) {
        let loaded = registry
            .load_file(file)
            .with_context(|| format!("Failed to load tokens from {:?}", file))?;
        info!(file = %file.display(), loaded, "Registered extra tokens");
    }

    match cli.command {
        Command::Tokens => {
            println!("{:<24} {:<16} {:>8}  NAME", "DENOM", "SYMBOL", "DECIMALS");
            for (denom, info) in registry.entries() {
                println!("{:<24} {:<16} {:>8}  {}", denom, info.symbol, info.decimals, info.name);
            }
        }
        Command::Export {
            address,
            start,
            end,
            kv,
            rpc,
            scan_cap,
            match_cap,
            output,
        } => {
            if kv.is_some() {
                config.kv_path = kv;
            }
            if let Some(url) = rpc {
                config.set_rpc_url(url).context("Invalid --rpc")?;
            }
            if let Some(cap) = scan_cap {
                config.scan_cap = cap;
            }
            if let Some(cap) = match_cap {
                config.match_cap = cap;
            }

            let pipeline = ExportPipeline::from_config(&config, Arc::new(registry))
                .context("Failed to set up discovery strategies")?;

            let request = ExportRequest::new(address).between(start.as_deref(), end.as_deref());
            let report = pipeline.export(&request)?;

            match &output {
                Some(path) => {
                    fs::write(path, &report.csv)
                        .with_context(|| format!("Failed to write {:?}", path))?;
                    info!(path = %path.display(), "CSV written");
                }
                None => print!("{}", report.csv),
            }

            for strategy in &report.strategies {
                info!(
                    strategy = %strategy.name,
                    found = strategy.found,
                    examined = strategy.examined,
                    truncated = strategy.truncated,
                    errors = strategy.errors.len(),
                    "Strategy summary"
                );
            }
            info!(
                rows = report.rows,
                truncated = report.truncated,
                low_confidence = report.low_confidence,
                estimated_timestamps = report.estimated_timestamps,
                "Export summary"
            );
        }
    }

    Ok(())
}
