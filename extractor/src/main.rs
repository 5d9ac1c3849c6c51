use std::{fs, path::Path, sync::Arc};

use anyhow::{ensure, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use extractor::{
    cli::{LabelsArgs, RunArgs},
    client::Api,
    export,
    extract::{ExtractConfig, Extractor},
    fetch,
    sql::{self, Network},
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract per-address transaction history CSVs
    Run(RunArgs),
    /// Extract cross-chain address labels or tags
    Labels(LabelsArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("extractor=info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Labels(args) => labels(args).await,
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let addresses = read_addresses(&args.address_file)?;
    let networks = if args.networks.is_empty() {
        Network::ALL.to_vec()
    } else {
        args.networks.clone()
    };

    let api = Api::new(&args.api.api_url, &args.api.api_key, args.api.to_config())?;
    let extractor = Extractor::new(
        Arc::new(api),
        ExtractConfig {
            max_addresses: args.max_addresses,
            empty_retry_limit: args.empty_retry_limit,
        },
    );

    info!(
        addresses = addresses.len(),
        networks = networks.len(),
        out_dir = %args.out_dir.display(),
        "starting extraction"
    );
    extractor
        .extract(&addresses, &networks, &args.out_dir)
        .await?;
    info!("extraction complete");
    Ok(())
}

async fn labels(args: LabelsArgs) -> Result<()> {
    let addresses = read_addresses(&args.address_file)?;
    let api = Api::new(&args.api.api_url, &args.api.api_key, args.api.to_config())?;

    let sql_text = sql::crosschain_info_sql(&addresses, args.info_type, args.limit);
    let set = fetch::paginate(&api, &sql_text).await;
    if set.rows.is_empty() {
        info!(info_type = %args.info_type, "no cross-chain rows for the given addresses");
        return Ok(());
    }

    let path = args
        .out_dir
        .join("crosschain")
        .join(format!("{}s.csv", args.info_type));
    export::write_rows_csv(&set.rows, &path)?;
    info!(rows = set.rows.len(), path = %path.display(), "wrote cross-chain info");
    Ok(())
}

fn read_addresses(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("read address file {}", path.display()))?;
    let addresses: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    ensure!(
        !addresses.is_empty(),
        "address file {} contains no addresses",
        path.display()
    );
    Ok(addresses)
}
