use std::path::PathBuf;

use clap::Args as ClapArgs;

use crate::{
    client::ApiConfig,
    sql::{InfoType, Network},
};

#[derive(ClapArgs, Debug)]
pub struct ApiArgs {
    #[arg(
        long,
        env = "FLIPSIDE_API_URL",
        default_value = "https://node-api.flipsidecrypto.com"
    )]
    pub api_url: String,
    #[arg(long, env = "FLIPSIDE_API_KEY")]
    pub api_key: String,
    #[arg(long, env = "PAGE_SIZE", default_value_t = 100_000)]
    pub page_size: usize,
    #[arg(long, env = "QUERY_TIMEOUT_MINUTES", default_value_t = 4)]
    pub timeout_minutes: u64,
    #[arg(long, env = "QUERY_TTL_MINUTES", default_value_t = 60)]
    pub ttl_minutes: u64,
    #[arg(
        long,
        default_value_t = false,
        help = "Bypass the service's cached query results"
    )]
    pub no_cache: bool,
    #[arg(long, env = "RETRY_INTERVAL_SECONDS", default_value_t = 1)]
    pub retry_interval_seconds: u64,
}

impl ApiArgs {
    pub fn to_config(&self) -> ApiConfig {
        ApiConfig {
            page_size: self.page_size,
            timeout_minutes: self.timeout_minutes,
            ttl_minutes: self.ttl_minutes,
            cached: !self.no_cache,
            retry_interval_seconds: self.retry_interval_seconds,
        }
    }
}

#[derive(ClapArgs, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub api: ApiArgs,
    #[arg(long, help = "File with one wallet address per line")]
    pub address_file: PathBuf,
    #[arg(long, default_value = "extract")]
    pub out_dir: PathBuf,
    #[arg(
        long,
        value_delimiter = ',',
        help = "Networks to extract; defaults to all supported"
    )]
    pub networks: Vec<Network>,
    #[arg(
        long,
        env = "MAX_ADDRESSES",
        default_value_t = 100,
        help = "Addresses per query; lower this on high-traffic networks"
    )]
    pub max_addresses: usize,
    #[arg(
        long,
        default_value_t = 3,
        help = "Attempts before a still-empty address is accepted as having no history"
    )]
    pub empty_retry_limit: u32,
}

#[derive(ClapArgs, Debug)]
pub struct LabelsArgs {
    #[command(flatten)]
    pub api: ApiArgs,
    #[arg(long, help = "File with one wallet address per line")]
    pub address_file: PathBuf,
    #[arg(long, default_value = "extract")]
    pub out_dir: PathBuf,
    #[arg(long, value_enum, default_value_t = InfoType::Label)]
    pub info_type: InfoType,
    #[arg(long, default_value_t = 0, help = "Optional row limit; 0 means no limit")]
    pub limit: u64,
}
