use std::fmt;

use clap::ValueEnum;

/// Networks with a `fact_transactions` table on the query service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Network {
    Ethereum,
    Polygon,
    Arbitrum,
    Avalanche,
    Gnosis,
    Optimism,
}

impl Network {
    pub const ALL: [Network; 6] = [
        Network::Ethereum,
        Network::Polygon,
        Network::Arbitrum,
        Network::Avalanche,
        Network::Gnosis,
        Network::Optimism,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Ethereum => "ethereum",
            Network::Polygon => "polygon",
            Network::Arbitrum => "arbitrum",
            Network::Avalanche => "avalanche",
            Network::Gnosis => "gnosis",
            Network::Optimism => "optimism",
        }
    }

    fn table(&self) -> &'static str {
        match self {
            Network::Ethereum => "ethereum.core.fact_transactions",
            Network::Polygon => "polygon.core.fact_transactions",
            Network::Arbitrum => "arbitrum.core.fact_transactions",
            Network::Avalanche => "avalanche.core.fact_transactions",
            Network::Gnosis => "gnosis.core.fact_transactions",
            Network::Optimism => "optimism.core.fact_transactions",
        }
    }

    /// Native value column, where the network has one. Gnosis transactions
    /// carry no native value column.
    pub fn value_column(&self) -> Option<&'static str> {
        match self {
            Network::Polygon => Some("MATIC_VALUE"),
            Network::Avalanche => Some("AVAX_VALUE"),
            Network::Gnosis => None,
            Network::Ethereum | Network::Arbitrum | Network::Optimism => Some("ETH_VALUE"),
        }
    }

    /// Query selecting every transaction where one of `addresses` is sender
    /// or receiver. `limit` of 0 means no LIMIT clause.
    pub fn transactions_sql(&self, addresses: &[String], limit: u64) -> String {
        let list = lowered_list(addresses);
        let value_line = self
            .value_column()
            .map(|column| format!(",\n{column}"))
            .unwrap_or_default();
        format!(
            "SELECT TX_HASH,\n\
             BLOCK_TIMESTAMP,\n\
             FROM_ADDRESS,\n\
             TO_ADDRESS,\n\
             GAS_LIMIT,\n\
             GAS_USED,\n\
             TX_FEE{value_line}\n\
             FROM {table}\n\
             WHERE FROM_ADDRESS IN ({list})\n\
             OR TO_ADDRESS IN ({list})\n\
             {limit};",
            table = self.table(),
            limit = limit_clause(limit),
        )
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cross-chain address metadata tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum InfoType {
    Label,
    Tag,
}

impl InfoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InfoType::Label => "label",
            InfoType::Tag => "tag",
        }
    }

    fn table(&self) -> &'static str {
        match self {
            InfoType::Label => "crosschain.address_labels",
            InfoType::Tag => "crosschain.address_tags",
        }
    }
}

impl fmt::Display for InfoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query selecting cross-chain metadata rows for the given addresses.
pub fn crosschain_info_sql(addresses: &[String], info_type: InfoType, limit: u64) -> String {
    let list = lowered_list(addresses);
    format!(
        "SELECT *\n\
         FROM {table}\n\
         WHERE ADDRESS IN ({list})\n\
         {limit};",
        table = info_type.table(),
        limit = limit_clause(limit),
    )
}

fn lowered_list(addresses: &[String]) -> String {
    addresses
        .iter()
        .map(|address| format!("LOWER('{address}')"))
        .collect::<Vec<_>>()
        .join(",")
}

fn limit_clause(limit: u64) -> String {
    if limit == 0 {
        String::new()
    } else {
        format!("LIMIT {limit}")
    }
}
