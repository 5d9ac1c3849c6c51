use std::{
    collections::HashMap,
    fs,
    path::Path,
    sync::{Arc, Mutex},
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use extractor::client::{QueryApi, Row};
use extractor::extract::{ExtractConfig, Extractor};
use extractor::sql::Network;
use serde_json::json;
use tempfile::tempdir;

type Responder = Box<dyn Fn(u32) -> Result<Vec<Row>> + Send + Sync>;

/// Routes a query to the first needle found in its SQL text; the responder
/// sees how many times that needle has matched so far.
struct ScriptedApi {
    routes: Vec<(String, Responder)>,
    calls: Mutex<HashMap<String, u32>>,
}

impl ScriptedApi {
    fn new(routes: Vec<(String, Responder)>) -> Self {
        Self {
            routes,
            calls: Mutex::new(HashMap::new()),
        }
    }

    fn calls_for(&self, needle: &str) -> u32 {
        self.calls
            .lock()
            .expect("calls lock")
            .get(needle)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl QueryApi for ScriptedApi {
    async fn run(&self, sql: &str, _page_number: u32) -> Result<Vec<Row>> {
        for (needle, respond) in &self.routes {
            if sql.contains(needle.as_str()) {
                let attempt = {
                    let mut calls = self.calls.lock().expect("calls lock");
                    let count = calls.entry(needle.clone()).or_insert(0);
                    *count += 1;
                    *count
                };
                return respond(attempt);
            }
        }
        Ok(Vec::new())
    }

    fn page_size(&self) -> usize {
        100_000
    }
}

fn in_list(addresses: &[&str]) -> String {
    let list = addresses
        .iter()
        .map(|address| format!("LOWER('{address}')"))
        .collect::<Vec<_>>()
        .join(",");
    format!("({list})")
}

fn tx_row(hash: &str, from: &str, to: &str) -> Row {
    json!({
        "tx_hash": hash,
        "block_timestamp": "2023-01-01 00:00:00.000",
        "from_address": from,
        "to_address": to,
        "gas_limit": 21000,
        "gas_used": 21000,
        "tx_fee": 0.001,
        "eth_value": 0.5,
    })
    .as_object()
    .expect("object row")
    .clone()
}

fn csv_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .expect("read csv")
        .lines()
        .map(str::to_string)
        .collect()
}

fn extractor(api: Arc<ScriptedApi>, max_addresses: usize) -> Extractor {
    Extractor::new(
        api,
        ExtractConfig {
            max_addresses,
            empty_retry_limit: 3,
        },
    )
}

#[tokio::test]
async fn bisection_recovers_each_address_without_surfacing_errors() {
    let aaa = in_list(&["0xAAA"]);
    let bbb = in_list(&["0xBBB"]);
    let api = Arc::new(ScriptedApi::new(vec![
        (
            aaa.clone(),
            Box::new(|_| {
                Ok(vec![
                    tx_row("0x01", "0xAAA", "0xccc"),
                    tx_row("0x02", "0xddd", "0xeee"),
                ])
            }),
        ),
        (
            bbb.clone(),
            Box::new(|attempt| {
                if attempt <= 2 {
                    bail!("query timed out after 4 minutes");
                }
                Ok(vec![tx_row("0x03", "0xfff", "0xBBB")])
            }),
        ),
    ]));

    let out = tempdir().expect("tempdir");
    let addresses = vec!["0xAAA".to_string(), "0xBBB".to_string()];

    extractor(Arc::clone(&api), 1)
        .extract(&addresses, &[Network::Ethereum], out.path())
        .await
        .expect("extraction never surfaces query failures");

    let net_dir = out.path().join("ethereum");
    let aaa_lines = csv_lines(&net_dir.join("0xAAA_tx.csv"));
    assert_eq!(aaa_lines.len(), 2, "header plus the one row involving 0xAAA");
    assert!(aaa_lines[1].starts_with("0x01,"));

    let bbb_lines = csv_lines(&net_dir.join("0xBBB_tx.csv"));
    assert_eq!(bbb_lines.len(), 2);
    assert!(bbb_lines[1].starts_with("0x03,"));

    let files: Vec<_> = fs::read_dir(&net_dir).expect("read dir").collect();
    assert_eq!(files.len(), 2, "no file for uninvolved addresses");

    assert_eq!(api.calls_for(&bbb), 3, "empty twice, then data after bisection");
}

#[tokio::test]
async fn a_genuinely_empty_address_is_confirmed_without_retries() {
    let aaa = in_list(&["0xAAA"]);
    let api = Arc::new(ScriptedApi::new(vec![(
        aaa.clone(),
        Box::new(|_| Ok(Vec::new())),
    )]));

    let out = tempdir().expect("tempdir");
    let addresses = vec!["0xAAA".to_string()];

    extractor(Arc::clone(&api), 1)
        .extract(&addresses, &[Network::Ethereum], out.path())
        .await
        .expect("empty address is not an error");

    assert!(!out.path().join("ethereum").exists());
    assert_eq!(
        api.calls_for(&aaa),
        2,
        "the batch query plus one confirming single-address query"
    );
}

#[tokio::test]
async fn persistent_failures_stop_at_the_retry_limit() {
    let aaa = in_list(&["0xAAA"]);
    let api = Arc::new(ScriptedApi::new(vec![(
        aaa.clone(),
        Box::new(|_| bail!("service unavailable")),
    )]));

    let out = tempdir().expect("tempdir");
    let addresses = vec!["0xAAA".to_string()];

    extractor(Arc::clone(&api), 1)
        .extract(&addresses, &[Network::Ethereum], out.path())
        .await
        .expect("exhausted retries resolve the address as empty");

    assert!(!out.path().join("ethereum").exists());
    assert_eq!(
        api.calls_for(&aaa),
        4,
        "the batch query plus the capped retry attempts"
    );
}

#[tokio::test]
async fn an_empty_batch_bisects_down_to_its_active_addresses() {
    let all = in_list(&["0xa1", "0xa2", "0xa3", "0xa4"]);
    let left = in_list(&["0xa1", "0xa2"]);
    let right = in_list(&["0xa3", "0xa4"]);
    let a3 = in_list(&["0xa3"]);
    let a4 = in_list(&["0xa4"]);

    let api = Arc::new(ScriptedApi::new(vec![
        (all.clone(), Box::new(|_| Ok(Vec::new()))),
        (
            left.clone(),
            Box::new(|_| {
                Ok(vec![
                    tx_row("0x11", "0xa1", "0xff"),
                    tx_row("0x12", "0xff", "0xa2"),
                ])
            }),
        ),
        (right.clone(), Box::new(|_| Ok(Vec::new()))),
        (
            a3.clone(),
            Box::new(|attempt| {
                if attempt == 1 {
                    bail!("query timed out after 4 minutes");
                }
                Ok(vec![tx_row("0x13", "0xa3", "0xff")])
            }),
        ),
        (a4.clone(), Box::new(|_| Ok(Vec::new()))),
    ]));

    let out = tempdir().expect("tempdir");
    let addresses = vec![
        "0xa1".to_string(),
        "0xa2".to_string(),
        "0xa3".to_string(),
        "0xa4".to_string(),
    ];

    extractor(Arc::clone(&api), 100)
        .extract(&addresses, &[Network::Ethereum], out.path())
        .await
        .expect("bisection resolves every address");

    let net_dir = out.path().join("ethereum");
    assert!(net_dir.join("0xa1_tx.csv").exists());
    assert!(net_dir.join("0xa2_tx.csv").exists());
    assert!(net_dir.join("0xa3_tx.csv").exists());
    assert!(!net_dir.join("0xa4_tx.csv").exists());

    assert_eq!(api.calls_for(&all), 1);
    assert_eq!(api.calls_for(&left), 1);
    assert_eq!(api.calls_for(&right), 1);
    assert_eq!(api.calls_for(&a3), 2);
    assert_eq!(api.calls_for(&a4), 1, "confirmed empty on the first single query");
}

#[tokio::test]
async fn batches_cover_every_address_across_networks() {
    let first = in_list(&["0xa1", "0xa2"]);
    let second = in_list(&["0xa3"]);

    let api = Arc::new(ScriptedApi::new(vec![
        (
            first.clone(),
            Box::new(|_| Ok(vec![tx_row("0x21", "0xa1", "0xa2")])),
        ),
        (
            second.clone(),
            Box::new(|_| Ok(vec![tx_row("0x22", "0xa3", "0xff")])),
        ),
    ]));

    let out = tempdir().expect("tempdir");
    let addresses = vec!["0xa1".to_string(), "0xa2".to_string(), "0xa3".to_string()];

    extractor(Arc::clone(&api), 2)
        .extract(&addresses, &[Network::Ethereum, Network::Gnosis], out.path())
        .await
        .expect("both networks extract");

    for network in ["ethereum", "gnosis"] {
        let net_dir = out.path().join(network);
        assert!(net_dir.join("0xa1_tx.csv").exists());
        assert!(net_dir.join("0xa2_tx.csv").exists());
        assert!(net_dir.join("0xa3_tx.csv").exists());
    }

    assert_eq!(api.calls_for(&first), 2, "one batch query per network");
    assert_eq!(api.calls_for(&second), 2);
}
