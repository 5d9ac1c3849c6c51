use std::{path::Path, sync::Arc};

use anyhow::Result;
use futures::{future::BoxFuture, FutureExt};
use tracing::{info, warn};

use crate::{
    client::QueryApi,
    export,
    fetch::{self, ResultSet},
    sql::Network,
};

#[derive(Clone, Debug)]
pub struct ExtractConfig {
    /// Upper bound on addresses per query. High-traffic networks warrant
    /// lower values; at ~1000 transactions per address the service row cap
    /// is reached near 1000 addresses.
    pub max_addresses: usize,
    /// Attempts before a still-empty single address is accepted as having
    /// no transaction history.
    pub empty_retry_limit: u32,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_addresses: 100,
            empty_retry_limit: 3,
        }
    }
}

/// Walks the address list network by network, one batch-sized query at a
/// time. Batches whose query yields nothing usable are bisected and retried
/// until every address is either exported or confirmed empty.
pub struct Extractor {
    api: Arc<dyn QueryApi>,
    cfg: ExtractConfig,
}

impl Extractor {
    pub fn new(api: Arc<dyn QueryApi>, cfg: ExtractConfig) -> Self {
        Self { api, cfg }
    }

    pub async fn extract(
        &self,
        addresses: &[String],
        networks: &[Network],
        out_root: &Path,
    ) -> Result<()> {
        for network in networks {
            self.extract_network(addresses, *network, out_root).await?;
        }
        Ok(())
    }

    pub async fn extract_network(
        &self,
        addresses: &[String],
        network: Network,
        out_root: &Path,
    ) -> Result<()> {
        info!(%network, addresses = addresses.len(), "extracting transactions");
        for (start, end) in batch_ranges(addresses.len(), self.cfg.max_addresses) {
            info!(start, end, "extracting address batch");
            let set = self.query_range(addresses, start, end, network).await;
            if batch_failed(&set) {
                self.split_range(addresses, start, end, network, out_root)
                    .await?;
            } else {
                export::partition_and_write(&set.rows, &addresses[start..end], network, out_root)?;
            }
        }
        Ok(())
    }

    async fn query_range(
        &self,
        addresses: &[String],
        start: usize,
        end: usize,
        network: Network,
    ) -> ResultSet {
        let sql = network.transactions_sql(&addresses[start..end], 0);
        fetch::paginate(self.api.as_ref(), &sql).await
    }

    /// Bisects a failed range and resolves each half independently, left
    /// half first.
    fn split_range<'a>(
        &'a self,
        addresses: &'a [String],
        start: usize,
        end: usize,
        network: Network,
        out_root: &'a Path,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let mid = (start + end) / 2;
            warn!(start, end, mid, "batch produced no usable rows; retrying halves");
            self.resolve_range(addresses, start, mid, network, out_root)
                .await?;
            self.resolve_range(addresses, mid, end, network, out_root)
                .await
        }
        .boxed()
    }

    /// Re-runs one sub-range. Empty results bisect further until single
    /// addresses bottom out in `resolve_single`; the row-cap check applies
    /// only to top-level batches.
    fn resolve_range<'a>(
        &'a self,
        addresses: &'a [String],
        start: usize,
        end: usize,
        network: Network,
        out_root: &'a Path,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            if start == end {
                return Ok(());
            }
            if end - start == 1 {
                return self.resolve_single(addresses, start, network, out_root).await;
            }
            let set = self.query_range(addresses, start, end, network).await;
            if set.is_empty() {
                self.split_range(addresses, start, end, network, out_root)
                    .await
            } else {
                export::partition_and_write(&set.rows, &addresses[start..end], network, out_root)
            }
        }
        .boxed()
    }

    /// Terminal case for one address. An empty result with no failed page
    /// means the address genuinely has no history; results degraded by a
    /// failed page are retried up to the configured limit, after which the
    /// address is accepted as empty rather than recursing forever.
    async fn resolve_single(
        &self,
        addresses: &[String],
        index: usize,
        network: Network,
        out_root: &Path,
    ) -> Result<()> {
        let address = &addresses[index];
        for attempt in 1..=self.cfg.empty_retry_limit {
            let set = self
                .query_range(addresses, index, index + 1, network)
                .await;
            if !set.is_empty() {
                return export::partition_and_write(
                    &set.rows,
                    &addresses[index..index + 1],
                    network,
                    out_root,
                );
            }
            if !set.had_failures {
                info!(%address, "address confirmed empty");
                return Ok(());
            }
            warn!(%address, attempt, "query failed for single address; retrying");
        }
        warn!(
            %address,
            attempts = self.cfg.empty_retry_limit,
            "giving up on address after repeated failures; treating as empty"
        );
        Ok(())
    }
}

/// A batch query that returned nothing, or whose row count hit the service
/// cap, did not reliably answer the question; both route into bisection.
fn batch_failed(set: &ResultSet) -> bool {
    set.is_empty() || set.truncated
}

/// `ceil(len / cap)` contiguous index ranges exactly tiling `[0, len)`.
pub fn batch_ranges(len: usize, cap: usize) -> Vec<(usize, usize)> {
    let cap = cap.max(1);
    (0..len.div_ceil(cap))
        .map(|i| (i * cap, ((i + 1) * cap).min(len)))
        .collect()
}
