//! Indexer client
//!
//! A failover-capable client over a pool of Chronik-compatible indexer
//! endpoints, with health monitoring, per-address short-TTL caching, and
//! batched multi-txid lookups.
//!
//! The public contract is the `IndexerClient` trait so tests can substitute
//! a fake implementation through ordinary dependency injection instead of
//! intercepting HTTP.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WalletError};
use crate::types::{Balance, TokenMetadata, TxSummary, Utxo};

/// History ordering for `get_transactions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryOrder {
    Ascending,
    Descending,
}

/// Maximum txids accepted in a single `get_tx` batch call.
pub const MAX_TX_BATCH: usize = 20;

/// The operations the rest of the wallet requires of an indexer.
#[async_trait]
pub trait IndexerClient: Send + Sync {
    async fn get_balance(&self, address: &str) -> Result<Balance>;
    async fn get_utxos(&self, address: &str) -> Result<Vec<Utxo>>;
    async fn get_transactions(&self, address: &str, order: HistoryOrder) -> Result<Vec<TxSummary>>;
    async fn get_tx_batch(&self, txids: &[String]) -> Result<Vec<Vec<u8>>>;
    async fn broadcast(&self, rawhex: &str) -> Result<String>;
    async fn token_info(&self, token_id: &str) -> Result<TokenMetadata>;
    async fn get_xec_usd(&self) -> Result<f64>;
    /// Discard any cached balance/UTXO entry for `address`.
    fn invalidate_cache(&self, address: &str);
}

/// Per-endpoint health tracking, mirroring the latency-history/score
/// approach used for node selection elsewhere in this codebase.
#[derive(Debug, Clone, Default)]
struct EndpointHealth {
    latencies_ms: VecDeque<u32>,
    failures: u32,
    last_error: Option<String>,
}

const LATENCY_HISTORY_LEN: usize = 10;

impl EndpointHealth {
    fn record_success(&mut self, latency_ms: u32) {
        if self.latencies_ms.len() == LATENCY_HISTORY_LEN {
            self.latencies_ms.pop_front();
        }
        self.latencies_ms.push_back(latency_ms);
        self.failures = 0;
        self.last_error = None;
    }

    fn record_failure(&mut self, error: String) {
        self.failures = self.failures.saturating_add(1);
        self.last_error = Some(error);
    }

    fn is_healthy(&self) -> bool {
        self.failures < 3
    }

    fn average_latency_ms(&self) -> u32 {
        if self.latencies_ms.is_empty() {
            return 0;
        }
        (self.latencies_ms.iter().map(|&v| v as u64).sum::<u64>() / self.latencies_ms.len() as u64)
            as u32
    }

    /// Higher is better; unhealthy endpoints score 0 and sort last.
    fn score(&self) -> i64 {
        if !self.is_healthy() {
            return 0;
        }
        1_000_000 - self.average_latency_ms() as i64
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    fetched_at: Instant,
}

/// A pooled Chronik-compatible HTTP client with failover and short-TTL
/// per-address caching.
pub struct ChronikClient {
    http: reqwest::Client,
    endpoints: Mutex<Vec<(String, EndpointHealth)>>,
    utxo_cache: Mutex<HashMap<String, CacheEntry<Vec<Utxo>>>>,
    token_cache: Mutex<HashMap<String, TokenMetadata>>,
    cache_ttl: Duration,
}

impl ChronikClient {
    pub fn new(endpoints: Vec<String>, cache_ttl: Duration) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(WalletError::invalid_input("indexer endpoint list is empty"));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            endpoints: Mutex::new(
                endpoints
                    .into_iter()
                    .map(|url| (url, EndpointHealth::default()))
                    .collect(),
            ),
            utxo_cache: Mutex::new(HashMap::new()),
            token_cache: Mutex::new(HashMap::new()),
            cache_ttl,
        })
    }

    /// Ordered endpoint URLs, healthiest first.
    fn ranked_endpoints(&self) -> Vec<String> {
        let guard = self.endpoints.lock().expect("endpoint lock poisoned");
        let mut ranked: Vec<(String, i64)> =
            guard.iter().map(|(url, h)| (url.clone(), h.score())).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.into_iter().map(|(url, _)| url).collect()
    }

    fn record_success(&self, url: &str, latency_ms: u32) {
        let mut guard = self.endpoints.lock().expect("endpoint lock poisoned");
        if let Some((_, health)) = guard.iter_mut().find(|(u, _)| u == url) {
            health.record_success(latency_ms);
        }
    }

    fn record_failure(&self, url: &str, error: String) {
        let mut guard = self.endpoints.lock().expect("endpoint lock poisoned");
        if let Some((_, health)) = guard.iter_mut().find(|(u, _)| u == url) {
            health.record_failure(error);
        }
    }

    /// Run `path` against each endpoint in health order until one succeeds,
    /// surfacing `NetworkError` once all are exhausted.
    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let endpoints = self.ranked_endpoints();
        let mut last_error = String::from("no endpoints configured");

        for base in endpoints {
            let url = format!("{base}{path}");
            let started = Instant::now();
            match self.http.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => match resp.json::<T>().await {
                    Ok(value) => {
                        self.record_success(&base, started.elapsed().as_millis() as u32);
                        return Ok(value);
                    }
                    Err(e) => {
                        last_error = format!("{base}: invalid response body: {e}");
                        self.record_failure(&base, last_error.clone());
                    }
                },
                Ok(resp) if resp.status().is_client_error() && resp.status().as_u16() != 429 => {
                    return Err(WalletError::NetworkError(format!(
                        "{base}: rejected with status {}",
                        resp.status()
                    )));
                }
                Ok(resp) => {
                    last_error = format!("{base}: status {}", resp.status());
                    self.record_failure(&base, last_error.clone());
                }
                Err(e) => {
                    last_error = format!("{base}: {e}");
                    self.record_failure(&base, last_error.clone());
                }
            }
        }

        Err(WalletError::NetworkError(last_error))
    }

    async fn post_json<B: Serialize + Sync, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let endpoints = self.ranked_endpoints();
        let mut last_error = String::from("no endpoints configured");

        for base in endpoints {
            let url = format!("{base}{path}");
            let started = Instant::now();
            match self.http.post(&url).json(body).send().await {
                Ok(resp) if resp.status().is_success() => match resp.json::<T>().await {
                    Ok(value) => {
                        self.record_success(&base, started.elapsed().as_millis() as u32);
                        return Ok(value);
                    }
                    Err(e) => {
                        last_error = format!("{base}: invalid response body: {e}");
                        self.record_failure(&base, last_error.clone());
                    }
                },
                Ok(resp) => {
                    let status = resp.status();
                    let detail = resp.text().await.unwrap_or_default();
                    if status.is_client_error() && status.as_u16() != 429 {
                        return Err(WalletError::BroadcastRejected(detail));
                    }
                    last_error = format!("{base}: status {status}");
                    self.record_failure(&base, last_error.clone());
                }
                Err(e) => {
                    last_error = format!("{base}: {e}");
                    self.record_failure(&base, last_error.clone());
                }
            }
        }

        Err(WalletError::NetworkError(last_error))
    }
}

#[derive(Debug, Deserialize)]
struct UtxosResponse {
    utxos: Vec<Utxo>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    txs: Vec<TxSummary>,
}

#[derive(Debug, Serialize)]
struct BroadcastRequest<'a> {
    #[serde(rename = "rawTx")]
    raw_tx: &'a str,
}

#[derive(Debug, Deserialize)]
struct BroadcastResponse {
    txid: String,
}

#[derive(Debug, Deserialize)]
struct XecPriceResponse {
    ecash: PriceUsd,
}

#[derive(Debug, Deserialize)]
struct PriceUsd {
    usd: f64,
}

#[async_trait]
impl IndexerClient for ChronikClient {
    async fn get_balance(&self, address: &str) -> Result<Balance> {
        // Balance response shape differs across Chronik deployments; derive
        // it from the UTXO list instead of trusting a separate endpoint.
        let utxos = self.get_utxos(address).await?;
        let mut balance = Balance::default();
        for utxo in &utxos {
            if utxo.token.is_some() {
                continue;
            }
            if utxo.is_confirmed() {
                balance.confirmed_sats += utxo.value_sats;
            } else {
                balance.unconfirmed_sats += utxo.value_sats;
            }
        }
        Ok(balance)
    }

    async fn get_utxos(&self, address: &str) -> Result<Vec<Utxo>> {
        {
            let cache = self.utxo_cache.lock().expect("utxo cache poisoned");
            if let Some(entry) = cache.get(address) {
                if entry.fetched_at.elapsed() < self.cache_ttl {
                    return Ok(entry.value.clone());
                }
            }
        }

        let path = format!("/script/p2pkh/{address}/utxos");
        let response: UtxosResponse = self.get_json(&path).await?;

        let mut cache = self.utxo_cache.lock().expect("utxo cache poisoned");
        cache.insert(
            address.to_string(),
            CacheEntry { value: response.utxos.clone(), fetched_at: Instant::now() },
        );
        Ok(response.utxos)
    }

    async fn get_transactions(&self, address: &str, order: HistoryOrder) -> Result<Vec<TxSummary>> {
        let dir = match order {
            HistoryOrder::Ascending => "asc",
            HistoryOrder::Descending => "desc",
        };
        let path = format!("/script/p2pkh/{address}/history?order={dir}");
        let response: HistoryResponse = self.get_json(&path).await?;
        Ok(response.txs)
    }

    async fn get_tx_batch(&self, txids: &[String]) -> Result<Vec<Vec<u8>>> {
        if txids.len() > MAX_TX_BATCH {
            return Err(WalletError::invalid_input(format!(
                "requested {} txids, limit is {MAX_TX_BATCH}",
                txids.len()
            )));
        }
        let mut out = Vec::with_capacity(txids.len());
        for txid in txids {
            let path = format!("/tx/{txid}");
            let raw: Vec<u8> = self.get_json(&path).await?;
            out.push(raw);
        }
        Ok(out)
    }

    async fn broadcast(&self, rawhex: &str) -> Result<String> {
        let body = BroadcastRequest { raw_tx: rawhex };
        let response: BroadcastResponse = self.post_json("/broadcastTx", &body).await?;
        Ok(response.txid)
    }

    async fn token_info(&self, token_id: &str) -> Result<TokenMetadata> {
        {
            let cache = self.token_cache.lock().expect("token cache poisoned");
            if let Some(meta) = cache.get(token_id) {
                return Ok(meta.clone());
            }
        }
        let path = format!("/token/{token_id}");
        let meta: TokenMetadata = self
            .get_json(&path)
            .await
            .map_err(|_| WalletError::UnknownToken(token_id.to_string()))?;

        let mut cache = self.token_cache.lock().expect("token cache poisoned");
        cache.insert(token_id.to_string(), meta.clone());
        Ok(meta)
    }

    async fn get_xec_usd(&self) -> Result<f64> {
        let response: XecPriceResponse = self.get_json("/price/xec").await?;
        Ok(response.ecash.usd)
    }

    fn invalidate_cache(&self, address: &str) {
        self.utxo_cache
            .lock()
            .expect("utxo cache poisoned")
            .remove(address);
    }
}
