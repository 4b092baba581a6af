//! Token metadata resolution with a tiered fallback chain:
//! transaction-embedded decimals, well-known mints, LRU cache, network fetch,
//! default.

use log::{debug, warn};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::LayoutError;
use crate::layout;
use crate::retry::{RetryPolicy, with_retry};
use crate::transport::MetadataSource;

pub const NATIVE_MINT: &str = "So11111111111111111111111111111111111111112";

/// Used when nothing better is known.
pub const DEFAULT_DECIMALS: u8 = 9;

const KNOWN_DECIMALS: &[(&str, u8)] = &[
    (NATIVE_MINT, 9),
    ("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", 6), // USDC
    ("Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB", 6), // USDT
    ("DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263", 5), // BONK
];

pub fn known_decimals(mint: &str) -> Option<u8> {
    KNOWN_DECIMALS
        .iter()
        .find(|(m, _)| *m == mint)
        .map(|(_, d)| *d)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolMetadata {
    pub base_mint: String,
    pub quote_mint: String,
    pub base_decimals: u8,
    pub quote_decimals: u8,
}

/// Decodes a pool account into its metadata.
pub type PoolParser = fn(&[u8]) -> Result<PoolMetadata, LayoutError>;

fn bounded<K: std::hash::Hash + Eq, V>(capacity: usize) -> Mutex<LruCache<K, V>> {
    Mutex::new(LruCache::new(
        NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
    ))
}

pub struct TokenResolver {
    source: Option<Arc<dyn MetadataSource>>,
    retry: RetryPolicy,
    tokens: Mutex<LruCache<String, u8>>,
    pools: Mutex<LruCache<String, PoolMetadata>>,
}

impl TokenResolver {
    pub fn new(
        source: Option<Arc<dyn MetadataSource>>,
        retry: RetryPolicy,
        token_cache_capacity: usize,
        pool_cache_capacity: usize,
    ) -> Self {
        Self {
            source,
            retry,
            tokens: bounded(token_cache_capacity),
            pools: bounded(pool_cache_capacity),
        }
    }

    /// Decimals for `mint`. Never fails: an unreachable or missing source
    /// degrades to [`DEFAULT_DECIMALS`], which is not cached.
    pub async fn resolve(&self, mint: &str, embedded: Option<u8>) -> TokenInfo {
        let info = |decimals| TokenInfo {
            address: mint.to_string(),
            decimals,
        };

        if let Some(d) = embedded {
            return info(d);
        }
        if let Some(d) = known_decimals(mint) {
            return info(d);
        }

        let cached = self
            .tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(mint)
            .copied();
        if let Some(d) = cached {
            debug!("token cache hit {}", mint);
            return info(d);
        }

        let Some(source) = &self.source else {
            return info(DEFAULT_DECIMALS);
        };

        match with_retry(&self.retry, "fetch_mint_decimals", || source.fetch_mint_decimals(mint)).await {
            Ok(d) => {
                self.tokens
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .put(mint.to_string(), d);
                info(d)
            }
            Err(e) => {
                warn!("decimals lookup for {} failed, defaulting to {}: {}", mint, DEFAULT_DECIMALS, e);
                info(DEFAULT_DECIMALS)
            }
        }
    }

    /// Mint of an SPL token account, read from offset 0 of its data.
    pub async fn token_account_mint(&self, address: &str) -> Option<String> {
        let data = self.account_data(address).await?;
        match layout::pubkey(&data, 0) {
            Ok(mint) => Some(mint),
            Err(e) => {
                warn!("token account {} is not decodable: {}", address, e);
                None
            }
        }
    }

    /// Cached pool metadata; on a miss the pool account is fetched and
    /// decoded with `parse`.
    pub async fn pool_metadata(&self, pool: &str, parse: PoolParser) -> Option<PoolMetadata> {
        let cached = self
            .pools
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(pool)
            .cloned();
        if cached.is_some() {
            debug!("pool cache hit {}", pool);
            return cached;
        }

        let data = self.account_data(pool).await?;
        match parse(&data) {
            Ok(meta) => {
                self.pools
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .put(pool.to_string(), meta.clone());
                Some(meta)
            }
            Err(e) => {
                warn!("pool account {} is not decodable: {}", pool, e);
                None
            }
        }
    }

    async fn account_data(&self, address: &str) -> Option<Vec<u8>> {
        let source = self.source.as_ref()?;
        match with_retry(&self.retry, "fetch_account_data", || source.fetch_account_data(address)).await {
            Ok(Some(data)) => Some(data),
            Ok(None) => {
                debug!("account {} not found", address);
                None
            }
            Err(e) => {
                warn!("account fetch for {} failed: {}", address, e);
                None
            }
        }
    }
}
