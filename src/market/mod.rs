//! Market Data Gateway
//!
//! Resolves a symbol to a normalized quote by walking an ordered list of
//! (provider, symbol-variant) candidates. The walk is sequential within a
//! request, each call is attempted once with a fixed timeout, and a miss on
//! one candidate simply advances to the next. A short-TTL bounded cache
//! fronts the walk as a pure optimization.

pub mod providers;

pub use providers::{FmpProvider, MarketProvider, TwelveDataProvider, PROVIDER_TIMEOUT};

use crate::models::{Mover, MoverKind, NewsItem, QuoteRecord};
use crate::symbols;
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

const CACHE_TTL: Duration = Duration::from_secs(30);
const CACHE_CAPACITY: usize = 256;

/// Time-evicted quote cache. Never authoritative; entries past the TTL are
/// treated as absent and a full provider walk runs again.
struct QuoteCache {
    entries: RwLock<HashMap<String, (QuoteRecord, Instant)>>,
}

impl QuoteCache {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    async fn get(&self, key: &str) -> Option<QuoteRecord> {
        let entries = self.entries.read().await;
        entries.get(key).and_then(|(record, stored_at)| {
            (stored_at.elapsed() < CACHE_TTL).then(|| record.clone())
        })
    }

    async fn put(&self, key: String, record: QuoteRecord) {
        let mut entries = self.entries.write().await;
        if entries.len() >= CACHE_CAPACITY {
            entries.retain(|_, (_, stored_at)| stored_at.elapsed() < CACHE_TTL);
        }
        if entries.len() < CACHE_CAPACITY {
            entries.insert(key, (record, Instant::now()));
        }
    }
}

/// Symbol variants to try against a provider, in order: bare, `.NS`, `.BO`,
/// then the suffix-stripped form. Duplicates are dropped while keeping order.
pub fn symbol_variants(symbol: &str) -> Vec<String> {
    let upper = symbol.to_uppercase();
    let stripped = symbols::strip_exchange_suffix(&upper);

    let variants = vec![
        upper.clone(),
        format!("{}.NS", stripped),
        format!("{}.BO", stripped),
        stripped,
    ];

    let mut seen = Vec::with_capacity(variants.len());
    for v in variants {
        if !seen.contains(&v) {
            seen.push(v);
        }
    }
    seen
}

/// Ordered provider-fallback gateway over two upstream market-data APIs
pub struct MarketDataGateway {
    global: Arc<dyn MarketProvider>,
    indian: Arc<dyn MarketProvider>,
    cache: QuoteCache,
}

impl MarketDataGateway {
    pub fn new(global: Arc<dyn MarketProvider>, indian: Arc<dyn MarketProvider>) -> Self {
        Self {
            global,
            indian,
            cache: QuoteCache::new(),
        }
    }

    /// Build the gateway from environment-configured HTTP providers
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(
            Arc::new(FmpProvider::from_env()?),
            Arc::new(TwelveDataProvider::from_env()?),
        ))
    }

    /// Provider order for a symbol. Indian-listed tickers hit the provider
    /// with better NSE/BSE coverage first; the other is always the fallback.
    fn provider_order(&self, symbol: &str) -> [&Arc<dyn MarketProvider>; 2] {
        if symbols::is_indian_ticker(symbol) {
            [&self.indian, &self.global]
        } else {
            [&self.global, &self.indian]
        }
    }

    /// Resolve a symbol to a quote, or None once every (provider, variant)
    /// combination is exhausted. Never returns an error for upstream misses.
    pub async fn get_quote(&self, symbol: &str) -> Option<QuoteRecord> {
        let cache_key = symbols::strip_exchange_suffix(symbol);
        if let Some(cached) = self.cache.get(&cache_key).await {
            debug!(symbol, "quote served from cache");
            return Some(cached);
        }

        let variants = symbol_variants(symbol);

        for provider in self.provider_order(symbol) {
            for variant in &variants {
                match provider.quote(variant).await {
                    Ok(Some(record)) => {
                        debug!(
                            provider = provider.name(),
                            variant = variant.as_str(),
                            "quote resolved"
                        );
                        self.cache.put(cache_key, record.clone()).await;
                        return Some(record);
                    }
                    Ok(None) => {
                        debug!(
                            provider = provider.name(),
                            variant = variant.as_str(),
                            "empty quote, trying next variant"
                        );
                    }
                    Err(e) => {
                        warn!(
                            provider = provider.name(),
                            variant = variant.as_str(),
                            error = %e,
                            "provider call failed, trying next variant"
                        );
                    }
                }
            }
        }

        debug!(symbol, "all providers exhausted");
        None
    }

    /// Top gainers or losers, first provider with a non-empty list wins.
    pub async fn movers(&self, kind: MoverKind) -> Option<Vec<Mover>> {
        for provider in [&self.global, &self.indian] {
            match provider.movers(kind).await {
                Ok(movers) if !movers.is_empty() => return Some(movers),
                Ok(_) => debug!(provider = provider.name(), "empty movers list"),
                Err(e) => warn!(provider = provider.name(), error = %e, "movers call failed"),
            }
        }
        None
    }

    /// General or symbol-scoped news, with the same fallback shape.
    pub async fn news(&self, symbol: Option<&str>) -> Option<Vec<NewsItem>> {
        for provider in [&self.global, &self.indian] {
            match provider.news(symbol).await {
                Ok(items) if !items.is_empty() => return Some(items),
                Ok(_) => debug!(provider = provider.name(), "empty news list"),
                Err(e) => warn!(provider = provider.name(), error = %e, "news call failed"),
            }
        }
        None
    }
}
