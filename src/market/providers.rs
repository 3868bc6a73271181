//! Market-data provider clients
//!
//! Each provider is an HTTP GET API keyed by a query-string token. Calls
//! carry a fixed timeout and are attempted once; retry policy lives with the
//! caller, which walks symbol variants and providers instead.

use crate::error::AssistantError;
use crate::models::{Mover, MoverKind, NewsItem, QuoteRecord};
use crate::Result;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Fixed per-call timeout for every provider request
pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// A single upstream market-data API
#[async_trait::async_trait]
pub trait MarketProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fetch a quote for one exact symbol variant. `Ok(None)` means the
    /// provider answered but had nothing usable; `Err` means the call failed.
    /// Callers treat both the same way and move on.
    async fn quote(&self, symbol: &str) -> Result<Option<QuoteRecord>>;

    async fn movers(&self, kind: MoverKind) -> Result<Vec<Mover>>;

    async fn news(&self, symbol: Option<&str>) -> Result<Vec<NewsItem>>;
}

fn build_client() -> Result<Client> {
    Client::builder()
        .timeout(PROVIDER_TIMEOUT)
        .pool_idle_timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(4)
        .build()
        .map_err(AssistantError::from)
}

//
// ================= Financial Modeling Prep =================
//

/// Global-coverage provider backed by the FMP REST API
pub struct FmpProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl FmpProvider {
    pub fn new(api_key: String) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            api_key,
            base_url: "https://financialmodelingprep.com/api/v3".to_string(),
        })
    }

    pub fn from_env() -> Result<Self> {
        let api_key = env::var("FMP_API_KEY").unwrap_or_default();
        Self::new(api_key)
    }

    fn ensure_key(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(AssistantError::ProviderError(
                "FMP_API_KEY not configured".to_string(),
            ));
        }
        Ok(())
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str, extra: &str) -> Result<T> {
        let url = format!(
            "{}{}?apikey={}{}",
            self.base_url, path, self.api_key, extra
        );

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AssistantError::ProviderError(format!(
                "FMP returned {} for {}",
                status, path
            )));
        }

        Ok(response.json::<T>().await?)
    }
}

#[derive(Debug, Deserialize)]
struct FmpQuote {
    symbol: String,
    name: Option<String>,
    price: Option<f64>,
    change: Option<f64>,
    #[serde(rename = "changesPercentage")]
    changes_percentage: Option<f64>,
    #[serde(rename = "dayLow")]
    day_low: Option<f64>,
    #[serde(rename = "dayHigh")]
    day_high: Option<f64>,
    #[serde(rename = "yearLow")]
    year_low: Option<f64>,
    #[serde(rename = "yearHigh")]
    year_high: Option<f64>,
    #[serde(rename = "marketCap")]
    market_cap: Option<f64>,
    pe: Option<f64>,
    eps: Option<f64>,
    volume: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FmpMover {
    symbol: String,
    name: Option<String>,
    price: Option<f64>,
    change: Option<f64>,
    #[serde(rename = "changesPercentage")]
    changes_percentage: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FmpNewsItem {
    title: String,
    text: Option<String>,
    url: Option<String>,
    site: Option<String>,
    #[serde(rename = "publishedDate")]
    published_date: Option<String>,
}

impl FmpQuote {
    fn into_record(self) -> QuoteRecord {
        QuoteRecord {
            name: self.name.unwrap_or_else(|| self.symbol.clone()),
            symbol: self.symbol,
            price: self.price.unwrap_or(0.0),
            change: self.change.unwrap_or(0.0),
            change_percent: self.changes_percentage.unwrap_or(0.0),
            day_low: self.day_low,
            day_high: self.day_high,
            year_low: self.year_low,
            year_high: self.year_high,
            market_cap: self.market_cap,
            pe: self.pe,
            eps: self.eps,
            volume: self.volume,
            sector: None,
            industry: None,
            provider: "fmp".to_string(),
            resolved_at: Utc::now(),
        }
    }
}

#[async_trait::async_trait]
impl MarketProvider for FmpProvider {
    fn name(&self) -> &'static str {
        "fmp"
    }

    async fn quote(&self, symbol: &str) -> Result<Option<QuoteRecord>> {
        self.ensure_key()?;

        let quotes: Vec<FmpQuote> = self.get_json(&format!("/quote/{}", symbol), "").await?;

        let record = match quotes.into_iter().next() {
            Some(quote) => quote.into_record(),
            None => return Ok(None),
        };

        Ok(record.is_well_formed().then_some(record))
    }

    async fn movers(&self, kind: MoverKind) -> Result<Vec<Mover>> {
        self.ensure_key()?;

        let path = match kind {
            MoverKind::Gainers => "/stock_market/gainers",
            MoverKind::Losers => "/stock_market/losers",
        };

        let movers: Vec<FmpMover> = self.get_json(path, "").await?;

        Ok(movers
            .into_iter()
            .map(|m| Mover {
                name: m.name.unwrap_or_else(|| m.symbol.clone()),
                symbol: m.symbol,
                price: m.price.unwrap_or(0.0),
                change: m.change.unwrap_or(0.0),
                change_percent: m.changes_percentage.unwrap_or(0.0),
            })
            .collect())
    }

    async fn news(&self, symbol: Option<&str>) -> Result<Vec<NewsItem>> {
        self.ensure_key()?;

        let extra = match symbol {
            Some(s) => format!("&tickers={}&limit=10", s),
            None => "&limit=10".to_string(),
        };

        let items: Vec<FmpNewsItem> = self.get_json("/stock_news", &extra).await?;

        Ok(items
            .into_iter()
            .map(|n| NewsItem {
                title: n.title,
                summary: n.text,
                url: n.url,
                source: n.site.unwrap_or_else(|| "fmp".to_string()),
                published_at: n
                    .published_date
                    .and_then(|d| chrono::DateTime::parse_from_rfc3339(&d).ok())
                    .map(|d| d.with_timezone(&Utc)),
            })
            .collect())
    }
}

//
// ================= Twelve Data =================
//

/// Secondary provider with NSE/BSE coverage. Quote fields arrive as strings.
pub struct TwelveDataProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl TwelveDataProvider {
    pub fn new(api_key: String) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            api_key,
            base_url: "https://api.twelvedata.com".to_string(),
        })
    }

    pub fn from_env() -> Result<Self> {
        let api_key = env::var("TWELVEDATA_API_KEY").unwrap_or_default();
        Self::new(api_key)
    }
}

#[derive(Debug, Deserialize)]
struct TwelveDataQuote {
    symbol: Option<String>,
    name: Option<String>,
    close: Option<String>,
    change: Option<String>,
    percent_change: Option<String>,
    low: Option<String>,
    high: Option<String>,
    volume: Option<String>,
    fifty_two_week: Option<TwelveDataRange>,
    status: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TwelveDataRange {
    low: Option<String>,
    high: Option<String>,
}

fn parse_num(value: &Option<String>) -> Option<f64> {
    value.as_deref().and_then(|v| v.parse::<f64>().ok())
}

#[async_trait::async_trait]
impl MarketProvider for TwelveDataProvider {
    fn name(&self) -> &'static str {
        "twelvedata"
    }

    async fn quote(&self, symbol: &str) -> Result<Option<QuoteRecord>> {
        if self.api_key.is_empty() {
            return Err(AssistantError::ProviderError(
                "TWELVEDATA_API_KEY not configured".to_string(),
            ));
        }

        let url = format!(
            "{}/quote?symbol={}&apikey={}",
            self.base_url, symbol, self.api_key
        );

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AssistantError::ProviderError(format!(
                "Twelve Data returned {} for {}",
                status, symbol
            )));
        }

        let quote: TwelveDataQuote = response.json().await?;

        // Errors come back as 200s with a status field
        if quote.status.as_deref() == Some("error") {
            tracing::debug!(
                symbol,
                message = quote.message.as_deref().unwrap_or(""),
                "Twelve Data had no data for variant"
            );
            return Ok(None);
        }

        let symbol_out = match quote.symbol.clone() {
            Some(s) if !s.is_empty() => s,
            _ => return Ok(None),
        };

        let record = QuoteRecord {
            name: quote.name.clone().unwrap_or_else(|| symbol_out.clone()),
            symbol: symbol_out,
            price: parse_num(&quote.close).unwrap_or(0.0),
            change: parse_num(&quote.change).unwrap_or(0.0),
            change_percent: parse_num(&quote.percent_change).unwrap_or(0.0),
            day_low: parse_num(&quote.low),
            day_high: parse_num(&quote.high),
            year_low: quote.fifty_two_week.as_ref().and_then(|r| parse_num(&r.low)),
            year_high: quote.fifty_two_week.as_ref().and_then(|r| parse_num(&r.high)),
            market_cap: None,
            pe: None,
            eps: None,
            volume: parse_num(&quote.volume).map(|v| v as u64),
            sector: None,
            industry: None,
            provider: "twelvedata".to_string(),
            resolved_at: Utc::now(),
        };

        Ok(record.is_well_formed().then_some(record))
    }

    async fn movers(&self, _kind: MoverKind) -> Result<Vec<Mover>> {
        Err(AssistantError::ProviderError(
            "Twelve Data does not expose a movers endpoint".to_string(),
        ))
    }

    async fn news(&self, _symbol: Option<&str>) -> Result<Vec<NewsItem>> {
        Err(AssistantError::ProviderError(
            "Twelve Data does not expose a news endpoint".to_string(),
        ))
    }
}
