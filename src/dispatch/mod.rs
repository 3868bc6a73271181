//! Command dispatch
//!
//! An ordered table of (patterns, handler) rules, evaluated top to bottom.
//! The first rule with a matching pattern wins; later rules are never
//! consulted even if they would also match. Precedence is data, not control
//! flow: reorder the table to change it.

pub mod handlers;

use crate::market::MarketDataGateway;
use crate::models::{HandlerResult, MoverKind};
use crate::Result;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

/// Which handler a rule routes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Gainers,
    Losers,
    Compare,
    News,
    IndexInfo,
    Glossary,
    Portfolio,
    Quote,
}

/// One ordered entry of the rule table
pub struct CommandRule {
    pub name: &'static str,
    pub description: &'static str,
    pub patterns: Vec<Regex>,
    pub handler: HandlerKind,
}

fn rule(
    name: &'static str,
    description: &'static str,
    handler: HandlerKind,
    patterns: &[&str],
) -> CommandRule {
    CommandRule {
        name,
        description,
        handler,
        patterns: patterns
            .iter()
            .map(|p| Regex::new(p).expect("invalid command rule pattern"))
            .collect(),
    }
}

lazy_static! {
    /// Process-wide, read-only rule table. Order defines precedence.
    static ref COMMAND_RULES: Vec<CommandRule> = vec![
        rule(
            "top_gainers",
            "Today's top gaining stocks",
            HandlerKind::Gainers,
            &[
                r"(?i)top\s+gainers?",
                r"(?i)best\s+perform(?:ers?|ing)",
                r"(?i)biggest\s+winners?",
            ],
        ),
        rule(
            "top_losers",
            "Today's top losing stocks",
            HandlerKind::Losers,
            &[
                r"(?i)top\s+losers?",
                r"(?i)worst\s+perform(?:ers?|ing)",
                r"(?i)biggest\s+losers?",
            ],
        ),
        rule(
            "compare_stocks",
            "Two-way stock comparison",
            HandlerKind::Compare,
            &[
                r"(?i)compare\s+([A-Za-z.]+)\s+(?:and|vs\.?|with|to)\s+([A-Za-z.]+)",
                r"(?i)\b([A-Za-z.]+)\s+vs\.?\s+([A-Za-z.]+)",
            ],
        ),
        rule(
            "market_news",
            "General or symbol-scoped market news",
            HandlerKind::News,
            &[
                r"(?i)news\s+(?:about|on|for)\s+([A-Za-z .&]+)",
                r"(?i)\bnews\b",
                r"(?i)\bheadlines?\b",
            ],
        ),
        rule(
            "market_index",
            "Benchmark index overview",
            HandlerKind::IndexInfo,
            &[
                r"(?i)\b(?:sensex|nifty)\b",
                r"(?i)market\s+ind(?:ex|ices)",
                r"(?i)how\s+is\s+the\s+market\b",
            ],
        ),
        rule(
            "glossary",
            "Educational explanations of market terms",
            HandlerKind::Glossary,
            &[
                r"(?i)what\s+is\s+(?:a\s+|the\s+)?(p\s*/?\s*e\s+ratio|market\s+cap(?:italization)?|eps|stock\s+market)\s*\??$",
                r"(?i)explain\s+(?:the\s+)?(p\s*/?\s*e\s+ratio|market\s+cap(?:italization)?|eps|stock\s+market)",
                r"(?i)define\s+(p\s*/?\s*e\s+ratio|market\s+cap(?:italization)?|eps|stock\s+market)",
            ],
        ),
        rule(
            "portfolio_pointer",
            "Redirect to the portfolio surface",
            HandlerKind::Portfolio,
            &[
                r"(?i)\bmy\s+portfolio\b",
                r"(?i)\bmy\s+holdings?\b",
                r"(?i)\bmy\s+investments?\b",
            ],
        ),
        rule(
            "stock_quote",
            "Live quote lookup for one symbol",
            HandlerKind::Quote,
            &[
                r"(?i)(?:price|quote)\s+(?:of|for)\s+([A-Za-z][A-Za-z .&]*)",
                r"(?i)what\s+is\s+([A-Za-z][A-Za-z .&]*?)\s+(?:stock|share)(?:\s+price)?",
                r"(?i)\b([A-Za-z.]+)\s+(?:stock|share)\s+price\b",
                r"(?i)tell\s+me\s+about\s+([A-Za-z][A-Za-z .&]*)",
                r"(?i)how\s+is\s+([A-Za-z][A-Za-z .&]*?)\s+(?:doing|performing|trading)",
            ],
        ),
    ];
}

/// Routes free text to the first matching handler in the rule table
pub struct CommandDispatcher {
    gateway: Arc<MarketDataGateway>,
}

impl CommandDispatcher {
    pub fn new(gateway: Arc<MarketDataGateway>) -> Self {
        Self { gateway }
    }

    pub fn rules() -> &'static [CommandRule] {
        &COMMAND_RULES
    }

    /// Evaluate the rule table top to bottom and run the winning handler.
    /// No match runs the generic fallback. Handlers that cannot resolve
    /// their subject still return Ok; only unexpected failures propagate.
    pub async fn dispatch(&self, text: &str) -> Result<HandlerResult> {
        let trimmed = text.trim();

        for rule in COMMAND_RULES.iter() {
            for pattern in &rule.patterns {
                if let Some(caps) = pattern.captures(trimmed) {
                    debug!(rule = rule.name, "command rule matched");
                    let first = caps.get(1).map(|m| m.as_str());
                    let second = caps.get(2).map(|m| m.as_str());
                    return self.run(rule.handler, first, second, trimmed).await;
                }
            }
        }

        debug!("no command rule matched, running generic fallback");
        handlers::fallback(&self.gateway, trimmed).await
    }

    async fn run(
        &self,
        handler: HandlerKind,
        first: Option<&str>,
        second: Option<&str>,
        text: &str,
    ) -> Result<HandlerResult> {
        match handler {
            HandlerKind::Gainers => handlers::movers(&self.gateway, MoverKind::Gainers).await,
            HandlerKind::Losers => handlers::movers(&self.gateway, MoverKind::Losers).await,
            HandlerKind::Compare => handlers::compare(&self.gateway, first, second, text).await,
            HandlerKind::News => handlers::news(&self.gateway, first, text).await,
            HandlerKind::IndexInfo => handlers::index_info().await,
            HandlerKind::Glossary => handlers::glossary(first, text).await,
            HandlerKind::Portfolio => handlers::portfolio_pointer().await,
            HandlerKind::Quote => handlers::quote_lookup(&self.gateway, first, text).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AssistantError;
    use crate::market::MarketProvider;
    use crate::models::{Mover, NewsItem, QuoteRecord};
    use chrono::Utc;

    /// Stub provider with canned data for every endpoint
    struct StubProvider {
        fail: bool,
    }

    fn stub_quote(symbol: &str) -> QuoteRecord {
        QuoteRecord {
            symbol: symbol.to_string(),
            name: format!("{} Ltd", symbol),
            price: 250.0,
            change: 5.0,
            change_percent: 2.0,
            day_low: Some(240.0),
            day_high: Some(255.0),
            year_low: Some(180.0),
            year_high: Some(260.0),
            market_cap: Some(1e11),
            pe: Some(21.0),
            eps: Some(11.9),
            volume: Some(1_000_000),
            sector: None,
            industry: None,
            provider: "stub".to_string(),
            resolved_at: Utc::now(),
        }
    }

    #[async_trait::async_trait]
    impl MarketProvider for StubProvider {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn quote(&self, symbol: &str) -> Result<Option<QuoteRecord>> {
            if self.fail {
                return Err(AssistantError::ProviderError("down".to_string()));
            }
            Ok(Some(stub_quote(symbol)))
        }

        async fn movers(&self, _kind: MoverKind) -> Result<Vec<Mover>> {
            if self.fail {
                return Err(AssistantError::ProviderError("down".to_string()));
            }
            Ok(vec![Mover {
                symbol: "ADANIENT".to_string(),
                name: "Adani Enterprises".to_string(),
                price: 2900.0,
                change: 140.0,
                change_percent: 5.07,
            }])
        }

        async fn news(&self, _symbol: Option<&str>) -> Result<Vec<NewsItem>> {
            if self.fail {
                return Err(AssistantError::ProviderError("down".to_string()));
            }
            Ok(vec![NewsItem {
                title: "Markets rally on earnings".to_string(),
                summary: None,
                url: None,
                source: "stub".to_string(),
                published_at: None,
            }])
        }
    }

    fn dispatcher(fail: bool) -> CommandDispatcher {
        let gateway = Arc::new(MarketDataGateway::new(
            Arc::new(StubProvider { fail }),
            Arc::new(StubProvider { fail }),
        ));
        CommandDispatcher::new(gateway)
    }

    #[tokio::test]
    async fn test_rule_order_determinism() {
        // Matches both the gainers rule and the news rule; gainers sits
        // earlier in the table and must win
        let result = dispatcher(false)
            .dispatch("any news on the top gainers today")
            .await
            .unwrap();

        let additional = result.additional_data.expect("movers payload");
        assert_eq!(additional["type"], "market_movers");
        assert_eq!(additional["kind"], "gainers");
    }

    #[tokio::test]
    async fn test_quote_rule_resolves_capture() {
        let result = dispatcher(false)
            .dispatch("What is TCS stock price")
            .await
            .unwrap();

        let record = result.stock_data.expect("quote");
        assert_eq!(record.symbol, "TCS");
        assert!(result.narrative_context.contains("TCS"));
    }

    #[tokio::test]
    async fn test_comparison_carries_both_records() {
        let result = dispatcher(false)
            .dispatch("Compare TCS and INFY")
            .await
            .unwrap();

        let additional = result.additional_data.expect("comparison payload");
        assert_eq!(additional["type"], "stock_comparison");
        let stocks = additional["stocks"].as_array().expect("stocks array");
        assert_eq!(stocks.len(), 2);
        assert_eq!(stocks[0]["symbol"], "TCS");
        assert_eq!(stocks[1]["symbol"], "INFY");
    }

    #[tokio::test]
    async fn test_unmatched_input_falls_through() {
        let result = dispatcher(true)
            .dispatch("hello there friend")
            .await
            .unwrap();

        assert!(result.stock_data.is_none());
        assert!(result.narrative_context.contains("look up stock prices"));
    }

    #[tokio::test]
    async fn test_exhausted_providers_still_succeed() {
        let result = dispatcher(true)
            .dispatch("What is TCS stock price")
            .await
            .unwrap();

        assert!(result.stock_data.is_none());
        assert!(result.narrative_context.contains("couldn't find market data for TCS"));
    }

    #[tokio::test]
    async fn test_glossary_is_static() {
        let result = dispatcher(true).dispatch("what is p/e ratio?").await.unwrap();
        assert!(result.narrative_context.contains("price-to-earnings"));

        let result = dispatcher(true).dispatch("explain market cap").await.unwrap();
        assert!(result.narrative_context.contains("Market capitalization"));
    }

    #[tokio::test]
    async fn test_portfolio_pointer_is_static() {
        let result = dispatcher(true).dispatch("show my portfolio").await.unwrap();
        assert!(result.narrative_context.contains("Portfolio tab"));
    }

    #[tokio::test]
    async fn test_news_scoped_by_symbol() {
        let result = dispatcher(false)
            .dispatch("news about INFY")
            .await
            .unwrap();

        let additional = result.additional_data.expect("news payload");
        assert_eq!(additional["type"], "news");
        assert_eq!(additional["symbol"], "INFY");
    }

    #[tokio::test]
    async fn test_index_info_is_static() {
        let result = dispatcher(true).dispatch("how is the market today").await.unwrap();
        assert!(result.narrative_context.contains("SENSEX"));
        assert!(result.narrative_context.contains("NIFTY"));
    }
}
