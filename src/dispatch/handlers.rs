//! Command handlers
//!
//! Each handler resolves its subject, pulls data through the gateway, and
//! reports back through a HandlerResult. A handler that cannot resolve its
//! subject answers with an explanatory narrative and empty data; that is a
//! successful dispatch outcome, not an error.

use crate::composer;
use crate::market::MarketDataGateway;
use crate::models::{HandlerResult, MoverKind};
use crate::symbols;
use crate::Result;
use serde_json::json;

/// Static educational topics for the glossary handler
const GLOSSARY: &[(&str, &str)] = &[
    (
        "pe ratio",
        "The price-to-earnings (P/E) ratio divides a company's share price by its \
         earnings per share. A high P/E can mean the market expects growth, while a \
         low P/E can signal undervaluation or weak prospects.",
    ),
    (
        "market cap",
        "Market capitalization is the total value of a company's shares: share price \
         multiplied by shares outstanding. Companies are often grouped into large-cap, \
         mid-cap and small-cap buckets by this number.",
    ),
    (
        "eps",
        "Earnings per share (EPS) is a company's net profit divided by its outstanding \
         shares. It is the denominator of the P/E ratio and a common input to valuation.",
    ),
    (
        "stock market",
        "The stock market is where shares of listed companies are bought and sold. In \
         India the main exchanges are the NSE and BSE; prices move with supply, demand \
         and expectations about company performance.",
    ),
];

/// Stock-quote lookup for a symbol resolved from the rule capture or raw text
pub async fn quote_lookup(
    gateway: &MarketDataGateway,
    capture: Option<&str>,
    text: &str,
) -> Result<HandlerResult> {
    let Some(symbol) = symbols::resolve_with_capture(capture, text) else {
        return Ok(HandlerResult::narrative(
            "I couldn't identify a ticker symbol in that. Try something like \
             \"What is the TCS stock price\" or mention the company name.",
        ));
    };

    match gateway.get_quote(&symbol).await {
        Some(record) => Ok(HandlerResult {
            narrative_context: composer::format_quote(&record),
            stock_data: Some(record),
            additional_data: None,
        }),
        None => Ok(HandlerResult::narrative(format!(
            "I couldn't find market data for {} right now. The data providers may be \
             unavailable, or the symbol may not be listed.",
            symbol
        ))),
    }
}

pub async fn movers(gateway: &MarketDataGateway, kind: MoverKind) -> Result<HandlerResult> {
    match gateway.movers(kind).await {
        Some(list) => {
            let narrative = composer::format_movers(kind, &list);
            let additional = json!({
                "type": "market_movers",
                "kind": kind.label(),
                "movers": list,
            });
            Ok(HandlerResult {
                narrative_context: narrative,
                stock_data: None,
                additional_data: Some(additional),
            })
        }
        None => Ok(HandlerResult::narrative(format!(
            "I couldn't fetch today's top {} right now, please try again in a moment.",
            kind.label()
        ))),
    }
}

/// General or symbol-scoped news digest
pub async fn news(
    gateway: &MarketDataGateway,
    capture: Option<&str>,
    text: &str,
) -> Result<HandlerResult> {
    // News is valid without a subject, so resolution failure is fine here
    let symbol = match capture {
        Some(c) => symbols::resolve_with_capture(Some(c), c),
        None => symbols::resolve(text),
    };

    match gateway.news(symbol.as_deref()).await {
        Some(items) => {
            let narrative = composer::format_news(&items, symbol.as_deref());
            let additional = json!({
                "type": "news",
                "symbol": symbol,
                "items": items,
            });
            Ok(HandlerResult {
                narrative_context: narrative,
                stock_data: None,
                additional_data: Some(additional),
            })
        }
        None => Ok(HandlerResult::narrative(match symbol {
            Some(s) => format!("I couldn't fetch news for {} right now.", s),
            None => "I couldn't fetch market news right now.".to_string(),
        })),
    }
}

/// Two-way comparison. The two symbols are independent, so their quotes are
/// fetched concurrently.
pub async fn compare(
    gateway: &MarketDataGateway,
    first: Option<&str>,
    second: Option<&str>,
    text: &str,
) -> Result<HandlerResult> {
    let mentioned = symbols::extract_symbols(text);

    let symbol_a = first
        .and_then(|c| symbols::resolve_with_capture(Some(c), c))
        .or_else(|| mentioned.first().cloned());
    let symbol_b = second
        .and_then(|c| symbols::resolve_with_capture(Some(c), c))
        .or_else(|| mentioned.get(1).cloned());

    let (Some(symbol_a), Some(symbol_b)) = (symbol_a, symbol_b) else {
        return Ok(HandlerResult::narrative(
            "I need two symbols to compare, for example \"Compare TCS and INFY\".",
        ));
    };

    let (quote_a, quote_b) = tokio::join!(
        gateway.get_quote(&symbol_a),
        gateway.get_quote(&symbol_b)
    );

    match (quote_a, quote_b) {
        (Some(a), Some(b)) => {
            let narrative = composer::format_comparison(&a, &b);
            let additional = json!({
                "type": "stock_comparison",
                "stocks": [a, b],
            });
            Ok(HandlerResult {
                narrative_context: narrative,
                stock_data: None,
                additional_data: Some(additional),
            })
        }
        (Some(_), None) => Ok(HandlerResult::narrative(format!(
            "I found data for {} but not for {}, so I can't compare them right now.",
            symbol_a, symbol_b
        ))),
        (None, Some(_)) => Ok(HandlerResult::narrative(format!(
            "I found data for {} but not for {}, so I can't compare them right now.",
            symbol_b, symbol_a
        ))),
        (None, None) => Ok(HandlerResult::narrative(format!(
            "I couldn't find market data for either {} or {}.",
            symbol_a, symbol_b
        ))),
    }
}

/// Static market-index overview
pub async fn index_info() -> Result<HandlerResult> {
    Ok(HandlerResult::narrative(
        "The two benchmark indices for Indian equities are the SENSEX (30 large \
         companies on the BSE) and the NIFTY 50 (50 large companies on the NSE). \
         They are the usual shorthand for how the market is doing; ask me about a \
         specific stock for live numbers.",
    ))
}

/// Educational glossary lookup from the static topic table
pub async fn glossary(capture: Option<&str>, text: &str) -> Result<HandlerResult> {
    let raw = capture.unwrap_or(text);
    let normalized = raw.to_lowercase().replace(['/', '-'], "");
    let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");

    for (topic, explanation) in GLOSSARY {
        if normalized.contains(topic) || topic.contains(normalized.as_str()) {
            return Ok(HandlerResult::narrative(*explanation));
        }
    }

    Ok(HandlerResult::narrative(
        "I can explain the P/E ratio, market cap, EPS, or how the stock market works. \
         Which one would you like?",
    ))
}

/// Static redirect; portfolio data itself lives with another subsystem
pub async fn portfolio_pointer() -> Result<HandlerResult> {
    Ok(HandlerResult::narrative(
        "Your holdings and virtual trades live in the Portfolio tab. Open it to see \
         positions, paper profit and loss, and your trade history.",
    ))
}

/// Generic fallback: opportunistic quote lookup, else a help message
pub async fn fallback(gateway: &MarketDataGateway, text: &str) -> Result<HandlerResult> {
    if let Some(symbol) = symbols::resolve(text) {
        if let Some(record) = gateway.get_quote(&symbol).await {
            return Ok(HandlerResult {
                narrative_context: composer::format_quote(&record),
                stock_data: Some(record),
                additional_data: None,
            });
        }
    }

    Ok(HandlerResult::narrative(
        "I can look up stock prices, show today's top gainers and losers, fetch \
         market news, compare two stocks, or explain terms like P/E ratio and \
         market cap. What would you like to know?",
    ))
}
