//! Voice intent classification
//!
//! Categorizes a transcribed voice utterance into a fixed intent taxonomy
//! with a confidence score. This feeds the voice UI layer and is deliberately
//! independent of the command dispatcher's rule table: the two serve
//! different consumers (UI navigation vs. chat-content generation) and are
//! kept as separate modules with separate tests.

use crate::models::QuoteRecord;
use crate::symbols;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    Navigate,
    StockData,
    Action,
    Search,
    Compare,
    News,
    Help,
    Answer,
    Error,
}

/// Classified purpose of one transcript. Produced fresh per call, never
/// persisted beyond the message's voice metadata summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    #[serde(rename = "type")]
    pub intent_type: IntentType,
    pub data: serde_json::Value,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock_symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub symbols: Vec<String>,
}

impl Intent {
    fn new(intent_type: IntentType, data: serde_json::Value, confidence: f32) -> Self {
        Self {
            intent_type,
            data,
            confidence,
            stock_symbol: None,
            route: None,
            action: None,
            query: None,
            symbols: Vec::new(),
        }
    }
}

/// Static keyword lists — zero allocation

const NAV_ROUTES: &[(&str, &[&str])] = &[
    ("dashboard", &["go to dashboard", "open dashboard", "show dashboard", "home page", "main page"]),
    ("portfolio", &["go to portfolio", "open portfolio", "show portfolio", "my portfolio", "portfolio page", "my investments"]),
    ("watchlist", &["go to watchlist", "open watchlist", "show watchlist", "my watchlist"]),
    ("market", &["go to market", "open market", "market overview", "market page"]),
    ("news", &["go to news", "open news", "news page", "news section"]),
    ("orders", &["go to orders", "open orders", "my orders", "order history"]),
    ("settings", &["go to settings", "open settings", "my preferences"]),
];

const ACTIONS: &[(&str, &[&str])] = &[
    ("buy", &["buy"]),
    ("sell", &["sell"]),
    ("add_watchlist", &["add to watchlist", "add to my watchlist", "watch this"]),
    ("remove_watchlist", &["remove from watchlist", "unwatch"]),
    ("set_alert", &["set alert", "set an alert", "alert me", "notify me"]),
];

const STOCK_KEYWORDS: &[&str] = &[
    "price", "quote", "ticker", "market cap", "pe ratio", "share price", "trading at",
    "52 week", "stock data", "how much is",
];

const SEARCH_TRIGGERS: &[&str] = &["search for", "search", "look up", "lookup", "find"];

const COMPARE_TRIGGERS: &[&str] = &["compare", "versus", " vs "];

const NEWS_TRIGGERS: &[&str] = &["news", "headlines", "latest on"];

const HELP_TRIGGERS: &[&str] = &["help", "what can you do", "how do i"];

/// Base-to-boosted confidence from how much of the message the matched
/// phrase accounts for
fn confidence_for(matched: &str, transcript: &str) -> f32 {
    let matched_words = matched.split_whitespace().count() as f32;
    let total_words = transcript.split_whitespace().count().max(1) as f32;
    let ratio = (matched_words / total_words).min(1.0);
    0.5 + 0.4 * ratio
}

fn first_trigger<'a>(lowered: &str, triggers: &[&'a str]) -> Option<&'a str> {
    triggers.iter().find(|t| lowered.contains(*t)).copied()
}

fn text_after<'a>(lowered: &'a str, trigger: &str) -> Option<&'a str> {
    lowered
        .find(trigger)
        .map(|pos| lowered[pos + trigger.len()..].trim())
        .filter(|rest| !rest.is_empty())
}

/// Classify a transcript, optionally short-circuiting on a quote record the
/// caller already resolved. First matching category wins.
pub fn classify(transcript: &str, resolved: Option<&QuoteRecord>) -> Intent {
    let lowered = transcript.to_lowercase();

    // 1. Navigation
    for (route, triggers) in NAV_ROUTES {
        if let Some(matched) = first_trigger(&lowered, triggers) {
            let path = format!("/{}", route);
            let mut intent = Intent::new(
                IntentType::Navigate,
                json!(path),
                confidence_for(matched, &lowered),
            );
            intent.route = Some(path);
            return intent;
        }
    }

    // 2. Trading and watchlist actions
    for (action, triggers) in ACTIONS {
        if let Some(matched) = first_trigger(&lowered, triggers) {
            let mut intent = Intent::new(
                IntentType::Action,
                json!(action),
                confidence_for(matched, &lowered),
            );
            intent.action = Some((*action).to_string());
            intent.stock_symbol = symbols::resolve_spoken(transcript);
            return intent;
        }
    }

    // 3. Stock data, short-circuiting on an already-resolved record
    if let Some(record) = resolved {
        let mut intent = Intent::new(
            IntentType::StockData,
            serde_json::to_value(record).unwrap_or_default(),
            0.9,
        );
        intent.stock_symbol = Some(record.symbol.clone());
        return intent;
    }

    if let Some(matched) = first_trigger(&lowered, STOCK_KEYWORDS) {
        let symbol = symbols::resolve_spoken(transcript);
        let mut intent = Intent::new(
            IntentType::StockData,
            json!({ "symbol": symbol, "transcript": transcript }),
            confidence_for(matched, &lowered),
        );
        intent.stock_symbol = symbol;
        return intent;
    }

    // 4. Search / Compare / News / Help
    if let Some(matched) = first_trigger(&lowered, SEARCH_TRIGGERS) {
        let query = text_after(&lowered, matched).unwrap_or(&lowered).to_string();
        let mut intent = Intent::new(
            IntentType::Search,
            json!(query),
            confidence_for(matched, &lowered),
        );
        intent.query = Some(query);
        return intent;
    }

    if let Some(matched) = first_trigger(&lowered, COMPARE_TRIGGERS) {
        let found = symbols::extract_symbols(transcript);
        let mut intent = Intent::new(
            IntentType::Compare,
            json!(found),
            confidence_for(matched, &lowered),
        );
        intent.symbols = found;
        return intent;
    }

    if let Some(matched) = first_trigger(&lowered, NEWS_TRIGGERS) {
        let symbol = symbols::resolve_spoken(transcript);
        let mut intent = Intent::new(
            IntentType::News,
            json!({ "symbol": symbol }),
            confidence_for(matched, &lowered),
        );
        intent.stock_symbol = symbol;
        return intent;
    }

    if let Some(matched) = first_trigger(&lowered, HELP_TRIGGERS) {
        let topic = text_after(&lowered, matched).map(|t| t.to_string());
        let mut intent = Intent::new(
            IntentType::Help,
            json!(topic.clone().unwrap_or_else(|| lowered.clone())),
            confidence_for(matched, &lowered),
        );
        intent.query = topic;
        return intent;
    }

    // A bare symbol mention is still a stock-data ask
    if let Some(symbol) = symbols::resolve_spoken(transcript) {
        let mut intent = Intent::new(
            IntentType::StockData,
            json!({ "symbol": symbol, "transcript": transcript }),
            0.7,
        );
        intent.stock_symbol = Some(symbol);
        return intent;
    }

    // 5. Default: hand the transcript through for a conversational answer
    Intent::new(IntentType::Answer, json!(transcript), 0.5)
}
