//! Response composition
//!
//! Pure formatting of resolved market data into structured text blocks.
//! Field order is stable so callers and tests can assert on substrings.

use crate::models::{Mover, MoverKind, NewsItem, QuoteRecord};
use std::fmt::Write;

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "N/A".to_string())
}

fn fmt_large(value: Option<f64>) -> String {
    match value {
        Some(v) if v >= 1e12 => format!("{:.2}T", v / 1e12),
        Some(v) if v >= 1e9 => format!("{:.2}B", v / 1e9),
        Some(v) if v >= 1e6 => format!("{:.2}M", v / 1e6),
        Some(v) => format!("{:.0}", v),
        None => "N/A".to_string(),
    }
}

fn change_sign(change: f64) -> &'static str {
    if change >= 0.0 {
        "+"
    } else {
        ""
    }
}

/// Structured block for a single quote: price/change, key metrics,
/// day and 52-week ranges, sector/industry, source.
pub fn format_quote(q: &QuoteRecord) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{} ({})", q.name, q.symbol);
    let _ = writeln!(
        out,
        "Price: {:.2} ({}{:.2}, {}{:.2}%)",
        q.price,
        change_sign(q.change),
        q.change,
        change_sign(q.change_percent),
        q.change_percent
    );
    let _ = writeln!(
        out,
        "Key metrics: Market Cap {} | P/E {} | EPS {} | Volume {}",
        fmt_large(q.market_cap),
        fmt_opt(q.pe),
        fmt_opt(q.eps),
        q.volume
            .map(|v| v.to_string())
            .unwrap_or_else(|| "N/A".to_string()),
    );
    let _ = writeln!(
        out,
        "Day range: {} - {}",
        fmt_opt(q.day_low),
        fmt_opt(q.day_high)
    );
    let _ = writeln!(
        out,
        "52-week range: {} - {}",
        fmt_opt(q.year_low),
        fmt_opt(q.year_high)
    );

    if q.sector.is_some() || q.industry.is_some() {
        let _ = writeln!(
            out,
            "Sector: {} | Industry: {}",
            q.sector.as_deref().unwrap_or("N/A"),
            q.industry.as_deref().unwrap_or("N/A"),
        );
    }

    let _ = writeln!(out, "Source: {}", q.provider);

    out
}

pub fn format_movers(kind: MoverKind, movers: &[Mover]) -> String {
    let mut out = String::new();

    let heading = match kind {
        MoverKind::Gainers => "Top gainers today:",
        MoverKind::Losers => "Top losers today:",
    };
    let _ = writeln!(out, "{}", heading);

    for (i, m) in movers.iter().take(10).enumerate() {
        let _ = writeln!(
            out,
            "{}. {} ({}): {:.2} ({}{:.2}%)",
            i + 1,
            m.name,
            m.symbol,
            m.price,
            change_sign(m.change_percent),
            m.change_percent
        );
    }

    out
}

/// Side-by-side comparison with one line per metric
pub fn format_comparison(a: &QuoteRecord, b: &QuoteRecord) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Comparison: {} vs {}", a.symbol, b.symbol);
    let _ = writeln!(
        out,
        "Price: {} {:.2} | {} {:.2}",
        a.symbol, a.price, b.symbol, b.price
    );
    let _ = writeln!(
        out,
        "Change: {} {}{:.2}% | {} {}{:.2}%",
        a.symbol,
        change_sign(a.change_percent),
        a.change_percent,
        b.symbol,
        change_sign(b.change_percent),
        b.change_percent
    );
    let _ = writeln!(
        out,
        "Market Cap: {} {} | {} {}",
        a.symbol,
        fmt_large(a.market_cap),
        b.symbol,
        fmt_large(b.market_cap)
    );
    let _ = writeln!(
        out,
        "P/E: {} {} | {} {}",
        a.symbol,
        fmt_opt(a.pe),
        b.symbol,
        fmt_opt(b.pe)
    );

    out
}

pub fn format_news(items: &[NewsItem], symbol: Option<&str>) -> String {
    let mut out = String::new();

    match symbol {
        Some(s) => {
            let _ = writeln!(out, "Latest news for {}:", s);
        }
        None => {
            let _ = writeln!(out, "Latest market news:");
        }
    }

    for (i, item) in items.iter().take(5).enumerate() {
        let _ = writeln!(out, "{}. {} ({})", i + 1, item.title, item.source);
        if let Some(summary) = &item.summary {
            let short: String = summary.chars().take(160).collect();
            let _ = writeln!(out, "   {}", short);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_quote() -> QuoteRecord {
        QuoteRecord {
            symbol: "TCS".to_string(),
            name: "Tata Consultancy Services".to_string(),
            price: 3512.40,
            change: 12.40,
            change_percent: 0.35,
            day_low: Some(3480.0),
            day_high: Some(3525.0),
            year_low: Some(3056.0),
            year_high: Some(4043.0),
            market_cap: Some(12_800_000_000_000.0),
            pe: Some(29.4),
            eps: Some(119.5),
            volume: Some(2_400_000),
            sector: Some("Information Technology".to_string()),
            industry: Some("IT Services".to_string()),
            provider: "twelvedata".to_string(),
            resolved_at: Utc::now(),
        }
    }

    #[test]
    fn test_quote_block_sections() {
        let block = format_quote(&sample_quote());
        assert!(block.contains("Tata Consultancy Services (TCS)"));
        assert!(block.contains("Price: 3512.40 (+12.40, +0.35%)"));
        assert!(block.contains("Key metrics:"));
        assert!(block.contains("Day range: 3480.00 - 3525.00"));
        assert!(block.contains("52-week range:"));
        assert!(block.contains("Sector: Information Technology"));
        assert!(block.contains("Source: twelvedata"));
    }

    #[test]
    fn test_quote_block_handles_missing_fields() {
        let mut quote = sample_quote();
        quote.market_cap = None;
        quote.pe = None;
        quote.sector = None;
        quote.industry = None;

        let block = format_quote(&quote);
        assert!(block.contains("Market Cap N/A"));
        assert!(block.contains("P/E N/A"));
        assert!(!block.contains("Sector:"));
    }

    #[test]
    fn test_movers_list() {
        let movers = vec![
            Mover {
                symbol: "ADANIENT".to_string(),
                name: "Adani Enterprises".to_string(),
                price: 2900.0,
                change: 140.0,
                change_percent: 5.07,
            },
            Mover {
                symbol: "TITAN".to_string(),
                name: "Titan Company".to_string(),
                price: 3300.0,
                change: 96.0,
                change_percent: 3.0,
            },
        ];

        let block = format_movers(MoverKind::Gainers, &movers);
        assert!(block.starts_with("Top gainers today:"));
        assert!(block.contains("1. Adani Enterprises (ADANIENT)"));
        assert!(block.contains("+5.07%"));
    }

    #[test]
    fn test_comparison_block() {
        let a = sample_quote();
        let mut b = sample_quote();
        b.symbol = "INFY".to_string();
        b.name = "Infosys".to_string();
        b.price = 1520.0;

        let block = format_comparison(&a, &b);
        assert!(block.contains("Comparison: TCS vs INFY"));
        assert!(block.contains("Price: TCS 3512.40 | INFY 1520.00"));
        assert!(block.contains("P/E:"));
    }

    #[test]
    fn test_news_digest() {
        let items = vec![NewsItem {
            title: "Quarterly results beat estimates".to_string(),
            summary: Some("Revenue grew on strong deal wins.".to_string()),
            url: None,
            source: "newswire".to_string(),
            published_at: None,
        }];

        let scoped = format_news(&items, Some("TCS"));
        assert!(scoped.starts_with("Latest news for TCS:"));
        assert!(scoped.contains("Quarterly results beat estimates"));

        let general = format_news(&items, None);
        assert!(general.starts_with("Latest market news:"));
    }
}
