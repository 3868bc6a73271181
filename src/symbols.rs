//! Symbol resolution
//!
//! Maps free text to a candidate ticker symbol using, in order: the capture
//! group of the matched command rule, an uppercase-token scan of the raw
//! text, and a static company-name alias table.

const MIN_SYMBOL_LEN: usize = 2;
const MAX_SYMBOL_LEN: usize = 15;

/// Filler words that commonly ride along inside a rule capture ("TCS STOCK")
const NOISE_WORDS: &[&str] = &["STOCK", "PRICE", "DATA", "ABOUT"];

/// Uppercase tokens that are never tickers
const STOP_WORDS: &[&str] = &[
    "STOCK", "SHARE", "COMPANY", "DATA", "PRICE", "INFO", "ABOUT", "TELL", "SHOW", "GIVE",
    "WHAT", "THE", "IS", "ARE", "AND", "OR", "BUT", "FOR", "WITH", "TO", "FROM", "BY", "AT",
    "IN", "ON", "OF",
];

/// Static company-name to symbol aliases, matched as case-insensitive
/// substrings. First hit wins, so longer or more specific keys come first.
const COMPANY_ALIASES: &[(&str, &str)] = &[
    ("reliance industries", "RELIANCE"),
    ("reliance", "RELIANCE"),
    ("tata consultancy", "TCS"),
    ("tata motors", "TATAMOTORS"),
    ("tata steel", "TATASTEEL"),
    ("infosys", "INFY"),
    ("hdfc bank", "HDFCBANK"),
    ("icici bank", "ICICIBANK"),
    ("state bank", "SBIN"),
    ("bharti airtel", "BHARTIARTL"),
    ("airtel", "BHARTIARTL"),
    ("wipro", "WIPRO"),
    ("bajaj finance", "BAJFINANCE"),
    ("kotak mahindra", "KOTAKBANK"),
    ("larsen", "LT"),
    ("maruti", "MARUTI"),
    ("asian paints", "ASIANPAINT"),
    ("sun pharma", "SUNPHARMA"),
    ("hcl tech", "HCLTECH"),
    ("tech mahindra", "TECHM"),
    ("adani enterprises", "ADANIENT"),
    ("axis bank", "AXISBANK"),
    ("titan", "TITAN"),
    ("apple", "AAPL"),
    ("microsoft", "MSFT"),
    ("alphabet", "GOOGL"),
    ("google", "GOOGL"),
    ("amazon", "AMZN"),
    ("tesla", "TSLA"),
    ("netflix", "NFLX"),
    ("nvidia", "NVDA"),
    ("meta platforms", "META"),
];

/// Tickers listed on Indian exchanges, used both as a provider-ordering
/// heuristic and for best-effort extraction from lowercase voice transcripts.
pub const INDIAN_TICKERS: &[&str] = &[
    "RELIANCE", "TCS", "INFY", "HDFCBANK", "ICICIBANK", "SBIN", "BHARTIARTL", "WIPRO",
    "ITC", "LT", "KOTAKBANK", "AXISBANK", "MARUTI", "ASIANPAINT", "TITAN", "BAJFINANCE",
    "HCLTECH", "TECHM", "SUNPHARMA", "TATAMOTORS", "TATASTEEL", "ADANIENT", "NTPC",
    "POWERGRID", "ULTRACEMCO", "ONGC", "COALINDIA", "JSWSTEEL", "HINDUNILVR", "NESTLEIND",
];

/// 2 to 15 uppercase ASCII letters
fn plausible_symbol(token: &str) -> bool {
    (MIN_SYMBOL_LEN..=MAX_SYMBOL_LEN).contains(&token.len())
        && token.chars().all(|c| c.is_ascii_uppercase())
}

fn trim_token(token: &str) -> &str {
    token.trim_matches(|c: char| !c.is_ascii_alphabetic())
}

/// Resolve free text to a candidate symbol. Deterministic, no side effects.
///
/// Order: uppercase-token scan (skipping stop words), then alias lookup.
pub fn resolve(text: &str) -> Option<String> {
    // Scan tokens that are already uppercase in the raw text
    for raw in text.split_whitespace() {
        let token = trim_token(raw);
        if plausible_symbol(token) && !STOP_WORDS.contains(&token) {
            return Some(token.to_string());
        }
    }

    // Fall back to the alias table on the lowercased text
    let lowered = text.to_lowercase();
    for (alias, symbol) in COMPANY_ALIASES {
        if lowered.contains(alias) {
            return Some((*symbol).to_string());
        }
    }

    None
}

/// Resolve with a rule capture group taking precedence over the raw text.
///
/// The capture is uppercased and stripped of noise words before the
/// plausibility check, so "tcs stock" and "TCS STOCK" both yield TCS.
pub fn resolve_with_capture(capture: Option<&str>, text: &str) -> Option<String> {
    if let Some(captured) = capture {
        let upper = captured.to_uppercase();
        for raw in upper.split_whitespace() {
            let token = trim_token(raw);
            if plausible_symbol(token) && !NOISE_WORDS.contains(&token) && !STOP_WORDS.contains(&token) {
                return Some(token.to_string());
            }
        }
        // The capture may be a company name rather than a ticker
        let lowered = captured.to_lowercase();
        for (alias, symbol) in COMPANY_ALIASES {
            if lowered.contains(alias) {
                return Some((*symbol).to_string());
            }
        }
    }

    resolve(text)
}

/// Best-effort extraction for spoken transcripts, which arrive lowercased.
/// Tokens are uppercased and checked against the known-ticker universe.
pub fn resolve_spoken(text: &str) -> Option<String> {
    if let Some(symbol) = resolve(text) {
        return Some(symbol);
    }

    for raw in text.split_whitespace() {
        let token = trim_token(raw).to_uppercase();
        if is_known_symbol(&token) {
            return Some(token);
        }
    }

    None
}

/// Every plausible symbol mentioned in the text, in order of appearance.
/// Used by the comparison paths, which need two subjects.
pub fn extract_symbols(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();

    for raw in text.split_whitespace() {
        let token = trim_token(raw);
        let candidate = if plausible_symbol(token) && !STOP_WORDS.contains(&token) {
            Some(token.to_string())
        } else {
            let upper = token.to_uppercase();
            if is_known_symbol(&upper) {
                Some(upper)
            } else {
                None
            }
        };

        if let Some(symbol) = candidate {
            if !found.contains(&symbol) {
                found.push(symbol);
            }
        }
    }

    found
}

fn is_known_symbol(token: &str) -> bool {
    INDIAN_TICKERS.contains(&token) || COMPANY_ALIASES.iter().any(|(_, s)| *s == token)
}

/// Membership in the Indian-ticker allow-list, after suffix stripping.
/// A cheap pre-filter for provider ordering, not a correctness guarantee.
pub fn is_indian_ticker(symbol: &str) -> bool {
    INDIAN_TICKERS.contains(&strip_exchange_suffix(symbol).as_str())
}

/// Remove a trailing `.NS` / `.BO` / `.NSE` exchange suffix, if present.
pub fn strip_exchange_suffix(symbol: &str) -> String {
    let upper = symbol.to_uppercase();
    for suffix in [".NSE", ".NS", ".BO"] {
        if let Some(stripped) = upper.strip_suffix(suffix) {
            return stripped.to_string();
        }
    }
    upper
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uppercase_token_scan() {
        assert_eq!(resolve("What is TCS stock price"), Some("TCS".to_string()));
        assert_eq!(resolve("show me INFY data"), Some("INFY".to_string()));
    }

    #[test]
    fn test_alias_lookup() {
        assert_eq!(resolve("tell me about reliance"), Some("RELIANCE".to_string()));
        assert_eq!(
            resolve("how is tata consultancy doing"),
            Some("TCS".to_string())
        );
    }

    #[test]
    fn test_no_match() {
        assert_eq!(resolve("asdkjasd"), None);
        assert_eq!(resolve("hello there"), None);
    }

    #[test]
    fn test_stop_words_skipped() {
        // STOCK and PRICE are uppercase and plausible, but stop-worded
        assert_eq!(resolve("STOCK PRICE OF WIPRO"), Some("WIPRO".to_string()));
    }

    #[test]
    fn test_capture_precedence() {
        assert_eq!(
            resolve_with_capture(Some("tcs stock"), "irrelevant"),
            Some("TCS".to_string())
        );
        assert_eq!(
            resolve_with_capture(Some("reliance"), "irrelevant"),
            Some("RELIANCE".to_string())
        );
        // Unusable capture falls back to the raw text
        assert_eq!(
            resolve_with_capture(Some("stock price"), "tell me about infosys"),
            Some("INFY".to_string())
        );
    }

    #[test]
    fn test_spoken_lowercase_ticker() {
        assert_eq!(resolve_spoken("buy tcs"), Some("TCS".to_string()));
        assert_eq!(resolve_spoken("sell reliance now"), Some("RELIANCE".to_string()));
    }

    #[test]
    fn test_extract_symbols_pair() {
        assert_eq!(
            extract_symbols("compare TCS and INFY"),
            vec!["TCS".to_string(), "INFY".to_string()]
        );
    }

    #[test]
    fn test_suffix_stripping_and_allow_list() {
        assert_eq!(strip_exchange_suffix("RELIANCE.NS"), "RELIANCE");
        assert_eq!(strip_exchange_suffix("tcs.bo"), "TCS");
        assert_eq!(strip_exchange_suffix("INFY.NSE"), "INFY");
        assert!(is_indian_ticker("TCS.NS"));
        assert!(!is_indian_ticker("AAPL"));
    }
}
