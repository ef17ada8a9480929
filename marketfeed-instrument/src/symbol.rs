//! Pure, venue-agnostic helpers for normalizing a venue's on-the-wire symbol
//! rendering into the canonical `BASE/QUOTE` textual form.
//!
//! These functions deliberately own no policy beyond what is enumerated
//! here: they are consumed by venue adapters inside `marketfeed-data` but do
//! not participate in the stream-client state machine or the order-book
//! engine.

/// Quote currencies recognised when normalizing a joined (no-separator or
/// dash-separated) symbol. Ordered longest-first so that, eg/, `BUSD` is
/// preferred over the `USD` suffix it contains.
const RECOGNIZED_QUOTES: &[&str] = &["USDT", "BUSD", "USDC", "EUR", "GBP", "KRW", "USD", "BTC", "ETH", "MX"];

fn recognized_quotes_longest_first() -> impl Iterator<Item = &'static str> {
    let mut quotes = RECOGNIZED_QUOTES.to_vec();
    quotes.sort_unstable_by_key(|q| std::cmp::Reverse(q.len()));
    quotes.into_iter()
}

/// Normalize an arbitrary venue symbol rendering to canonical `BASE/QUOTE`
/// uppercase form.
///
/// Handles `btc/usdt`, `BTC-USDT`, `BTCUSDT` and Upbit-style `KRW-BTC`
/// (quote-first dash form). An unrecognized quote in a joined form is
/// returned uppercased but otherwise unmodified. Null, empty or
/// whitespace-only input is returned unchanged.
pub fn normalize(input: &str) -> String {
    if input.trim().is_empty() {
        return input.to_string();
    }

    if let Some((base, quote)) = input.split_once('/') {
        return format!("{}/{}", base.to_ascii_uppercase(), quote.to_ascii_uppercase());
    }

    if let Some((left, right)) = input.split_once('-') {
        let left_u = left.to_ascii_uppercase();
        let right_u = right.to_ascii_uppercase();

        if RECOGNIZED_QUOTES.contains(&right_u.as_str()) {
            return format!("{left_u}/{right_u}");
        }
        if RECOGNIZED_QUOTES.contains(&left_u.as_str()) {
            // Upbit convention: QUOTE-BASE, eg/ "KRW-BTC".
            return format!("{right_u}/{left_u}");
        }
        return input.to_ascii_uppercase();
    }

    let upper = input.to_ascii_uppercase();
    for quote in recognized_quotes_longest_first() {
        if let Some(base) = upper.strip_suffix(quote) {
            if !base.is_empty() {
                return format!("{base}/{quote}");
            }
        }
    }

    upper
}

/// Render a [`crate::market::Market`] in `BASEQUOTE` concatenated form (eg/
/// MEXC, Bitstamp-without-separator venues).
pub fn to_concat_upper(base: &str, quote: &str) -> String {
    format!("{}{}", base.to_ascii_uppercase(), quote.to_ascii_uppercase())
}

/// Render in `basequote` lowercase concatenated form (eg/ Bitstamp).
pub fn to_concat_lower(base: &str, quote: &str) -> String {
    format!("{}{}", base.to_ascii_lowercase(), quote.to_ascii_lowercase())
}

/// Render in Bitfinex's `tBASEQUOTE` form.
pub fn to_bitfinex(base: &str, quote: &str) -> String {
    format!("t{}{}", base.to_ascii_uppercase(), quote.to_ascii_uppercase())
}

/// Render in Upbit's `QUOTE-BASE` dash form.
pub fn to_upbit(base: &str, quote: &str) -> String {
    format!("{}-{}", quote.to_ascii_uppercase(), base.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_slash_lowercase() {
        assert_eq!(normalize("btc/usdt"), "BTC/USDT");
    }

    #[test]
    fn test_normalize_dash() {
        assert_eq!(normalize("BTC-USDT"), "BTC/USDT");
    }

    #[test]
    fn test_normalize_concatenated() {
        assert_eq!(normalize("BTCUSDT"), "BTC/USDT");
    }

    #[test]
    fn test_normalize_upbit_dash_quote_first() {
        assert_eq!(normalize("KRW-BTC"), "BTC/KRW");
    }

    #[test]
    fn test_normalize_unrecognized_quote_returned_uppercase() {
        assert_eq!(normalize("BTCXYZ"), "BTCXYZ");
    }

    #[test]
    fn test_normalize_empty_unchanged() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "   ");
    }

    #[test]
    fn test_normalize_prefers_longest_quote_match() {
        assert_eq!(normalize("BTCBUSD"), "BTC/BUSD");
    }

    #[test]
    fn test_roundtrip_bitfinex() {
        let market = crate::market::Market::new("BTC", "USD");
        let wire = to_bitfinex(market.base(), market.quote());
        assert_eq!(wire, "tBTCUSD");
        assert_eq!(normalize(wire.trim_start_matches('t')), "BTC/USD");
    }

    #[test]
    fn test_roundtrip_upbit() {
        let market = crate::market::Market::new("BTC", "KRW");
        let wire = to_upbit(market.base(), market.quote());
        assert_eq!(wire, "KRW-BTC");
        assert_eq!(normalize(&wire), "BTC/KRW");
    }
}
