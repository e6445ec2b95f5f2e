//! Stream-name builders following the provider's naming grammar: a
//! lowercased symbol joined to a topic suffix with `@`.

/// Kline/candlestick intervals accepted by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KlineInterval {
    Seconds1,
    Minutes1,
    Minutes3,
    Minutes5,
    Minutes15,
    Minutes30,
    Hours1,
    Hours2,
    Hours4,
    Hours6,
    Hours8,
    Hours12,
    Days1,
    Days3,
    Weeks1,
    Months1,
}

impl KlineInterval {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Seconds1 => "1s",
            Self::Minutes1 => "1m",
            Self::Minutes3 => "3m",
            Self::Minutes5 => "5m",
            Self::Minutes15 => "15m",
            Self::Minutes30 => "30m",
            Self::Hours1 => "1h",
            Self::Hours2 => "2h",
            Self::Hours4 => "4h",
            Self::Hours6 => "6h",
            Self::Hours8 => "8h",
            Self::Hours12 => "12h",
            Self::Days1 => "1d",
            Self::Days3 => "3d",
            Self::Weeks1 => "1w",
            Self::Months1 => "1M",
        }
    }
}

#[must_use]
pub fn agg_trade(symbol: &str) -> String {
    format!("{}@aggTrade", symbol.to_lowercase())
}

#[must_use]
pub fn trade(symbol: &str) -> String {
    format!("{}@trade", symbol.to_lowercase())
}

#[must_use]
pub fn kline(symbol: &str, interval: KlineInterval) -> String {
    format!("{}@kline_{}", symbol.to_lowercase(), interval.as_str())
}

#[must_use]
pub fn mini_ticker(symbol: &str) -> String {
    format!("{}@miniTicker", symbol.to_lowercase())
}

#[must_use]
pub fn ticker(symbol: &str) -> String {
    format!("{}@ticker", symbol.to_lowercase())
}

#[must_use]
pub fn book_ticker(symbol: &str) -> String {
    format!("{}@bookTicker", symbol.to_lowercase())
}

/// Partial book depth with the given number of levels; `fast` selects the
/// 100ms update speed instead of the default 1000ms.
#[must_use]
pub fn partial_depth(symbol: &str, levels: u32, fast: bool) -> String {
    let base = format!("{}@depth{}", symbol.to_lowercase(), levels);
    if fast {
        format!("{}@100ms", base)
    } else {
        base
    }
}

/// Differential depth updates; `fast` selects the 100ms update speed.
#[must_use]
pub fn diff_depth(symbol: &str, fast: bool) -> String {
    let base = format!("{}@depth", symbol.to_lowercase());
    if fast {
        format!("{}@100ms", base)
    } else {
        base
    }
}

/// Join stream names for the combined endpoint's `streams=` parameter.
#[must_use]
pub fn combined(streams: &[impl AsRef<str>]) -> String {
    streams
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_are_lowercased() {
        assert_eq!(trade("BTCUSDT"), "btcusdt@trade");
        assert_eq!(agg_trade("EthUsdt"), "ethusdt@aggTrade");
        assert_eq!(ticker("BNBBTC"), "bnbbtc@ticker");
        assert_eq!(mini_ticker("BTCUSDT"), "btcusdt@miniTicker");
        assert_eq!(book_ticker("BTCUSDT"), "btcusdt@bookTicker");
    }

    #[test]
    fn kline_carries_the_interval_suffix() {
        assert_eq!(
            kline("BTCUSDT", KlineInterval::Minutes1),
            "btcusdt@kline_1m"
        );
        assert_eq!(
            kline("btcusdt", KlineInterval::Months1),
            "btcusdt@kline_1M"
        );
    }

    #[test]
    fn depth_variants() {
        assert_eq!(partial_depth("BTCUSDT", 5, false), "btcusdt@depth5");
        assert_eq!(partial_depth("BTCUSDT", 20, true), "btcusdt@depth20@100ms");
        assert_eq!(diff_depth("BTCUSDT", false), "btcusdt@depth");
        assert_eq!(diff_depth("BTCUSDT", true), "btcusdt@depth@100ms");
    }

    #[test]
    fn combined_joins_with_slashes() {
        let streams = [trade("BTCUSDT"), trade("ETHUSDT")];
        assert_eq!(combined(&streams), "btcusdt@trade/ethusdt@trade");
    }
}
