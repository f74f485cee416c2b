//! Shared data structures used throughout the application.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

const BSC_MARKERS: [&str; 2] = ["BNB", "BUSD"];

/// EVM chains the DEX scanner can price against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Chain {
    Eth,
    Bsc,
}

impl Chain {
    pub const ALL: [Chain; 2] = [Chain::Eth, Chain::Bsc];

    /// Picks the target chain from a `BASE/QUOTE` symbol: anything naming a
    /// BSC-native asset goes to BSC, everything else to Ethereum.
    pub fn for_symbol(symbol: &str) -> Chain {
        let upper = symbol.to_uppercase();
        if BSC_MARKERS.iter().any(|a| upper.contains(a)) {
            Chain::Bsc
        } else {
            Chain::Eth
        }
    }

    /// CoinGecko platform key for token contract lookups.
    pub fn platform_id(&self) -> &'static str {
        match self {
            Chain::Eth => "ethereum",
            Chain::Bsc => "binance-smart-chain",
        }
    }

    /// CoinGecko id of the native gas asset.
    pub fn native_coin_id(&self) -> &'static str {
        match self {
            Chain::Eth => "ethereum",
            Chain::Bsc => "binancecoin",
        }
    }

    pub fn native_symbol(&self) -> &'static str {
        match self {
            Chain::Eth => "ETH",
            Chain::Bsc => "BNB",
        }
    }

    /// Wrapped ERC-20 form of the native asset, as quoted by the router.
    pub fn wrapped_native(&self) -> &'static str {
        match self {
            Chain::Eth => "WETH",
            Chain::Bsc => "WBNB",
        }
    }

    pub fn dex_label(&self) -> &'static str {
        match self {
            Chain::Eth => "Uniswap",
            Chain::Bsc => "PancakeSwap",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Chain::Eth => "ETH",
            Chain::Bsc => "BSC",
        })
    }
}

/// One venue's ticker for a symbol, captured in a single aggregator pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerSnapshot {
    pub venue: String,
    pub symbol: String,
    pub last: f64,
    /// 24h volume in the settlement asset.
    pub quote_volume: f64,
}

/// One venue's funding rate for a perpetual contract.
#[derive(Debug, Clone, PartialEq)]
pub struct FundingSnapshot {
    pub venue: String,
    /// Contract symbol, e.g. `BTC/USDT:USDT`.
    pub symbol: String,
    /// Signed fraction per funding period (0.0001 = 0.01%).
    pub funding_rate: f64,
    /// 24h contract turnover in the settlement asset, when the venue reports it.
    pub quote_volume: Option<f64>,
}

impl FundingSnapshot {
    /// Spot pair underlying the contract (`BTC/USDT:USDT` -> `BTC/USDT`).
    pub fn spot_symbol(&self) -> &str {
        self.symbol
            .split_once(':')
            .map_or(self.symbol.as_str(), |(pair, _)| pair)
    }
}

/// venue -> symbol -> ticker
pub type TickerBook = BTreeMap<String, HashMap<String, TickerSnapshot>>;
/// venue -> contract -> funding rate
pub type FundingBook = BTreeMap<String, HashMap<String, FundingSnapshot>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpportunityKind {
    Spot,
    Funding,
    Dex,
}

impl OpportunityKind {
    pub fn fingerprint_prefix(&self) -> &'static str {
        match self {
            OpportunityKind::Spot => "spot",
            OpportunityKind::Funding => "fund",
            OpportunityKind::Dex => "dex",
        }
    }
}

/// Suggested side on a perpetual venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// A negative rate pays longs, anything else pays shorts.
    pub fn for_rate(rate: f64) -> Self {
        if rate < 0.0 {
            PositionSide::Long
        } else {
            PositionSide::Short
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PositionSide::Long => "Long",
            PositionSide::Short => "Short",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TradeDirection {
    /// Buy on the cheaper venue, sell on the other.
    BuySell { buy: String, sell: String },
    /// Per-venue perpetual side, derived from each venue's own rate.
    Funding(Vec<(String, PositionSide)>),
}

impl fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeDirection::BuySell { buy, sell } => write!(f, "Buy → {buy}, Sell → {sell}"),
            TradeDirection::Funding(legs) => {
                let parts: Vec<String> = legs
                    .iter()
                    .map(|(venue, side)| format!("{side} → {venue}"))
                    .collect();
                f.write_str(&parts.join(", "))
            }
        }
    }
}

/// Price (or funding rate) observed on one side of an opportunity.
#[derive(Debug, Clone, PartialEq)]
pub struct Leg {
    pub venue: String,
    pub value: f64,
}

/// Candidate opportunity produced by a scanner pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Opportunity {
    pub kind: OpportunityKind,
    pub symbol: String,
    pub legs: Vec<Leg>,
    pub raw_spread_pct: f64,
    pub effective_spread_pct: f64,
    pub profit_usd: f64,
    pub direction: TradeDirection,
    /// Smallest 24h volume observed across the legs.
    pub volume: f64,
    /// Capital the profit estimate was computed for.
    pub capital_usd: f64,
}

impl Opportunity {
    /// Dedup key: kind + symbol + participating venues.
    pub fn fingerprint(&self) -> String {
        let venues: Vec<&str> = self.legs.iter().map(|l| l.venue.as_str()).collect();
        format!(
            "{}_{}_{}",
            self.kind.fingerprint_prefix(),
            self.symbol,
            venues.join("_")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bsc_assets_select_bsc_everything_else_eth() {
        assert_eq!(Chain::for_symbol("BNB/USDT"), Chain::Bsc);
        assert_eq!(Chain::for_symbol("CAKE/BUSD"), Chain::Bsc);
        assert_eq!(Chain::for_symbol("PEPE/USDT"), Chain::Eth);
        assert_eq!(Chain::for_symbol("ETH/USDT"), Chain::Eth);
    }

    #[test]
    fn funding_side_follows_own_rate_sign() {
        assert_eq!(PositionSide::for_rate(-0.0004), PositionSide::Long);
        assert_eq!(PositionSide::for_rate(0.0004), PositionSide::Short);
    }

    #[test]
    fn fingerprint_names_kind_symbol_and_venues() {
        let opp = Opportunity {
            kind: OpportunityKind::Spot,
            symbol: "BTC/USDT".into(),
            legs: vec![
                Leg {
                    venue: "bybit".into(),
                    value: 1.0,
                },
                Leg {
                    venue: "mexc".into(),
                    value: 2.0,
                },
            ],
            raw_spread_pct: 0.0,
            effective_spread_pct: 0.0,
            profit_usd: 0.0,
            direction: TradeDirection::BuySell {
                buy: "bybit".into(),
                sell: "mexc".into(),
            },
            volume: 0.0,
            capital_usd: 0.0,
        };
        assert_eq!(opp.fingerprint(), "spot_BTC/USDT_bybit_mexc");
    }

    #[test]
    fn funding_contract_maps_to_spot_pair() {
        let f = FundingSnapshot {
            venue: "bybit".into(),
            symbol: "BTC/USDT:USDT".into(),
            funding_rate: 0.0,
            quote_volume: None,
        };
        assert_eq!(f.spot_symbol(), "BTC/USDT");
    }
}
