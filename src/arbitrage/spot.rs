//! CEX↔CEX spot spread scanner.

use std::collections::HashMap;

use tracing::debug;

use crate::arbitrage::cost::{TradeMode, raw_spread_pct};
use crate::arbitrage::types::ScanContext;
use crate::models::{Leg, Opportunity, OpportunityKind, TickerBook, TradeDirection};

/// Scans every venue pair for symbols quoted on both sides and keeps the
/// single best effective pairing per symbol.
pub fn scan_cex_cex(tickers: &TickerBook, ctx: &ScanContext) -> Vec<Opportunity> {
    let model = ctx.cost_model();
    let venues: Vec<&String> = tickers.keys().collect();
    let mut best: HashMap<String, Opportunity> = HashMap::new();

    for (i, a) in venues.iter().enumerate() {
        for b in &venues[i + 1..] {
            let (book_a, book_b) = (&tickers[*a], &tickers[*b]);
            for (symbol, ta) in book_a {
                let Some(tb) = book_b.get(symbol) else {
                    continue;
                };
                if !ctx.liquid(ta.quote_volume) || !ctx.liquid(tb.quote_volume) {
                    continue;
                }
                let Some(raw) = raw_spread_pct(ta.last, tb.last) else {
                    continue;
                };
                // charge the dearer venue's fee on both legs
                let fee_venue = if ctx.costs.cex_fee_pct(a) >= ctx.costs.cex_fee_pct(b) {
                    a.as_str()
                } else {
                    b.as_str()
                };
                let effective = model.effective(raw, TradeMode::CexCex, fee_venue, ctx.capital_usd);
                let profit = ctx.profit_usd(effective);
                if !ctx.passes(effective, profit) {
                    continue;
                }
                if best
                    .get(symbol)
                    .is_some_and(|prev| prev.effective_spread_pct >= effective)
                {
                    continue;
                }

                let (buy, sell) = if ta.last < tb.last { (a, b) } else { (b, a) };
                best.insert(
                    symbol.clone(),
                    Opportunity {
                        kind: OpportunityKind::Spot,
                        symbol: symbol.clone(),
                        legs: vec![
                            Leg {
                                venue: a.to_string(),
                                value: ta.last,
                            },
                            Leg {
                                venue: b.to_string(),
                                value: tb.last,
                            },
                        ],
                        raw_spread_pct: raw,
                        effective_spread_pct: effective,
                        profit_usd: profit,
                        direction: TradeDirection::BuySell {
                            buy: buy.to_string(),
                            sell: sell.to_string(),
                        },
                        volume: ta.quote_volume.min(tb.quote_volume),
                        capital_usd: ctx.capital_usd,
                    },
                );
            }
        }
    }

    let mut found: Vec<Opportunity> = best.into_values().collect();
    found.sort_by(|x, y| y.effective_spread_pct.total_cmp(&x.effective_spread_pct));
    debug!(count = found.len(), "[SPOT] scan complete");
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::types::fixtures::{context, tickers};

    #[test]
    fn emits_profitable_pair_with_direction() {
        let book = tickers(&[
            ("bybit", "XYZ/USDT", 100.0, 1e6),
            ("mexc", "XYZ/USDT", 103.0, 2e6),
        ]);
        let found = scan_cex_cex(&book, &context(1000.0));
        assert_eq!(found.len(), 1);
        let opp = &found[0];
        assert_eq!(
            opp.direction,
            TradeDirection::BuySell {
                buy: "bybit".into(),
                sell: "mexc".into()
            }
        );
        // raw = 3/101.5*100, cost = 0.2 + 0.3
        let raw = 3.0 / 101.5 * 100.0;
        assert!((opp.raw_spread_pct - raw).abs() < 1e-9);
        assert!((opp.effective_spread_pct - (raw - 0.5)).abs() < 1e-9);
        assert!((opp.profit_usd - (raw - 0.5) * 10.0).abs() < 1e-9);
        assert_eq!(opp.volume, 1e6);
        assert!(opp.effective_spread_pct <= opp.raw_spread_pct);
    }

    #[test]
    fn illiquid_leg_is_never_emitted() {
        let book = tickers(&[
            ("bybit", "XYZ/USDT", 100.0, 499_999.0),
            ("mexc", "XYZ/USDT", 150.0, 1e9),
        ]);
        assert!(scan_cex_cex(&book, &context(1000.0)).is_empty());
    }

    #[test]
    fn below_threshold_or_profit_is_dropped() {
        let book = tickers(&[
            ("bybit", "XYZ/USDT", 100.0, 1e6),
            ("mexc", "XYZ/USDT", 102.0, 1e6),
        ]);
        // raw ~1.98% -> effective ~1.48% < 2%
        assert!(scan_cex_cex(&book, &context(1000.0)).is_empty());

        let book = tickers(&[
            ("bybit", "XYZ/USDT", 100.0, 1e6),
            ("mexc", "XYZ/USDT", 110.0, 1e6),
        ]);
        // effective ~9% of $5 = $0.45 < $0.5
        assert!(scan_cex_cex(&book, &context(5.0)).is_empty());
    }

    #[test]
    fn one_opportunity_per_symbol_with_best_pairing() {
        let book = tickers(&[
            ("bitget", "XYZ/USDT", 104.0, 1e6),
            ("bybit", "XYZ/USDT", 100.0, 1e6),
            ("mexc", "XYZ/USDT", 108.0, 1e6),
            ("bybit", "ABC/USDT", 10.0, 1e6),
            ("mexc", "ABC/USDT", 10.5, 1e6),
        ]);
        let found = scan_cex_cex(&book, &context(1000.0));
        let xyz: Vec<_> = found.iter().filter(|o| o.symbol == "XYZ/USDT").collect();
        assert_eq!(xyz.len(), 1);
        assert_eq!(
            xyz[0].direction,
            TradeDirection::BuySell {
                buy: "bybit".into(),
                sell: "mexc".into()
            }
        );
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn dearer_venue_fee_is_charged() {
        let mut ctx = context(1000.0);
        let mut costs = (*ctx.costs).clone();
        costs.cex_fee_overrides.insert("mexc".into(), 0.2);
        ctx.costs = std::sync::Arc::new(costs);
        let book = tickers(&[
            ("bybit", "XYZ/USDT", 100.0, 1e6),
            ("mexc", "XYZ/USDT", 103.0, 1e6),
        ]);
        let opp = &scan_cex_cex(&book, &ctx)[0];
        let raw = 3.0 / 101.5 * 100.0;
        assert!((opp.effective_spread_pct - (raw - 0.7)).abs() < 1e-9);
    }
}
