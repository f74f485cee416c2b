//! CEX↔DEX spread scanner.

use std::collections::HashMap;

use futures::stream::{self, StreamExt};
use tracing::debug;

use crate::arbitrage::cost::{TradeMode, raw_spread_pct};
use crate::arbitrage::types::ScanContext;
use crate::dex::quote::{DexPriceSource, DexQuote};
use crate::models::{Leg, Opportunity, OpportunityKind, TickerBook, TradeDirection};

/// Symbols whose best venue volume clears the liquidity floor, highest first,
/// capped at `limit`.
pub fn rank_candidates(tickers: &TickerBook, ctx: &ScanContext, limit: usize) -> Vec<String> {
    let mut max_volume: HashMap<&str, f64> = HashMap::new();
    for book in tickers.values() {
        for t in book.values() {
            let v = max_volume.entry(t.symbol.as_str()).or_insert(0.0);
            if t.quote_volume > *v {
                *v = t.quote_volume;
            }
        }
    }
    let mut ranked: Vec<(&str, f64)> = max_volume
        .into_iter()
        .filter(|(_, v)| ctx.liquid(*v))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(limit)
        .map(|(s, _)| s.to_string())
        .collect()
}

/// Compares each candidate's venue prices against one on-chain quote per
/// symbol. Quote failures skip the symbol for this pass.
pub async fn scan_cex_dex(
    tickers: &TickerBook,
    dex: &dyn DexPriceSource,
    ctx: &ScanContext,
) -> Vec<Opportunity> {
    let candidates = rank_candidates(tickers, ctx, ctx.settings.dex_candidate_limit);
    let concurrency = ctx.settings.dex_concurrency.max(1);

    let quotes: Vec<(String, DexQuote)> = stream::iter(candidates)
        .map(|symbol| async move {
            match dex.quote(&symbol).await {
                Ok(q) => Some((symbol, q)),
                Err(e) => {
                    debug!(symbol = %symbol, error = %e, "[DEX] quote skipped");
                    None
                }
            }
        })
        .buffer_unordered(concurrency)
        .filter_map(|q| async move { q })
        .collect()
        .await;

    let model = ctx.cost_model();
    let mut found = Vec::new();
    for (symbol, quote) in quotes {
        if !quote.price.is_finite() || quote.price <= 0.0 {
            continue;
        }
        let dex_venue = quote.chain.dex_label();
        for (venue, book) in tickers {
            let Some(t) = book.get(&symbol) else {
                continue;
            };
            if !ctx.liquid(t.quote_volume) {
                continue;
            }
            let Some(raw) = raw_spread_pct(t.last, quote.price) else {
                continue;
            };
            let effective = model.effective(raw, TradeMode::CexDex(quote.chain), venue, ctx.capital_usd);
            let profit = ctx.profit_usd(effective);
            if !ctx.passes(effective, profit) {
                continue;
            }

            let (buy, sell) = if t.last < quote.price {
                (venue.as_str(), dex_venue)
            } else {
                (dex_venue, venue.as_str())
            };
            found.push(Opportunity {
                kind: OpportunityKind::Dex,
                symbol: symbol.clone(),
                legs: vec![
                    Leg {
                        venue: venue.clone(),
                        value: t.last,
                    },
                    Leg {
                        venue: dex_venue.to_string(),
                        value: quote.price,
                    },
                ],
                raw_spread_pct: raw,
                effective_spread_pct: effective,
                profit_usd: profit,
                direction: TradeDirection::BuySell {
                    buy: buy.to_string(),
                    sell: sell.to_string(),
                },
                volume: t.quote_volume,
                capital_usd: ctx.capital_usd,
            });
        }
    }

    found.sort_by(|x, y| y.effective_spread_pct.total_cmp(&x.effective_spread_pct));
    debug!(count = found.len(), "[DEX] scan complete");
    found
}
