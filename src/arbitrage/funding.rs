//! Cross-venue funding-rate scanner.

use tracing::debug;

use crate::arbitrage::types::ScanContext;
use crate::models::{
    FundingBook, FundingSnapshot, Leg, Opportunity, OpportunityKind, PositionSide, TickerBook,
    TradeDirection,
};

/// Contract turnover when reported, else the venue's spot volume for the pair.
fn leg_volume(f: &FundingSnapshot, tickers: &TickerBook) -> Option<f64> {
    f.quote_volume.or_else(|| {
        tickers
            .get(&f.venue)?
            .get(f.spot_symbol())
            .map(|t| t.quote_volume)
    })
}

/// Compares funding rates of every contract listed on two venues. Leg values
/// are rates in percent.
pub fn scan_funding(funding: &FundingBook, tickers: &TickerBook, ctx: &ScanContext) -> Vec<Opportunity> {
    let venues: Vec<&String> = funding.keys().collect();
    let mut found = Vec::new();

    for (i, a) in venues.iter().enumerate() {
        for b in &venues[i + 1..] {
            let (book_a, book_b) = (&funding[*a], &funding[*b]);
            for (contract, fa) in book_a {
                let Some(fb) = book_b.get(contract) else {
                    continue;
                };
                let (ra, rb) = (fa.funding_rate * 100.0, fb.funding_rate * 100.0);
                let delta = (ra - rb).abs();
                if !delta.is_finite() || delta < ctx.settings.min_funding_delta_pct {
                    continue;
                }
                let (Some(va), Some(vb)) = (leg_volume(fa, tickers), leg_volume(fb, tickers)) else {
                    continue;
                };
                if !ctx.liquid(va) || !ctx.liquid(vb) {
                    continue;
                }
                let profit = ctx.profit_usd(delta);
                if profit < ctx.settings.min_profit_usd {
                    continue;
                }

                found.push(Opportunity {
                    kind: OpportunityKind::Funding,
                    symbol: contract.clone(),
                    legs: vec![
                        Leg {
                            venue: a.to_string(),
                            value: ra,
                        },
                        Leg {
                            venue: b.to_string(),
                            value: rb,
                        },
                    ],
                    raw_spread_pct: delta,
                    effective_spread_pct: delta,
                    profit_usd: profit,
                    direction: TradeDirection::Funding(vec![
                        (a.to_string(), PositionSide::for_rate(fa.funding_rate)),
                        (b.to_string(), PositionSide::for_rate(fb.funding_rate)),
                    ]),
                    volume: va.min(vb),
                    capital_usd: ctx.capital_usd,
                });
            }
        }
    }

    debug!(count = found.len(), "[FUNDING] scan complete");
    found
}
