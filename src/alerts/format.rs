//! Operator-facing alert text (Telegram HTML).

use std::fmt::Write;

use crate::models::{Opportunity, OpportunityKind};

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn header(opp: &Opportunity) -> String {
    match opp.kind {
        OpportunityKind::Spot => "🟢 <b>SPOT ARB</b>".to_string(),
        OpportunityKind::Funding => "🟣 <b>FUNDING ARB</b>".to_string(),
        OpportunityKind::Dex => {
            let venue = opp.legs.first().map_or("CEX".to_string(), |l| l.venue.to_uppercase());
            format!("🔵 <b>{}↔DEX</b>", escape(&venue))
        }
    }
}

/// Renders an opportunity. Spreads are shown to two decimals, prices to six,
/// funding rates to four (in percent), volume in thousands of `settlement`.
pub fn format_alert(opp: &Opportunity, settlement: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", header(opp));
    let _ = writeln!(out, "<code>{}</code>", escape(&opp.symbol));
    let _ = writeln!(
        out,
        "raw: <b>{:.2}%</b>  eff: <b>{:.2}%</b>",
        opp.raw_spread_pct, opp.effective_spread_pct
    );
    for leg in &opp.legs {
        match opp.kind {
            OpportunityKind::Funding => {
                let _ = writeln!(out, "{}: {:.4}%", escape(&leg.venue), leg.value);
            }
            OpportunityKind::Spot | OpportunityKind::Dex => {
                let _ = writeln!(out, "{}: <code>{:.6}</code>", escape(&leg.venue), leg.value);
            }
        }
    }
    if opp.kind == OpportunityKind::Funding {
        let _ = writeln!(out, "Δ funding: <b>{:.3}%</b>", opp.raw_spread_pct);
    }
    let _ = writeln!(
        out,
        "Volume(min): <b>{:.1}k</b> {}",
        opp.volume / 1000.0,
        escape(settlement)
    );
    let _ = writeln!(out, "Direction: {}", escape(&opp.direction.to_string()));
    let _ = write!(
        out,
        "Est. profit (on {}$): <b>${:.2}</b>",
        opp.capital_usd, opp.profit_usd
    );
    out
}

/// Sent once when the monitor comes up.
pub fn startup_notice(venues: &[String]) -> String {
    format!(
        "✅ Monitor started: SPOT / FUNDING / CEX↔DEX signals.\nVenues: {}",
        venues.join(", ")
    )
}

pub fn morning_reminder() -> String {
    "☀️ <b>Good morning!</b>\nPlease send your current capital with /capital &lt;amount&gt; (USD).".to_string()
}
