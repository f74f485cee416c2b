pub mod cost;
pub mod dex;
pub mod funding;
pub mod spot;
pub mod types;

pub use cost::{CostModel, CostParameters, TradeMode, raw_spread_pct, swap_gas_cost_usd};
pub use dex::scan_cex_dex;
pub use funding::scan_funding;
pub use spot::scan_cex_cex;
pub use types::{ScanContext, ScanSettings};
