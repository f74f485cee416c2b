use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider error: {0}")]
    Provider(#[from] ethers::providers::ProviderError),

    #[error("Contract error: {0}")]
    Contract(
        #[from]
        ethers::contract::ContractError<ethers::providers::Provider<ethers::providers::Http>>,
    ),

    #[error("Serialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// A venue's data call failed; the venue contributes nothing this tick.
    #[error("Venue {venue} unavailable: {reason}")]
    VenueUnavailable { venue: String, reason: String },

    /// A funding feed returned too few entries to be trusted.
    #[error("Venue {venue} returned {entries} funding rates (minimum {minimum})")]
    DataQualityLow {
        venue: String,
        entries: usize,
        minimum: usize,
    },

    /// Token address or decimals could not be determined. Cached for the process lifetime.
    #[error("Token {symbol} cannot be resolved on {chain}")]
    ResolutionFailure { symbol: String, chain: String },

    /// Router simulation failed or timed out. Never cached.
    #[error("On-chain call failed for {symbol}: {reason}")]
    OnChainCall { symbol: String, reason: String },

    #[error("Notification failed: {0}")]
    Notify(String),

    #[error("Timed out after {0:?}: {1}")]
    Timeout(std::time::Duration, String),

    #[error("Other: {0}")]
    Other(String),
}

impl AppError {
    pub fn venue(venue: &str, reason: impl ToString) -> Self {
        Self::VenueUnavailable {
            venue: venue.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Runs `fut` under `limit`, mapping an elapsed deadline to [`AppError::Timeout`].
pub async fn with_timeout<T, F>(limit: std::time::Duration, what: &str, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(AppError::Timeout(limit, what.to_string())),
    }
}
