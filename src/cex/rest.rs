use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::errors::{AppError, Result};

/// GETs `url` and decodes the JSON body, mapping transport errors and non-2xx
/// statuses to [`AppError::VenueUnavailable`].
pub async fn get_json<T: DeserializeOwned>(http: &Client, venue: &str, url: &str) -> Result<T> {
    let resp = http
        .get(url)
        .send()
        .await
        .map_err(|e| AppError::venue(venue, e))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(AppError::venue(venue, format!("HTTP {status} from {url}")));
    }
    resp.json::<T>()
        .await
        .map_err(|e| AppError::venue(venue, format!("decode: {e}")))
}
