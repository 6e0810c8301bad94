use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Address, Label, Parcel, Rate, VoidOutcome};

#[derive(Debug, Error)]
pub enum RateSourceError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("http request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("api error: {0}")]
    Api(String),
    #[error("API key not set (expected in ${0})")]
    MissingApiKey(String),
}

/// Carrier rating and label purchase. One `get_rates` call rates one box
/// from one origin across the given carrier accounts.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn get_rates(
        &self,
        from: &Address,
        to: &Address,
        parcel: &Parcel,
        carrier_accounts: &[String],
    ) -> Result<Vec<Rate>, RateSourceError>;

    async fn buy_shipment(&self, shipment_id: &str, rate_id: &str)
        -> Result<Label, RateSourceError>;

    async fn void_label(&self, shipment_id: &str) -> Result<VoidOutcome, RateSourceError>;
}
