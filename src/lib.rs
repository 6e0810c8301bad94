pub mod config;
pub mod domain;
pub mod infra;
pub mod service;

pub use config::{ConfigError, ShippingConfig};
pub use domain::{
    aggregate_rates, Address, ItemCounts, Packer, PackingFailure, PackingSolution,
    ShippingOption, SizeCategory, SortPreference, WeightOverrides,
};
pub use infra::{CarrierApiClient, RateSource, RateSourceError};
pub use service::{LabelPurchaseError, QuoteService, QuoteServiceError, ShippingQuoteResponse};

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_TAG: Option<&str> = option_env!("GIT_TAG");
