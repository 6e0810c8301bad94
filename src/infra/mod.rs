//! Outside-world adapters: carrier rating and label purchase.

pub mod carrier_api;
pub mod rate_source;

pub use carrier_api::CarrierApiClient;
pub use rate_source::{RateSource, RateSourceError};
