//! Thin asynchronous client for an EasyPost-style shipping API.
//!
//! - Rates one parcel per request against an explicit list of carrier accounts.
//! - Buys and voids labels by shipment id.
//! - Keeps a short-lived in-memory rate cache; only fresh entries are reused
//!   since rate ids expire on the carrier side.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ApiConfig;
use crate::domain::{Address, Label, Parcel, Rate, VoidOutcome};
use crate::infra::rate_source::{RateSource, RateSourceError};

pub const DEFAULT_BASE_URL: &str = "https://api.easypost.com/v2/";
const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);
const USER_AGENT: &str = concat!("parcel-quote/", env!("CARGO_PKG_VERSION"));

#[derive(Default)]
struct RateCache {
    rates: HashMap<String, Cached<Vec<Rate>>>,
}

#[derive(Clone)]
pub struct CarrierApiClient {
    http: Client,
    base_url: Url,
    api_key: String,
    cache: Arc<Mutex<RateCache>>,
    ttl: Duration,
}

impl CarrierApiClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, RateSourceError> {
        Self::with_base_url(DEFAULT_BASE_URL, api_key)
    }

    pub fn with_base_url(base: &str, api_key: impl Into<String>) -> Result<Self, RateSourceError> {
        let base_url = Url::parse(base)?;
        let http = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            base_url,
            api_key: api_key.into(),
            cache: Arc::new(Mutex::new(RateCache::default())),
            ttl: DEFAULT_TTL,
        })
    }

    /// Build from configuration, reading the key from the configured
    /// environment variable.
    pub fn from_config(api: &ApiConfig) -> Result<Self, RateSourceError> {
        let api_key = std::env::var(&api.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| RateSourceError::MissingApiKey(api.api_key_env.clone()))?;
        Ok(Self::with_base_url(&api.base_url, api_key)?
            .with_ttl(Duration::from_secs(api.rate_cache_ttl_secs)))
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub async fn clear_cache(&self) {
        self.cache.lock().await.rates.clear();
    }

    async fn cached_rates(&self, key: &str) -> Option<Vec<Rate>> {
        let cache = self.cache.lock().await;
        let result = cache.rates.get(key).and_then(|entry| entry.if_fresh(self.ttl));
        if result.is_some() {
            debug!(key, "serving cached rates");
        }
        result
    }

    async fn store_rates(&self, key: String, rates: Vec<Rate>) {
        let mut cache = self.cache.lock().await;
        cache.rates.insert(key, Cached::new(rates, SystemTime::now()));
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, RateSourceError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path)?;
        let response = self
            .http
            .post(url)
            .basic_auth(&self.api_key, Some(""))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorEnvelope>(&text)
                .ok()
                .and_then(|envelope| envelope.error)
                .and_then(|error| error.message)
                .unwrap_or_else(|| format!("{status}: {text}"));
            return Err(RateSourceError::Api(message));
        }

        Ok(response.json().await?)
    }

    fn url(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path)
    }
}

#[async_trait]
impl RateSource for CarrierApiClient {
    async fn get_rates(
        &self,
        from: &Address,
        to: &Address,
        parcel: &Parcel,
        carrier_accounts: &[String],
    ) -> Result<Vec<Rate>, RateSourceError> {
        let key = rate_cache_key(from, to, parcel, carrier_accounts);
        if let Some(rates) = self.cached_rates(&key).await {
            return Ok(rates);
        }

        let request = ShipmentRequest {
            shipment: ShipmentBody {
                from_address: from,
                to_address: to,
                parcel: ParcelDto::from(parcel),
                carrier_accounts,
            },
        };

        info!(
            from_zip = %from.zip,
            to_zip = %to.zip,
            weight_oz = parcel.weight_oz,
            accounts = carrier_accounts.len(),
            "requesting carrier rates"
        );

        let shipment: ShipmentDto = self.post("shipments", &request).await?;
        for message in &shipment.messages {
            debug!(
                carrier = message.carrier.as_deref().unwrap_or("unknown"),
                reason = message.message.as_deref().unwrap_or(""),
                "carrier declined to rate"
            );
        }

        let rates = shipment.into_rates();
        info!(count = rates.len(), "received carrier rates");
        self.store_rates(key, rates.clone()).await;
        Ok(rates)
    }

    async fn buy_shipment(
        &self,
        shipment_id: &str,
        rate_id: &str,
    ) -> Result<Label, RateSourceError> {
        let request = BuyRequest {
            rate: RateRef { id: rate_id },
        };
        let bought: BoughtShipmentDto = self
            .post(&format!("shipments/{shipment_id}/buy"), &request)
            .await?;
        info!(shipment_id, rate_id, "label purchased");
        Ok(bought.into_label(rate_id))
    }

    async fn void_label(&self, shipment_id: &str) -> Result<VoidOutcome, RateSourceError> {
        let refund: RefundDto = self
            .post(&format!("shipments/{shipment_id}/refund"), &serde_json::json!({}))
            .await?;
        let outcome = refund.into_outcome(shipment_id);
        if outcome.approved {
            info!(shipment_id, status = %outcome.message, "label void submitted");
        } else {
            warn!(shipment_id, status = %outcome.message, "label void rejected");
        }
        Ok(outcome)
    }
}

fn rate_cache_key(from: &Address, to: &Address, parcel: &Parcel, accounts: &[String]) -> String {
    let d = parcel.dimensions;
    format!(
        "{}|{}|{}|{}|{}|{:.2}x{:.2}x{:.2}|{:.2}|{}",
        from.zip,
        from.street1,
        to.zip,
        to.street1,
        to.country,
        d.length,
        d.width,
        d.height,
        parcel.weight_oz,
        accounts.join(",")
    )
}

struct Cached<T> {
    value: T,
    fetched_at: SystemTime,
}

impl<T: Clone> Cached<T> {
    fn new(value: T, fetched_at: SystemTime) -> Self {
        Self { value, fetched_at }
    }

    fn if_fresh(&self, ttl: Duration) -> Option<T> {
        if self
            .fetched_at
            .elapsed()
            .map(|elapsed| elapsed < ttl)
            .unwrap_or(false)
        {
            Some(self.value.clone())
        } else {
            None
        }
    }
}

#[derive(Debug, Serialize)]
struct ShipmentRequest<'a> {
    shipment: ShipmentBody<'a>,
}

#[derive(Debug, Serialize)]
struct ShipmentBody<'a> {
    from_address: &'a Address,
    to_address: &'a Address,
    parcel: ParcelDto,
    carrier_accounts: &'a [String],
}

#[derive(Debug, Serialize)]
struct ParcelDto {
    length: f64,
    width: f64,
    height: f64,
    weight: f64,
}

impl From<&Parcel> for ParcelDto {
    fn from(parcel: &Parcel) -> Self {
        Self {
            length: parcel.dimensions.length,
            width: parcel.dimensions.width,
            height: parcel.dimensions.height,
            // Carriers bill in tenths of an ounce; never round down.
            weight: (parcel.weight_oz * 10.0 - 1e-9).ceil() / 10.0,
        }
    }
}

#[derive(Debug, Serialize)]
struct BuyRequest<'a> {
    rate: RateRef<'a>,
}

#[derive(Debug, Serialize)]
struct RateRef<'a> {
    id: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShipmentDto {
    id: String,
    #[serde(default)]
    rates: Vec<RateDto>,
    #[serde(default)]
    messages: Vec<CarrierMessageDto>,
}

impl ShipmentDto {
    fn into_rates(self) -> Vec<Rate> {
        let shipment_id = self.id;
        self.rates
            .into_iter()
            .map(|dto| dto.into_rate(&shipment_id))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct CarrierMessageDto {
    #[serde(default)]
    carrier: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RateDto {
    id: String,
    #[serde(default)]
    shipment_id: Option<String>,
    carrier: String,
    service: String,
    #[serde(default)]
    carrier_account_id: Option<String>,
    #[serde(deserialize_with = "money_from_json")]
    rate: f64,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    delivery_days: Option<u32>,
    #[serde(default)]
    delivery_date: Option<String>,
}

impl RateDto {
    fn into_rate(self, shipment_id: &str) -> Rate {
        Rate {
            rate_id: self.id,
            shipment_id: self.shipment_id.unwrap_or_else(|| shipment_id.to_string()),
            carrier: self.carrier,
            service: self.service,
            carrier_account_id: self.carrier_account_id,
            price: self.rate,
            currency: self.currency.unwrap_or_else(|| "USD".to_string()),
            delivery_days: self.delivery_days,
            estimated_date: self.delivery_date.as_deref().map(normalize_delivery_date),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BoughtShipmentDto {
    id: String,
    #[serde(default)]
    tracking_code: Option<String>,
    #[serde(default)]
    postage_label: Option<PostageLabelDto>,
    #[serde(default)]
    selected_rate: Option<RateDto>,
}

#[derive(Debug, Deserialize)]
struct PostageLabelDto {
    #[serde(default)]
    label_url: Option<String>,
}

impl BoughtShipmentDto {
    fn into_label(self, rate_id: &str) -> Label {
        let selected = self.selected_rate;
        Label {
            shipment_id: self.id,
            rate_id: selected
                .as_ref()
                .map(|rate| rate.id.clone())
                .unwrap_or_else(|| rate_id.to_string()),
            tracking_code: self.tracking_code,
            label_url: self.postage_label.and_then(|label| label.label_url),
            carrier: selected.as_ref().map(|rate| rate.carrier.clone()),
            service: selected.as_ref().map(|rate| rate.service.clone()),
            cost: selected.as_ref().map(|rate| rate.rate),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RefundDto {
    #[serde(default)]
    refund_status: Option<String>,
}

impl RefundDto {
    fn into_outcome(self, shipment_id: &str) -> VoidOutcome {
        let status = self.refund_status.unwrap_or_else(|| "unknown".to_string());
        let approved = matches!(status.as_str(), "submitted" | "refunded");
        VoidOutcome {
            shipment_id: shipment_id.to_string(),
            approved,
            message: status,
        }
    }
}

/// Reduce carrier timestamps to a plain `YYYY-MM-DD`; unknown formats pass
/// through untouched.
fn normalize_delivery_date(raw: &str) -> String {
    let date_format = format_description!("[year]-[month]-[day]");
    let trimmed = raw.trim();

    if let Ok(dt) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        if let Ok(formatted) = dt.date().format(&date_format) {
            return formatted;
        }
    }

    let date_part = trimmed.get(..10).unwrap_or(trimmed);
    if let Ok(date) = Date::parse(date_part, &date_format) {
        if let Ok(formatted) = date.format(&date_format) {
            return formatted;
        }
    }

    trimmed.to_string()
}

fn money_from_json<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct StringOrNumber;

    impl<'de> serde::de::Visitor<'de> for StringOrNumber {
        type Value = f64;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a monetary amount as string or number")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            value
                .trim()
                .parse::<f64>()
                .map_err(|_| E::custom(format!("invalid amount: {value}")))
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value)
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value as f64)
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value as f64)
        }
    }

    deserializer.deserialize_any(StringOrNumber)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Dimensions;

    const SHIPMENT_JSON: &str = r#"{
        "id": "shp_123",
        "rates": [
            {
                "id": "rate_usps",
                "carrier": "USPS",
                "service": "Priority",
                "carrier_account_id": "ca_usps",
                "rate": "7.58",
                "currency": "USD",
                "delivery_days": 2,
                "delivery_date": "2026-10-21T00:00:00Z"
            },
            {
                "id": "rate_ups",
                "shipment_id": "shp_other",
                "carrier": "UPS",
                "service": "Ground",
                "rate": 9.1,
                "delivery_days": null,
                "delivery_date": null
            }
        ],
        "messages": [
            { "carrier": "FedEx", "message": "account not enabled" }
        ]
    }"#;

    #[test]
    fn parses_shipment_rates() {
        let dto: ShipmentDto = serde_json::from_str(SHIPMENT_JSON).expect("valid json");
        assert_eq!(dto.messages.len(), 1);
        let rates = dto.into_rates();
        assert_eq!(rates.len(), 2);

        let usps = &rates[0];
        assert_eq!(usps.shipment_id, "shp_123");
        assert_eq!(usps.price, 7.58);
        assert_eq!(usps.delivery_days, Some(2));
        assert_eq!(usps.estimated_date.as_deref(), Some("2026-10-21"));
        assert_eq!(usps.carrier_account_id.as_deref(), Some("ca_usps"));

        let ups = &rates[1];
        assert_eq!(ups.shipment_id, "shp_other");
        assert_eq!(ups.currency, "USD");
        assert_eq!(ups.delivery_days, None);
    }

    #[test]
    fn rejects_non_numeric_amounts() {
        let bad = r#"{ "id": "r", "carrier": "C", "service": "S", "rate": "free" }"#;
        assert!(serde_json::from_str::<RateDto>(bad).is_err());
    }

    #[test]
    fn delivery_dates_normalise() {
        assert_eq!(normalize_delivery_date("2026-10-21T15:00:00-04:00"), "2026-10-21");
        assert_eq!(normalize_delivery_date("2026-10-21T00:00:00"), "2026-10-21");
        assert_eq!(normalize_delivery_date("next week"), "next week");
    }

    #[test]
    fn bought_shipment_becomes_label() {
        let json = r#"{
            "id": "shp_9",
            "tracking_code": "9400TEST",
            "postage_label": { "label_url": "https://labels.example/9.png" },
            "selected_rate": { "id": "rate_9", "carrier": "USPS", "service": "Priority", "rate": "8.00" }
        }"#;
        let label = serde_json::from_str::<BoughtShipmentDto>(json)
            .expect("valid json")
            .into_label("rate_requested");
        assert_eq!(label.rate_id, "rate_9");
        assert_eq!(label.tracking_code.as_deref(), Some("9400TEST"));
        assert_eq!(label.cost, Some(8.0));
    }

    #[test]
    fn refund_status_maps_to_approval() {
        let submitted = RefundDto {
            refund_status: Some("submitted".into()),
        }
        .into_outcome("shp_1");
        assert!(submitted.approved);

        let rejected = RefundDto {
            refund_status: Some("rejected".into()),
        }
        .into_outcome("shp_1");
        assert!(!rejected.approved);
        assert_eq!(rejected.message, "rejected");
    }

    #[test]
    fn parcel_weight_rounds_up_to_tenths() {
        let parcel = Parcel {
            dimensions: Dimensions::new(10.0, 8.0, 4.0),
            weight_oz: 12.01,
        };
        assert_eq!(ParcelDto::from(&parcel).weight, 12.1);
    }

    #[test]
    fn cache_entries_expire() {
        let fresh = Cached::new(vec![1], SystemTime::now());
        assert_eq!(fresh.if_fresh(Duration::from_secs(60)), Some(vec![1]));

        let old = Cached::new(vec![1], SystemTime::now() - Duration::from_secs(120));
        assert_eq!(old.if_fresh(Duration::from_secs(60)), None);
    }

    #[test]
    fn rejects_invalid_base_url() {
        assert!(matches!(
            CarrierApiClient::with_base_url("not a url", "key"),
            Err(RateSourceError::InvalidUrl(_))
        ));
    }
}
