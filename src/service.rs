//! Order quoting and label purchase on top of the packer and a rate source.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{ConfigError, OriginConfig, ShippingConfig};
use crate::domain::{
    aggregate_rates, Address, BoxRatesResult, ItemCounts, Label, Packer, PackingSolution,
    ShippingOption, VoidOutcome, WeightOverrides,
};
use crate::infra::{RateSource, RateSourceError};

pub const NO_OPTIONS_MESSAGE: &str = "no shipping options available";

#[derive(Debug, Error)]
pub enum QuoteServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum LabelPurchaseError {
    #[error("no shipments to purchase")]
    EmptyRequest,
    #[error("got {shipments} shipment ids but {rates} rate ids")]
    LengthMismatch { shipments: usize, rates: usize },
    /// Labels bought before the failure are handed back so the caller can
    /// void them. Nothing is rolled back automatically.
    #[error("label purchase failed at box {failed_index} after {} labels were bought: {source}", .purchased.len())]
    Partial {
        purchased: Vec<Label>,
        failed_index: usize,
        #[source]
        source: RateSourceError,
    },
}

impl LabelPurchaseError {
    pub fn purchased(&self) -> &[Label] {
        match self {
            Self::Partial { purchased, .. } => purchased,
            _ => &[],
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ShippingQuoteResponse {
    pub quote_id: Uuid,
    pub solution: Arc<PackingSolution>,
    pub options: Vec<ShippingOption>,
    pub default_option: Option<ShippingOption>,
    pub error: Option<String>,
}

pub struct QuoteService {
    config: ShippingConfig,
    packer: Packer,
    rate_source: Arc<dyn RateSource>,
}

impl QuoteService {
    pub fn new(
        config: ShippingConfig,
        rate_source: Arc<dyn RateSource>,
    ) -> Result<Self, QuoteServiceError> {
        config.validate()?;
        let packer = Packer::new(config.boxes.clone(), config.sizing.clone());
        Ok(Self {
            config,
            packer,
            rate_source,
        })
    }

    pub fn config(&self) -> &ShippingConfig {
        &self.config
    }

    pub fn packer(&self) -> &Packer {
        &self.packer
    }

    pub async fn get_shipping_quote(
        &self,
        counts: &ItemCounts,
        to: &Address,
    ) -> ShippingQuoteResponse {
        self.get_shipping_quote_with_overrides(counts, to, None)
            .await
    }

    pub async fn get_shipping_quote_with_overrides(
        &self,
        counts: &ItemCounts,
        to: &Address,
        overrides: Option<&WeightOverrides>,
    ) -> ShippingQuoteResponse {
        let quote_id = Uuid::new_v4();
        let solution = Arc::new(self.packer.pack_with_overrides(counts, overrides));

        if !solution.is_valid() {
            let message = solution
                .error_message()
                .unwrap_or_else(|| "packing failed".to_string());
            warn!(%quote_id, error = %message, "order could not be packed");
            return ShippingQuoteResponse {
                quote_id,
                solution,
                options: Vec::new(),
                default_option: None,
                error: Some(message),
            };
        }

        info!(
            %quote_id,
            boxes = solution.total_boxes,
            packing_cost = solution.total_cost,
            "packed order"
        );

        let box_rates = self.fetch_box_rates(&solution, to, quote_id).await;
        let mut options = aggregate_rates(&box_rates, &solution, self.config.sort_preference);
        let covered = options.len();
        options.truncate(self.config.present_top_n);
        let default_option = options.first().cloned();

        let error = if options.is_empty() {
            warn!(%quote_id, "no carrier covered every box");
            Some(NO_OPTIONS_MESSAGE.to_string())
        } else {
            info!(
                %quote_id,
                covered,
                presented = options.len(),
                best = default_option.as_ref().map(|o| o.total_cost).unwrap_or_default(),
                "quote ready"
            );
            None
        };

        ShippingQuoteResponse {
            quote_id,
            solution,
            options,
            default_option,
            error,
        }
    }

    /// Rates every box concurrently. A failed fetch is logged and skipped;
    /// aggregation then simply sees less coverage.
    async fn fetch_box_rates(
        &self,
        solution: &PackingSolution,
        to: &Address,
        quote_id: Uuid,
    ) -> Vec<BoxRatesResult> {
        let origins: Vec<&OriginConfig> = self
            .config
            .origins
            .iter()
            .filter(|origin| !origin.carrier_accounts.is_empty())
            .collect();
        if origins.is_empty() {
            warn!(%quote_id, "no origin has carrier accounts configured");
        }

        let requests = solution
            .selections
            .iter()
            .enumerate()
            .map(|(box_index, selection)| {
                let origins = &origins;
                async move {
                    let parcel = selection.parcel();
                    let mut rates = Vec::new();
                    for origin in origins {
                        match self
                            .rate_source
                            .get_rates(&origin.address, to, &parcel, &origin.carrier_accounts)
                            .await
                        {
                            Ok(found) => rates.extend(found),
                            Err(error) => warn!(
                                %quote_id,
                                box_index,
                                origin = %origin.name,
                                %error,
                                "rate fetch failed, skipping"
                            ),
                        }
                    }
                    BoxRatesResult {
                        box_index,
                        selection: selection.clone(),
                        rates,
                    }
                }
            });

        join_all(requests).await
    }

    /// Buy one label per box, in order. Stops at the first failure.
    pub async fn create_labels_for_multi_box(
        &self,
        shipment_ids: &[String],
        rate_ids: &[String],
    ) -> Result<Vec<Label>, LabelPurchaseError> {
        if shipment_ids.len() != rate_ids.len() {
            return Err(LabelPurchaseError::LengthMismatch {
                shipments: shipment_ids.len(),
                rates: rate_ids.len(),
            });
        }
        if shipment_ids.is_empty() {
            return Err(LabelPurchaseError::EmptyRequest);
        }

        let mut purchased = Vec::with_capacity(shipment_ids.len());
        for (index, (shipment_id, rate_id)) in shipment_ids.iter().zip(rate_ids).enumerate() {
            match self.rate_source.buy_shipment(shipment_id, rate_id).await {
                Ok(label) => purchased.push(label),
                Err(source) => {
                    warn!(
                        shipment_id = %shipment_id,
                        failed_index = index,
                        purchased = purchased.len(),
                        error = %source,
                        "multi-box label purchase stopped"
                    );
                    return Err(LabelPurchaseError::Partial {
                        purchased,
                        failed_index: index,
                        source,
                    });
                }
            }
        }

        info!(labels = purchased.len(), "multi-box labels purchased");
        Ok(purchased)
    }

    /// Void each shipment independently; one failure does not stop the rest.
    pub async fn void_labels(
        &self,
        shipment_ids: &[String],
    ) -> Vec<Result<VoidOutcome, RateSourceError>> {
        let mut outcomes = Vec::with_capacity(shipment_ids.len());
        for shipment_id in shipment_ids {
            let outcome = self.rate_source.void_label(shipment_id).await;
            if let Err(error) = &outcome {
                warn!(shipment_id = %shipment_id, %error, "void request failed");
            }
            outcomes.push(outcome);
        }
        outcomes
    }
}
