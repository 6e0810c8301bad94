//! Whole-order shipping options built from per-box carrier rates.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::entities::Rate;
use super::packing::{BoxSelection, PackingSolution};

/// Rates a carrier source returned for one box of a solution.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BoxRatesResult {
    pub box_index: usize,
    pub selection: BoxSelection,
    pub rates: Vec<Rate>,
}

/// A carrier/service offer covering every box of the order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ShippingOption {
    pub carrier: String,
    pub service: String,
    /// One per box, in box order.
    pub rate_ids: Vec<String>,
    pub shipment_ids: Vec<String>,
    pub price: f64,
    pub currency: String,
    pub box_cost: f64,
    pub handling_cost: f64,
    pub total_cost: f64,
    pub delivery_days: Option<u32>,
    pub estimated_date: Option<String>,
    pub box_count: usize,
    #[serde(skip)]
    pub solution: Arc<PackingSolution>,
}

/// Ordering applied to aggregated options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortPreference {
    PriceThenDays,
    DaysThenPrice,
    #[default]
    #[serde(other)]
    PriceOnly,
}

impl SortPreference {
    pub fn label(&self) -> &'static str {
        match self {
            Self::PriceThenDays => "price_then_days",
            Self::DaysThenPrice => "days_then_price",
            Self::PriceOnly => "price_only",
        }
    }
}

impl FromStr for SortPreference {
    type Err = std::convert::Infallible;

    /// Anything unrecognised sorts by price alone.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "price_then_days" => Self::PriceThenDays,
            "days_then_price" => Self::DaysThenPrice,
            _ => Self::PriceOnly,
        })
    }
}

#[derive(Default)]
struct Accumulator {
    carrier: String,
    service: String,
    currency: String,
    rate_ids: Vec<String>,
    shipment_ids: Vec<String>,
    boxes_covered: usize,
    price: f64,
    box_cost: f64,
    handling_cost: f64,
    delivery_days: Option<u32>,
    estimated_date: Option<String>,
}

impl Accumulator {
    fn new(rate: &Rate) -> Self {
        Self {
            carrier: rate.carrier.clone(),
            service: rate.service.clone(),
            currency: rate.currency.clone(),
            ..Self::default()
        }
    }

    fn add(&mut self, rate: &Rate, selection: &BoxSelection) {
        self.rate_ids.push(rate.rate_id.clone());
        self.shipment_ids.push(rate.shipment_id.clone());
        self.boxes_covered += 1;
        self.price += rate.price;
        self.box_cost += selection.box_cost;
        self.handling_cost += selection.handling_cost;

        // Boxes travel in parallel, the slowest one sets the order's estimate.
        // Equal days keep the first date seen.
        if let Some(days) = rate.delivery_days {
            if self.delivery_days.map(|current| days > current).unwrap_or(true) {
                self.delivery_days = Some(days);
                self.estimated_date = rate.estimated_date.clone();
            }
        }
    }

    fn into_option(self, solution: &Arc<PackingSolution>) -> ShippingOption {
        let total_cost = self.price + self.box_cost + self.handling_cost;
        ShippingOption {
            carrier: self.carrier,
            service: self.service,
            rate_ids: self.rate_ids,
            shipment_ids: self.shipment_ids,
            price: self.price,
            currency: self.currency,
            box_cost: self.box_cost,
            handling_cost: self.handling_cost,
            total_cost,
            delivery_days: self.delivery_days,
            estimated_date: self.estimated_date,
            box_count: self.boxes_covered,
            solution: Arc::clone(solution),
        }
    }
}

/// Combine per-box rates into order-level options.
///
/// A carrier/service is only offered when it quoted every box in the
/// solution; anything less would undercharge a multi-box shipment.
pub fn aggregate_rates(
    box_rates: &[BoxRatesResult],
    solution: &Arc<PackingSolution>,
    sort: SortPreference,
) -> Vec<ShippingOption> {
    if box_rates.is_empty() || solution.total_boxes == 0 {
        return Vec::new();
    }

    // Only indexes of real boxes count toward coverage, each at most once.
    let mut ordered: Vec<&BoxRatesResult> = box_rates
        .iter()
        .filter(|result| result.box_index < solution.total_boxes)
        .collect();
    ordered.sort_by_key(|result| result.box_index);
    ordered.dedup_by_key(|result| result.box_index);

    let mut index: HashMap<(String, String), usize> = HashMap::new();
    let mut groups: Vec<Accumulator> = Vec::new();

    for result in ordered {
        for rate in cheapest_per_service(&result.rates) {
            let key = (rate.carrier.clone(), rate.service.clone());
            let slot = *index.entry(key).or_insert_with(|| {
                groups.push(Accumulator::new(rate));
                groups.len() - 1
            });
            let group = &mut groups[slot];
            if group.currency != rate.currency {
                warn!(
                    carrier = %rate.carrier,
                    service = %rate.service,
                    box_index = result.box_index,
                    expected = %group.currency,
                    found = %rate.currency,
                    "skipping rate quoted in a different currency"
                );
                continue;
            }
            group.add(rate, &result.selection);
        }
    }

    let mut options: Vec<ShippingOption> = groups
        .into_iter()
        .filter(|group| group.boxes_covered == solution.total_boxes)
        .map(|group| group.into_option(solution))
        .collect();

    sort_shipping_options(&mut options, sort);
    options
}

/// A box may list the same carrier/service more than once; only its cheapest
/// quote counts, in first-seen order.
fn cheapest_per_service(rates: &[Rate]) -> Vec<&Rate> {
    let mut picked: Vec<&Rate> = Vec::with_capacity(rates.len());
    for rate in rates {
        match picked
            .iter_mut()
            .find(|p| p.carrier == rate.carrier && p.service == rate.service)
        {
            Some(existing) => {
                if rate.price < existing.price {
                    *existing = rate;
                }
            }
            None => picked.push(rate),
        }
    }
    picked
}

fn cmp_cost(a: &ShippingOption, b: &ShippingOption) -> Ordering {
    a.total_cost
        .partial_cmp(&b.total_cost)
        .unwrap_or(Ordering::Equal)
}

fn cmp_days(a: &ShippingOption, b: &ShippingOption) -> Ordering {
    match (a.delivery_days, b.delivery_days) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Stable sort; options comparing equal keep their relative order.
pub fn sort_shipping_options(options: &mut [ShippingOption], sort: SortPreference) {
    options.sort_by(|a, b| match sort {
        SortPreference::PriceThenDays => cmp_cost(a, b).then_with(|| cmp_days(a, b)),
        SortPreference::DaysThenPrice => cmp_days(a, b).then_with(|| cmp_cost(a, b)),
        SortPreference::PriceOnly => cmp_cost(a, b),
    });
}
