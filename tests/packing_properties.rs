//! Property tests for the packer and the rate aggregator.
//!
//! `PROPTEST_CASES` overrides the number of cases per property.

use std::env;
use std::sync::Arc;

use proptest::prelude::*;

use parcel_quote::domain::{
    aggregate_rates, BoxRatesResult, ItemCounts, Packer, PackingFailure, PackingSolution, Rate,
    SortPreference, MAX_BOXES,
};
use parcel_quote::ShippingConfig;

const DEFAULT_PROPTEST_CASES: u32 = 64;

fn proptest_config() -> ProptestConfig {
    let cases = env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PROPTEST_CASES);
    ProptestConfig::with_cases(cases)
}

fn packer() -> Packer {
    let config = ShippingConfig::default();
    Packer::new(config.boxes, config.sizing)
}

fn counts(max: u32) -> impl Strategy<Value = ItemCounts> {
    (0..=max, 0..=max, 0..=max, 0..=max).prop_map(|(s, m, l, x)| ItemCounts::new(s, m, l, x))
}

/// Orders sized so the default catalog can always ship them within the box
/// limit: at most 288 small units against 86 per extra-large box.
fn shippable_counts() -> impl Strategy<Value = ItemCounts> {
    (0u32..=60, 0u32..=20, 0u32..=10, 0u32..=6)
        .prop_map(|(s, m, l, x)| ItemCounts::new(s, m, l, x))
}

proptest! {
    #![proptest_config(proptest_config())]

    #[test]
    fn small_units_are_additive(a in counts(500), b in counts(500)) {
        let packer = packer();
        prop_assert_eq!(
            packer.small_units(&a.add(&b)),
            packer.small_units(&a) + packer.small_units(&b)
        );
    }

    #[test]
    fn distribution_conserves_items(order in counts(200), capacity in 0u32..400) {
        let packer = packer();
        let (packed, remaining) = packer.distribute_items_to_box(&order, capacity);
        prop_assert_eq!(packed.add(&remaining), order);
        prop_assert!(packer.small_units(&packed) <= u64::from(capacity));
    }

    #[test]
    fn packed_boxes_hold_exactly_the_order(order in shippable_counts()) {
        let packer = packer();
        let solution = packer.pack(&order);

        if order.is_empty() {
            prop_assert_eq!(solution.error, Some(PackingFailure::NoItems));
            return Ok(());
        }

        prop_assert!(solution.valid, "unexpected failure: {:?}", solution.error);
        prop_assert_eq!(solution.packed_items(), order);
        prop_assert_eq!(solution.total_boxes, solution.selections.len());
        prop_assert!(solution.total_boxes >= 1 && solution.total_boxes <= MAX_BOXES);

        let mut total = 0.0;
        for selection in &solution.selections {
            prop_assert!(
                packer.small_units(&selection.items)
                    <= u64::from(packer.capacity(&selection.shipping_box))
            );
            prop_assert!(packer.dimensions_ok(&selection.shipping_box, &selection.items));
            total += selection.box_cost + selection.handling_cost;
        }
        prop_assert!((solution.total_cost - total).abs() < 1e-9);
    }

    #[test]
    fn failures_never_carry_boxes(order in counts(400)) {
        let solution = packer().pack(&order);
        if !solution.valid {
            prop_assert!(solution.selections.is_empty());
            prop_assert!(solution.error.is_some());
        } else {
            prop_assert!(solution.total_boxes <= MAX_BOXES);
        }
    }

    #[test]
    fn options_cover_every_box(
        order in shippable_counts(),
        offers in prop::collection::vec(
            prop::collection::vec((0usize..3, 1u32..2000, prop::option::of(1u32..10)), 0..6),
            MAX_BOXES,
        ),
    ) {
        let solution = Arc::new(packer().pack(&order));
        prop_assume!(solution.valid);

        let box_rates = rates_for(&solution, &offers);
        let options = aggregate_rates(&box_rates, &solution, SortPreference::PriceOnly);

        for option in &options {
            prop_assert_eq!(option.rate_ids.len(), solution.total_boxes);
            prop_assert_eq!(option.box_count, solution.total_boxes);

            let chosen: Vec<&Rate> = option
                .rate_ids
                .iter()
                .enumerate()
                .map(|(i, id)| {
                    box_rates[i]
                        .rates
                        .iter()
                        .find(|r| &r.rate_id == id)
                        .expect("rate id comes from its own box")
                })
                .collect();

            let price: f64 = chosen.iter().map(|r| r.price).sum();
            prop_assert!((option.price - price).abs() < 1e-6);
            prop_assert!(
                (option.total_cost - (option.price + option.box_cost + option.handling_cost)).abs()
                    < 1e-6
            );
            let max_days = chosen.iter().filter_map(|r| r.delivery_days).max();
            prop_assert_eq!(option.delivery_days, max_days);
        }

        for pair in options.windows(2) {
            prop_assert!(pair[0].total_cost <= pair[1].total_cost);
        }
    }
}

const CARRIERS: [&str; 3] = ["USPS", "UPS", "FedEx"];

fn rates_for(
    solution: &PackingSolution,
    offers: &[Vec<(usize, u32, Option<u32>)>],
) -> Vec<BoxRatesResult> {
    solution
        .selections
        .iter()
        .enumerate()
        .map(|(box_index, selection)| BoxRatesResult {
            box_index,
            selection: selection.clone(),
            rates: offers[box_index]
                .iter()
                .enumerate()
                .map(|(n, (carrier, cents, days))| Rate {
                    rate_id: format!("rate_{box_index}_{n}"),
                    shipment_id: format!("shp_{box_index}"),
                    carrier: CARRIERS[*carrier].to_string(),
                    service: "Ground".to_string(),
                    carrier_account_id: None,
                    price: f64::from(*cents) / 100.0,
                    currency: "USD".to_string(),
                    delivery_days: *days,
                    estimated_date: None,
                })
                .collect(),
        })
        .collect()
}
