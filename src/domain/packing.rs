//! Box selection for an order's item mix.
//!
//! - Capacity is measured in small units, not geometry.
//! - Try the cheapest single box first, then fall back to greedily filling
//!   the biggest boxes and recursing on what is left.
//!
//! This is a heuristic, not an optimal bin packer: it is fast, deterministic
//! and easy to explain, but it does not promise the minimal box count.

use std::cmp::Reverse;
use std::collections::HashMap;

use serde::{Serialize, Serializer};
use thiserror::Error;

use super::entities::{Dimensions, ItemCounts, Parcel, ShippingBox, SizeCategory, UnknownCategory};
use super::sizing::SizingModel;
use super::weight::{estimate_weight, WeightOverrides};

/// Upper bound on boxes in one solution.
pub const MAX_BOXES: usize = 10;

/// Absorbs float error so exact multiples of the unit volume floor correctly.
const CAPACITY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PackingFailure {
    #[error("no items to pack")]
    NoItems,
    #[error("no single box can fit all items")]
    NoSingleBox,
    #[error("too many boxes required (>10)")]
    TooManyBoxes,
    #[error("unable to pack items in available boxes")]
    Unpackable,
}

impl Serialize for PackingFailure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DimensionError {
    #[error(transparent)]
    UnknownCategory(#[from] UnknownCategory),
    #[error("{category} item {actual:?} exceeds the {category} size limit {limit:?}")]
    ExceedsGuard {
        category: SizeCategory,
        actual: Dimensions,
        limit: Dimensions,
    },
}

/// One physical box and the items assigned to it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BoxSelection {
    pub shipping_box: ShippingBox,
    pub items: ItemCounts,
    pub weight_oz: f64,
    pub box_cost: f64,
    pub handling_cost: f64,
}

impl BoxSelection {
    pub fn parcel(&self) -> Parcel {
        Parcel {
            dimensions: self.shipping_box.dimensions,
            weight_oz: self.weight_oz,
        }
    }

    pub fn cost(&self) -> f64 {
        self.box_cost + self.handling_cost
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PackingSolution {
    pub selections: Vec<BoxSelection>,
    pub total_cost: f64,
    pub total_boxes: usize,
    pub valid: bool,
    pub error: Option<PackingFailure>,
}

impl PackingSolution {
    fn packed(selections: Vec<BoxSelection>) -> Self {
        let total_cost = selections.iter().map(BoxSelection::cost).sum();
        Self {
            total_boxes: selections.len(),
            selections,
            total_cost,
            valid: true,
            error: None,
        }
    }

    fn failed(failure: PackingFailure) -> Self {
        Self {
            selections: Vec::new(),
            total_cost: 0.0,
            total_boxes: 0,
            valid: false,
            error: Some(failure),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.map(|failure| failure.to_string())
    }

    /// Items across all boxes.
    pub fn packed_items(&self) -> ItemCounts {
        self.selections
            .iter()
            .fold(ItemCounts::default(), |acc, sel| acc.add(&sel.items))
    }
}

/// Bookkeeping for one `pack` call.
struct PackAttempt<'a> {
    overrides: Option<&'a WeightOverrides>,
    failed: HashMap<(ItemCounts, usize), PackingFailure>,
}

#[derive(Clone, Debug)]
pub struct Packer {
    boxes: Vec<ShippingBox>,
    sizing: SizingModel,
}

impl Packer {
    pub fn new(boxes: Vec<ShippingBox>, sizing: SizingModel) -> Self {
        Self { boxes, sizing }
    }

    pub fn boxes(&self) -> &[ShippingBox] {
        &self.boxes
    }

    pub fn sizing(&self) -> &SizingModel {
        &self.sizing
    }

    pub fn small_units(&self, counts: &ItemCounts) -> u64 {
        self.sizing.small_units(counts)
    }

    /// Small units a box holds after the fill-ratio safety margin.
    pub fn capacity(&self, shipping_box: &ShippingBox) -> u32 {
        let usable = shipping_box.dimensions.volume() * self.sizing.fill_ratio;
        let units = (usable / self.sizing.unit_volume + CAPACITY_EPSILON).floor();
        if units.is_finite() && units > 0.0 {
            units.min(u32::MAX as f64) as u32
        } else {
            0
        }
    }

    /// Every category present in `counts` has a guard that fits in the box.
    pub fn dimensions_ok(&self, shipping_box: &ShippingBox, counts: &ItemCounts) -> bool {
        counts
            .present()
            .all(|c| self.category_fits(shipping_box, c))
    }

    fn category_fits(&self, shipping_box: &ShippingBox, category: SizeCategory) -> bool {
        self.sizing
            .guard(category)
            .fits_within(&shipping_box.dimensions)
    }

    pub fn candidate_boxes(&self, counts: &ItemCounts) -> Vec<&ShippingBox> {
        let needed = self.small_units(counts);
        self.boxes
            .iter()
            .filter(|b| u64::from(self.capacity(b)) >= needed && self.dimensions_ok(b, counts))
            .collect()
    }

    pub fn estimate_weight(&self, shipping_box: &ShippingBox, counts: &ItemCounts) -> f64 {
        estimate_weight(&self.sizing, shipping_box, counts, None)
    }

    pub fn pack_single_box(&self, counts: &ItemCounts) -> PackingSolution {
        match self.single_box_selection(counts, None) {
            Some(selection) => PackingSolution::packed(vec![selection]),
            None => PackingSolution::failed(PackingFailure::NoSingleBox),
        }
    }

    fn single_box_selection(
        &self,
        counts: &ItemCounts,
        overrides: Option<&WeightOverrides>,
    ) -> Option<BoxSelection> {
        let handling = self.sizing.materials.handling_fee_per_box;
        let mut best: Option<&ShippingBox> = None;
        for candidate in self.candidate_boxes(counts) {
            // Strict comparison keeps the first box in catalog order on ties.
            let cheaper = best
                .map(|b| candidate.unit_cost + handling < b.unit_cost + handling)
                .unwrap_or(true);
            if cheaper {
                best = Some(candidate);
            }
        }
        best.map(|b| self.selection(b, *counts, overrides))
    }

    fn selection(
        &self,
        shipping_box: &ShippingBox,
        items: ItemCounts,
        overrides: Option<&WeightOverrides>,
    ) -> BoxSelection {
        BoxSelection {
            shipping_box: shipping_box.clone(),
            items,
            weight_oz: estimate_weight(&self.sizing, shipping_box, &items, overrides),
            box_cost: shipping_box.unit_cost,
            handling_cost: self.sizing.materials.handling_fee_per_box,
        }
    }

    /// Greedy fill, biggest category first. Returns `(packed, remaining)`;
    /// the two always add back up to `counts`.
    pub fn distribute_items_to_box(
        &self,
        counts: &ItemCounts,
        capacity: u32,
    ) -> (ItemCounts, ItemCounts) {
        let mut packed = ItemCounts::default();
        let mut remaining = *counts;
        let mut room = capacity;

        for category in SizeCategory::LARGEST_FIRST {
            let units = self.sizing.units_for(category);
            let available = counts.get(category);
            if available == 0 || units == 0 {
                continue;
            }
            let take = available.min(room / units);
            packed.set(category, take);
            remaining.set(category, available - take);
            room -= take * units;
        }

        (packed, remaining)
    }

    pub fn pack_multiple_boxes(&self, counts: &ItemCounts) -> PackingSolution {
        self.pack_multiple_with(counts, None)
    }

    fn pack_multiple_with(
        &self,
        counts: &ItemCounts,
        overrides: Option<&WeightOverrides>,
    ) -> PackingSolution {
        if self.small_units(counts) == 0 {
            return PackingSolution::failed(PackingFailure::NoItems);
        }
        let mut attempt = PackAttempt {
            overrides,
            failed: HashMap::new(),
        };
        match self.pack_recursively(counts, 0, &mut attempt) {
            Ok(selections) => PackingSolution::packed(selections),
            Err(failure) => PackingSolution::failed(failure),
        }
    }

    fn pack_recursively(
        &self,
        counts: &ItemCounts,
        depth: usize,
        attempt: &mut PackAttempt<'_>,
    ) -> Result<Vec<BoxSelection>, PackingFailure> {
        if depth >= MAX_BOXES {
            return Err(PackingFailure::TooManyBoxes);
        }
        if let Some(failure) = attempt.failed.get(&(*counts, depth)) {
            return Err(*failure);
        }
        if let Some(selection) = self.single_box_selection(counts, attempt.overrides) {
            return Ok(vec![selection]);
        }

        let mut hit_box_limit = false;
        for shipping_box in self.boxes_by_capacity() {
            let offered = self.fitting_items(shipping_box, counts);
            let (packed, _) = self.distribute_items_to_box(&offered, self.capacity(shipping_box));
            if packed.is_empty() {
                continue;
            }

            let remaining = counts.saturating_sub(&packed);
            let head = self.selection(shipping_box, packed, attempt.overrides);
            if remaining.is_empty() {
                return Ok(vec![head]);
            }

            match self.pack_recursively(&remaining, depth + 1, attempt) {
                Ok(rest) => {
                    let mut selections = Vec::with_capacity(rest.len() + 1);
                    selections.push(head);
                    selections.extend(rest);
                    return Ok(selections);
                }
                Err(PackingFailure::TooManyBoxes) => hit_box_limit = true,
                Err(_) => {}
            }
        }

        let failure = if hit_box_limit {
            PackingFailure::TooManyBoxes
        } else {
            PackingFailure::Unpackable
        };
        attempt.failed.insert((*counts, depth), failure);
        Err(failure)
    }

    /// Boxes with usable capacity, largest first; catalog order on ties.
    fn boxes_by_capacity(&self) -> Vec<&ShippingBox> {
        let mut boxes: Vec<&ShippingBox> = self
            .boxes
            .iter()
            .filter(|b| self.capacity(b) > 0)
            .collect();
        boxes.sort_by_key(|b| Reverse(self.capacity(b)));
        boxes
    }

    /// The part of `counts` whose categories physically fit this box.
    fn fitting_items(&self, shipping_box: &ShippingBox, counts: &ItemCounts) -> ItemCounts {
        let mut offered = ItemCounts::default();
        for category in counts.present() {
            if self.category_fits(shipping_box, category) {
                offered.set(category, counts.get(category));
            }
        }
        offered
    }

    pub fn pack(&self, counts: &ItemCounts) -> PackingSolution {
        self.pack_with_overrides(counts, None)
    }

    pub fn pack_with_overrides(
        &self,
        counts: &ItemCounts,
        overrides: Option<&WeightOverrides>,
    ) -> PackingSolution {
        if self.small_units(counts) == 0 {
            return PackingSolution::failed(PackingFailure::NoItems);
        }
        if let Some(selection) = self.single_box_selection(counts, overrides) {
            return PackingSolution::packed(vec![selection]);
        }
        self.pack_multiple_with(counts, overrides)
    }

    /// Checks a single item's measured size against its category limit.
    pub fn validate_item_dimensions(
        &self,
        category: SizeCategory,
        dimensions: &Dimensions,
    ) -> Result<(), DimensionError> {
        let limit = *self.sizing.guard(category);
        if dimensions.fits_within(&limit) {
            Ok(())
        } else {
            Err(DimensionError::ExceedsGuard {
                category,
                actual: *dimensions,
                limit,
            })
        }
    }

    pub fn validate_item_dimensions_str(
        &self,
        category: &str,
        length: f64,
        width: f64,
        height: f64,
    ) -> Result<(), DimensionError> {
        let category: SizeCategory = category.parse()?;
        self.validate_item_dimensions(category, &Dimensions::new(length, width, height))
    }
}
