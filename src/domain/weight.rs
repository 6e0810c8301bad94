//! Shipped-weight estimation for a packed box.

use serde::{Deserialize, Serialize};

use super::entities::{ItemCounts, ShippingBox, SizeCategory};
use super::sizing::SizingModel;

/// Per-call replacement for the configured average item weights.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightOverrides {
    #[serde(default)]
    pub small: Option<f64>,
    #[serde(default)]
    pub medium: Option<f64>,
    #[serde(default)]
    pub large: Option<f64>,
    #[serde(default)]
    pub xlarge: Option<f64>,
}

impl WeightOverrides {
    pub fn get(&self, category: SizeCategory) -> Option<f64> {
        match category {
            SizeCategory::Small => self.small,
            SizeCategory::Medium => self.medium,
            SizeCategory::Large => self.large,
            SizeCategory::XLarge => self.xlarge,
        }
    }
}

/// Weight of one item of `category`: the override when it is a usable
/// positive number, otherwise the configured average.
pub fn resolve_item_weight(
    sizing: &SizingModel,
    category: SizeCategory,
    overrides: Option<&WeightOverrides>,
) -> f64 {
    overrides
        .and_then(|o| o.get(category))
        .filter(|w| w.is_finite() && *w > 0.0)
        .unwrap_or(sizing.item_weights.get(category).avg)
}

/// Box weight + item weights + bubble wrap per item + per-box filler.
pub fn estimate_weight(
    sizing: &SizingModel,
    shipping_box: &ShippingBox,
    counts: &ItemCounts,
    overrides: Option<&WeightOverrides>,
) -> f64 {
    let items: f64 = counts
        .present()
        .map(|c| resolve_item_weight(sizing, c, overrides) * counts.get(c) as f64)
        .sum();

    let materials = &sizing.materials;
    shipping_box.weight_oz
        + items
        + materials.bubble_wrap_per_item_oz * counts.total_items() as f64
        + materials.per_box_weight_oz()
}
