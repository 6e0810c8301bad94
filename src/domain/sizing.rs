//! Sizing model: how item categories translate into box capacity and weight.

use serde::{Deserialize, Serialize};

use super::entities::{CategoryTable, Dimensions, ItemCounts, ShippingBox, SizeCategory};

/// Observed weights for a category, in ounces. `avg` drives estimation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

impl WeightStats {
    pub fn new(min: f64, max: f64, avg: f64) -> Self {
        Self { min, max, avg }
    }
}

/// Filler, tape and labour that go into every box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PackingMaterials {
    pub bubble_wrap_per_item_oz: f64,
    pub paper_per_box_oz: f64,
    pub tape_per_box_oz: f64,
    pub air_pillows_per_box_oz: f64,
    pub handling_fee_per_box: f64,
}

impl PackingMaterials {
    /// Weight that does not depend on the item mix.
    pub fn per_box_weight_oz(&self) -> f64 {
        self.paper_per_box_oz + self.tape_per_box_oz + self.air_pillows_per_box_oz
    }
}

impl Default for PackingMaterials {
    fn default() -> Self {
        Self {
            bubble_wrap_per_item_oz: 0.2,
            paper_per_box_oz: 1.0,
            tape_per_box_oz: 0.3,
            air_pillows_per_box_oz: 0.5,
            handling_fee_per_box: 1.50,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SizingModel {
    /// Usable share of a box's raw volume, in (0, 1].
    pub fill_ratio: f64,
    /// Cubic inches occupied by one small unit.
    pub unit_volume: f64,
    pub equivalents: CategoryTable<u32>,
    pub item_weights: CategoryTable<WeightStats>,
    pub dimension_guards: CategoryTable<Dimensions>,
    #[serde(default)]
    pub materials: PackingMaterials,
}

impl SizingModel {
    pub fn units_for(&self, category: SizeCategory) -> u32 {
        *self.equivalents.get(category)
    }

    /// Weighted item count. Widened to `u64` and saturating, so an absurd
    /// order reads as larger than any box rather than wrapping to a small one.
    pub fn small_units(&self, counts: &ItemCounts) -> u64 {
        SizeCategory::ALL.iter().fold(0u64, |total, c| {
            let units = u64::from(counts.get(*c)).saturating_mul(u64::from(self.units_for(*c)));
            total.saturating_add(units)
        })
    }

    pub fn guard(&self, category: SizeCategory) -> &Dimensions {
        self.dimension_guards.get(category)
    }
}

impl Default for SizingModel {
    fn default() -> Self {
        Self {
            fill_ratio: 0.8,
            unit_volume: 64.0,
            equivalents: CategoryTable {
                small: 1,
                medium: 3,
                large: 6,
                xlarge: 18,
            },
            item_weights: CategoryTable {
                small: WeightStats::new(2.0, 8.0, 4.0),
                medium: WeightStats::new(6.0, 16.0, 10.0),
                large: WeightStats::new(12.0, 32.0, 20.0),
                xlarge: WeightStats::new(32.0, 96.0, 60.0),
            },
            dimension_guards: CategoryTable {
                small: Dimensions::new(4.0, 4.0, 3.0),
                medium: Dimensions::new(8.0, 6.0, 4.0),
                large: Dimensions::new(12.0, 10.0, 6.0),
                xlarge: Dimensions::new(20.0, 16.0, 12.0),
            },
            materials: PackingMaterials::default(),
        }
    }
}

/// Stock catalog used when no configuration file is present.
pub fn default_box_catalog() -> Vec<ShippingBox> {
    vec![
        ShippingBox {
            sku: "BOX-S".to_string(),
            name: "Small mailer box".to_string(),
            dimensions: Dimensions::new(8.0, 6.0, 4.0),
            weight_oz: 3.0,
            unit_cost: 0.45,
        },
        ShippingBox {
            sku: "BOX-M".to_string(),
            name: "Medium box".to_string(),
            dimensions: Dimensions::new(12.0, 10.0, 6.0),
            weight_oz: 7.0,
            unit_cost: 0.85,
        },
        ShippingBox {
            sku: "BOX-L".to_string(),
            name: "Large box".to_string(),
            dimensions: Dimensions::new(16.0, 12.0, 10.0),
            weight_oz: 12.0,
            unit_cost: 1.35,
        },
        ShippingBox {
            sku: "BOX-XL".to_string(),
            name: "Extra large box".to_string(),
            dimensions: Dimensions::new(24.0, 18.0, 16.0),
            weight_oz: 24.0,
            unit_cost: 2.75,
        },
    ]
}
