use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Item size bucket. Every sellable item maps to exactly one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeCategory {
    Small,
    Medium,
    Large,
    #[serde(rename = "xlarge")]
    XLarge,
}

impl SizeCategory {
    pub const ALL: [SizeCategory; 4] = [
        SizeCategory::Small,
        SizeCategory::Medium,
        SizeCategory::Large,
        SizeCategory::XLarge,
    ];

    /// Order used when greedily filling a box: biggest items first.
    pub const LARGEST_FIRST: [SizeCategory; 4] = [
        SizeCategory::XLarge,
        SizeCategory::Large,
        SizeCategory::Medium,
        SizeCategory::Small,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::XLarge => "xlarge",
        }
    }
}

impl fmt::Display for SizeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown size category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for SizeCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "small" => Ok(Self::Small),
            "medium" => Ok(Self::Medium),
            "large" => Ok(Self::Large),
            "xlarge" => Ok(Self::XLarge),
            _ => Err(UnknownCategory(s.to_string())),
        }
    }
}

/// One value per size category. Config files must name all four.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryTable<T> {
    pub small: T,
    pub medium: T,
    pub large: T,
    pub xlarge: T,
}

impl<T> CategoryTable<T> {
    pub fn get(&self, category: SizeCategory) -> &T {
        match category {
            SizeCategory::Small => &self.small,
            SizeCategory::Medium => &self.medium,
            SizeCategory::Large => &self.large,
            SizeCategory::XLarge => &self.xlarge,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (SizeCategory, &T)> {
        SizeCategory::ALL.into_iter().map(move |c| (c, self.get(c)))
    }
}

/// Item mix of an order (or of one box within it).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemCounts {
    #[serde(default)]
    pub small: u32,
    #[serde(default)]
    pub medium: u32,
    #[serde(default)]
    pub large: u32,
    #[serde(default)]
    pub xlarge: u32,
}

impl ItemCounts {
    pub fn new(small: u32, medium: u32, large: u32, xlarge: u32) -> Self {
        Self {
            small,
            medium,
            large,
            xlarge,
        }
    }

    pub fn get(&self, category: SizeCategory) -> u32 {
        match category {
            SizeCategory::Small => self.small,
            SizeCategory::Medium => self.medium,
            SizeCategory::Large => self.large,
            SizeCategory::XLarge => self.xlarge,
        }
    }

    pub fn set(&mut self, category: SizeCategory, count: u32) {
        match category {
            SizeCategory::Small => self.small = count,
            SizeCategory::Medium => self.medium = count,
            SizeCategory::Large => self.large = count,
            SizeCategory::XLarge => self.xlarge = count,
        }
    }

    pub fn total_items(&self) -> u64 {
        u64::from(self.small)
            + u64::from(self.medium)
            + u64::from(self.large)
            + u64::from(self.xlarge)
    }

    pub fn is_empty(&self) -> bool {
        self.total_items() == 0
    }

    /// Element-wise sum, saturating at `u32::MAX` per category.
    pub fn add(&self, other: &ItemCounts) -> ItemCounts {
        ItemCounts {
            small: self.small.saturating_add(other.small),
            medium: self.medium.saturating_add(other.medium),
            large: self.large.saturating_add(other.large),
            xlarge: self.xlarge.saturating_add(other.xlarge),
        }
    }

    pub fn saturating_sub(&self, other: &ItemCounts) -> ItemCounts {
        ItemCounts {
            small: self.small.saturating_sub(other.small),
            medium: self.medium.saturating_sub(other.medium),
            large: self.large.saturating_sub(other.large),
            xlarge: self.xlarge.saturating_sub(other.xlarge),
        }
    }

    /// Categories with at least one item, smallest first.
    pub fn present(&self) -> impl Iterator<Item = SizeCategory> + '_ {
        SizeCategory::ALL
            .into_iter()
            .filter(move |c| self.get(*c) > 0)
    }
}

/// Outer dimensions in inches.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

impl Dimensions {
    pub fn new(length: f64, width: f64, height: f64) -> Self {
        Self {
            length,
            width,
            height,
        }
    }

    pub fn volume(&self) -> f64 {
        self.length * self.width * self.height
    }

    pub fn sorted(&self) -> [f64; 3] {
        let mut sides = [self.length, self.width, self.height];
        sides.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        sides
    }

    /// Rotation-agnostic containment check. Not exact 3D packing: it only
    /// compares sorted side lengths.
    pub fn fits_within(&self, outer: &Dimensions) -> bool {
        let inner = self.sorted();
        let outer = outer.sorted();
        inner.iter().zip(outer.iter()).all(|(i, o)| i <= o)
    }

    pub fn is_positive(&self) -> bool {
        [self.length, self.width, self.height]
            .iter()
            .all(|side| side.is_finite() && *side > 0.0)
    }
}

/// Catalog entry for a box we stock.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShippingBox {
    pub sku: String,
    pub name: String,
    pub dimensions: Dimensions,
    /// Empty box weight in ounces.
    pub weight_oz: f64,
    pub unit_cost: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub street1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street2: Option<String>,
    pub city: String,
    pub state: String,
    pub zip: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

fn default_country() -> String {
    "US".to_string()
}

/// What a carrier is asked to rate: one physical box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parcel {
    pub dimensions: Dimensions,
    pub weight_oz: f64,
}

/// One carrier/service quote for one box.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rate {
    pub rate_id: String,
    pub shipment_id: String,
    pub carrier: String,
    pub service: String,
    #[serde(default)]
    pub carrier_account_id: Option<String>,
    pub price: f64,
    pub currency: String,
    #[serde(default)]
    pub delivery_days: Option<u32>,
    #[serde(default)]
    pub estimated_date: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub shipment_id: String,
    pub rate_id: String,
    pub tracking_code: Option<String>,
    pub label_url: Option<String>,
    pub carrier: Option<String>,
    pub service: Option<String>,
    pub cost: Option<f64>,
}

/// Carrier answer to a void/refund request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidOutcome {
    pub shipment_id: String,
    pub approved: bool,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parses_case_insensitively() {
        assert_eq!("XLarge".parse::<SizeCategory>(), Ok(SizeCategory::XLarge));
        assert_eq!(" small ".parse::<SizeCategory>(), Ok(SizeCategory::Small));
        assert!("huge".parse::<SizeCategory>().is_err());
    }

    #[test]
    fn fits_within_ignores_orientation() {
        let item = Dimensions::new(10.0, 2.0, 5.0);
        assert!(item.fits_within(&Dimensions::new(5.0, 10.0, 2.0)));
        assert!(item.fits_within(&Dimensions::new(3.0, 6.0, 11.0)));
        assert!(!item.fits_within(&Dimensions::new(9.0, 9.0, 9.0)));
    }

    #[test]
    fn counts_arithmetic() {
        let a = ItemCounts::new(3, 2, 1, 0);
        let b = ItemCounts::new(1, 2, 0, 0);
        assert_eq!(a.saturating_sub(&b), ItemCounts::new(2, 0, 1, 0));
        assert_eq!(a.add(&b).total_items(), 9);
        assert_eq!(
            a.present().collect::<Vec<_>>(),
            vec![SizeCategory::Small, SizeCategory::Medium, SizeCategory::Large]
        );
    }

    #[test]
    fn counts_arithmetic_does_not_wrap() {
        let full = ItemCounts::new(u32::MAX, u32::MAX, 0, 0);
        assert_eq!(full.total_items(), 2 * u64::from(u32::MAX));
        assert_eq!(
            full.add(&ItemCounts::new(1, 0, 1, 0)),
            ItemCounts::new(u32::MAX, u32::MAX, 1, 0)
        );
    }

    #[test]
    fn table_requires_every_category() {
        let missing = r#"{ "small": 1, "medium": 3, "large": 6 }"#;
        assert!(serde_json::from_str::<CategoryTable<u32>>(missing).is_err());
    }
}
