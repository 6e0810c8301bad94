//! Packing and rate aggregation live here. Everything in this module is pure.

pub mod aggregation;
pub mod entities;
pub mod packing;
pub mod sizing;
pub mod weight;

pub use aggregation::{
    aggregate_rates, sort_shipping_options, BoxRatesResult, ShippingOption, SortPreference,
};
pub use entities::{
    Address, CategoryTable, Dimensions, ItemCounts, Label, Parcel, Rate, ShippingBox,
    SizeCategory, UnknownCategory, VoidOutcome,
};
pub use packing::{
    BoxSelection, DimensionError, Packer, PackingFailure, PackingSolution, MAX_BOXES,
};
pub use sizing::{PackingMaterials, SizingModel, WeightStats};
pub use weight::{estimate_weight, resolve_item_weight, WeightOverrides};
