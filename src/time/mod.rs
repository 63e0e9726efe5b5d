//! Date ranges and acquisition timestamps for scene filtering.
pub mod error;
mod product_id;
mod range;

pub use product_id::timestamp_from_product_id;
pub use range::{DateRange, advance_months};
