//! Catalog transformation: vendor XML extraction, product selection and pricing.
//!
//! - [`extract`]: parses a vendor document into [`ProductRecord`]s
//! - [`select`]: applies filter rules, ordering and the product cap
//! - [`PricingModel`]: derives sell price, profit and margin columns

mod extract;
mod pricing;
mod select;

pub use extract::{Extraction, extract};
pub use pricing::{PRICE_COLUMNS, PriceQuote, PricingModel};
pub use select::{Selection, SelectionRules, Selector, select};

pub use feedbuilder_shared::ProductRecord;
