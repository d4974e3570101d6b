//! Product page fetching and HTML extraction.
//!
//! This crate provides:
//! - [`PageClient`]: browser-signature HTTP client with timeout and retry
//! - [`listing`]: related identifiers referenced by a desktop detail page
//! - [`detail`]: title / price / rating / review count from a detail page

pub mod client;
pub mod detail;
pub mod listing;

pub use client::{DeviceProfile, PageClient};
pub use detail::{DetailFields, extract_detail, parse_price};
pub use listing::extract_related_asins;
