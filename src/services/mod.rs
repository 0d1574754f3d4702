//! Services built on top of the ledger and blob store

pub mod selection;

pub use selection::{SelectionService, crop_to_bounds, decode_image};
