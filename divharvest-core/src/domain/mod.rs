//! Domain types: entities, assembled records, dividend history.

pub mod dividend;
pub mod entity;
pub mod record;

pub use dividend::{aggregate_by_year, DividendHistoryEntry, DividendPayment};
pub use entity::{Entity, EntityState};
pub use record::{fields, EntityRecord, MissingField, RecordBuilder};

/// Symbol type alias
pub type Symbol = String;
