//! Core domain types for the live menu ticker.
//!
//! This crate provides the types shared by every other crate:
//! - `ItemId`, `Item`, `ItemType`: catalog entries joined by id
//! - `Price`, `Money`: precision-safe price values with currency
//! - `MetadataRecord`, `Tick`: the two inputs that get merged into an `Item`
//! - `Clock`: injectable time source
//! - `format`: display formatting for prices and timestamps

pub mod clock;
pub mod error;
pub mod format;
pub mod item;
pub mod price;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, Result};
pub use format::{format_creation_date, format_last_update, format_price};
pub use item::{Item, ItemId, ItemType, MetadataRecord, Tick};
pub use price::{Money, Price};
