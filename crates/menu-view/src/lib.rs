//! Filtered and sorted projections of the menu store.
//!
//! `project` is a pure function of a store snapshot and the caller's
//! criteria. `ProjectionEngine` memoizes it on (snapshot version, criteria).

pub mod columns;
pub mod criteria;
pub mod error;
pub mod projection;

pub use columns::{column_index, render_row, Column, COLUMNS};
pub use criteria::{FieldFilter, FilterSortCriteria, ItemField, SortDirection};
pub use error::{ViewError, ViewResult};
pub use projection::{project, Projection, ProjectionEngine};
