//! Flattening engine - convert nested raw records into flat tables.
//!
//! Two flattening paths share this module: the strict, type-aware
//! [`StrictFlattener`] used first for every unit, and the permissive
//! all-text [`PermissiveFlattener`] the fallback controller switches
//! to when the strict path reports a structural inconsistency.

pub mod canonical;
pub mod permissive;
pub mod strict;
pub mod types;

pub use canonical::{canonicalize, canonicalize_table};
pub use permissive::PermissiveFlattener;
pub use strict::StrictFlattener;
pub use types::{FlatRow, FlatTable, ListPolicy, Scalar};
