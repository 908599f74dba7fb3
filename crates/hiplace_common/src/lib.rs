//! Shared foundational types for the hiplace placement engine.
//!
//! Arena identifiers for cells, nets, pins, placement units and device sites,
//! planar geometry helpers, and the internal error type used to report broken
//! structural invariants.

#![warn(missing_docs)]

pub mod geometry;
pub mod ids;
pub mod result;

pub use geometry::{Point, Rect};
pub use ids::{CellId, NetId, PinId, SiteId, UnitId};
pub use result::{InternalError, PlaceResult};
