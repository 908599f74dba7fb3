//! Placement model for the hiplace global placer.
//!
//! A [`Design`] is the technology-mapped netlist as read from disk. Building a
//! [`PlacementModel`] over a [`Device`](hiplace_device::Device) groups its
//! cells into [`PlacementUnit`]s, expresses nets in unit terms and lays a
//! [`BinGrid`] per [`ResourceFamily`] over the device. Every placement phase
//! reads and writes the model and nothing else.

#![warn(missing_docs)]

pub mod bins;
pub mod design;
pub mod family;
pub mod legal;
pub mod loader;
pub mod model;
pub mod net;
pub mod sites;
pub mod unit;

pub use bins::{Bin, BinGrid};
pub use design::{Cell, CellType, Design, DesignError, MacroKind, MacroSpec, Net, Pin};
pub use family::ResourceFamily;
pub use legal::LegalPlan;
pub use loader::{load_design, load_user_clusters, ModelLoadError};
pub use model::{FamilyUsage, ModelSettings, PlacementModel};
pub use net::{NetPin, PlacementNet};
pub use sites::SiteIndex;
pub use unit::{PlacementUnit, UnitKind, UnitMember};
