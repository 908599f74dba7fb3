//! Opaque ID newtypes for placement entities.
//!
//! Every entity of the placement database lives in a `Vec` owned by the design,
//! the device or the placement model, and is referenced everywhere else by one
//! of these `u32` indices.

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Creates an ID from a raw `u32` index.
            pub fn from_raw(index: u32) -> Self {
                Self(index)
            }

            /// Creates an ID from a position in the owning arena.
            pub fn from_index(index: usize) -> Self {
                Self(index as u32)
            }

            /// Returns the raw `u32` index.
            pub fn as_raw(self) -> u32 {
                self.0
            }

            /// Returns the position of this entity in its owning arena.
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// A cell of the technology-mapped design.
    CellId
);

define_id!(
    /// A net of the design.
    NetId
);

define_id!(
    /// A pin of a design cell.
    PinId
);

define_id!(
    /// A placement unit: one unpacked cell or one rigid macro.
    UnitId
);

define_id!(
    /// A physical site of the device.
    SiteId
);
