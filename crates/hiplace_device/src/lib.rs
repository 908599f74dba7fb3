//! Device model consumed by the placer.
//!
//! A [`Device`] is a read-only set of [`DeviceSite`]s grouped by [`SiteType`]
//! into columns, overlaid by a grid of [`ClockRegion`]s. The only mutable
//! state is the per-site `mapped` flag that legalizers set when they bind a
//! placement unit to a site.
//!
//! # Usage
//!
//! ```
//! use hiplace_device::{DeviceBuilder, SiteType};
//!
//! let device = DeviceBuilder::new("tiny")
//!     .column(0.0, SiteType::SliceL, 4)
//!     .column(1.0, SiteType::Bram, 4)
//!     .clock_regions(1, 2)
//!     .build()
//!     .unwrap();
//! assert_eq!(device.sites_of_type(SiteType::Bram).len(), 4);
//! ```

#![warn(missing_docs)]

pub mod builder;
pub mod device;
pub mod loader;
pub mod types;

pub use builder::DeviceBuilder;
pub use device::Device;
pub use loader::{load_device, DeviceLoadError};
pub use types::{ClockRegion, DeviceSite, SiteType};
