#![doc = include_str!("../README.md")]

mod error;

pub mod extensions;
pub mod fits;
pub mod order;
pub mod plan;
pub mod resort;
pub mod schema;
pub mod stitch;
pub mod summary;
pub mod transfer;

pub use error::{Error, Result};
pub use extensions::{DuplicateIndexRule, ExtensionPolicy};
pub use order::FileOrder;
pub use plan::{plan, plan_with_exposure, Dimensions, Frames, Input, Plan};
pub use schema::{ColumnDescriptor, ScalarKind, Schema};
pub use stitch::{StitchReport, Stitcher};

/// Name of the per-aperture catalogue table.
pub const CATALOGUE: &str = "CATALOGUE";
/// Name of the per-frame metadata table.
pub const IMAGELIST: &str = "IMAGELIST";
/// Image extension used to measure each file's dimensions.
pub const REFERENCE_IMAGE: &str = "FLUX";
/// Image extension holding the flux uncertainties.
pub const FLUX_ERROR_IMAGE: &str = "FLUXERR";
/// Per-frame exposure time column used to filter frames.
pub const EXPOSURE_COLUMN: &str = "EXPOSURE";
/// Default per-frame observation time column (MJD).
pub const DEFAULT_TIME_COLUMN: &str = "TMID";
