//! Data models for acquisition runs

pub mod item;
pub mod label;
pub mod parameters;
pub mod session;

pub use item::{ImageReference, ItemRecord, ItemStatus};
pub use label::{
    AttributeRange, CategoricalLabel, CategoryDistribution, CategoryEntry, LabelRecord,
    ScalarLabel, ValidationError,
};
pub use parameters::{AcquisitionParameters, DedupScope, IntakeSettings, RotationStrategy};
pub use session::{
    AcquisitionSession, AcquisitionState, LocationSummary, SessionError, SessionSnapshot,
    StateTransition,
};
