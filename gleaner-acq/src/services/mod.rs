//! Acquisition services

pub mod acquisition_service;
pub mod fingerprint;
pub mod image_fetcher;
pub mod image_intake;
pub mod label_synthesizer;
pub mod location_rotator;
pub mod naming;
pub mod session_controller;

pub use acquisition_service::{AcquisitionService, ServiceStats};
pub use fingerprint::Fingerprint;
pub use image_fetcher::{FetchError, ImageFetcher};
pub use image_intake::{ImageIntake, IntakeError, IntakeOutcome, IntakeStats};
pub use label_synthesizer::{LabelContext, LabelSchema, LabelSynthesizer};
pub use location_rotator::{LocationRotator, LocationStats};
pub use session_controller::{ControllerDeps, SessionController};
