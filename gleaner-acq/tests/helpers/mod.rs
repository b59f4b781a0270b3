//! Test Helper Utilities
//!
//! Shared utilities for testing gleaner-acq

#![allow(dead_code)]

pub mod image_generator;
pub mod mock_surface;

pub use image_generator::{blank_png, distinct_png, small_png};
pub use mock_surface::{MockItem, ScriptedFactory, SurfaceLog};

use gleaner_acq::models::AcquisitionParameters;
use gleaner_acq::services::{ControllerDeps, LabelSchema};
use gleaner_acq::sink::Sink;
use gleaner_acq::surface::{Credentials, SurfaceFactory};
use gleaner_common::events::EventBus;
use std::path::Path;
use std::sync::Arc;

/// Parameters tuned for fast, deterministic tests
pub fn test_params(min_images: usize, items_per_location: u64) -> AcquisitionParameters {
    AcquisitionParameters {
        min_images_per_item: min_images,
        items_per_location,
        surface_timeout_secs: 5,
        surface_retries: 0,
        sink_retries: 2,
        seed: Some(7),
        ..Default::default()
    }
}

/// Controller dependencies writing images below `root`
pub fn test_deps(
    root: &Path,
    factory: Arc<dyn SurfaceFactory>,
    sink: Arc<dyn Sink>,
) -> ControllerDeps {
    ControllerDeps {
        factory,
        sink,
        event_bus: EventBus::new(256),
        credentials: Credentials::new("tester", "secret"),
        image_dir: root.join("images"),
        label_schema: LabelSchema::standard(),
    }
}
