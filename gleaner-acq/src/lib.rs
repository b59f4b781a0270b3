//! gleaner-acq library interface
//!
//! Acquisition core: location rotation, duplicate-aware image intake, label
//! synthesis and the session controller that drives an automation surface
//! and appends rows to a tabular sink.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod sink;
pub mod surface;
pub mod utils;

pub use crate::error::{AcqError, AcqResult};
