//! Common utilities for usbip-forward
//!
//! This crate provides shared functionality for the forwarder: the shared
//! error type, tracing setup, and URB builders for tests.

pub mod error;
pub mod logging;
pub mod test_utils;

pub use error::{Error, Result};
pub use logging::setup_logging;
