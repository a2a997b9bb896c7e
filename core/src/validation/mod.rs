//! Validation of untrusted request input.

pub mod request;

pub use request::{InspectionReport, RequestInspector};
