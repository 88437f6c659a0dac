//! Delegated segmentation backends
//!
//! - Tract backend (pure Rust ONNX inference, `tract` feature)
//! - Mock backends for tests

#[cfg(feature = "tract")]
pub mod tract;

#[cfg(test)]
pub mod test_utils;

#[cfg(feature = "tract")]
pub use self::tract::{TractBackend, TractBackendFactory};
