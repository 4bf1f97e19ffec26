// SPDX-License-Identifier: GPL-3.0-only

//! Error types for capture and encoding

use thiserror::Error;

/// Errors surfaced by the encoding session
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Invalid configuration rejected before or during negotiation
    #[error("configuration error: {0}")]
    Config(String),
    /// Format/resolution negotiation with the hardware transform failed
    #[error("negotiation failed: {0}")]
    Negotiation(String),
    /// The session is not started (or already active when starting)
    #[error("invalid session state: {0}")]
    SessionState(&'static str),
    /// Hardware transform or GPU failure; the caller should stop the session
    #[error(transparent)]
    Transform(#[from] TransformError),
    /// GPU conversion path failure
    #[error("GPU pipeline error: {0}")]
    Gpu(String),
    /// Input frame geometry or format inconsistent with the session
    #[error("invalid input frame: {0}")]
    InvalidInput(String),
}

/// Errors reported by a transform implementation
#[derive(Debug, Error)]
pub enum TransformError {
    /// The requested media type is not supported by this transform
    #[error("unsupported media type: {0}")]
    Unsupported(String),
    /// Transform construction failed (missing element, platform service down)
    #[error("failed to create transform: {0}")]
    Create(String),
    /// Processing failure while pushing or pulling
    #[error("transform processing failed: {0}")]
    Processing(String),
}

/// Errors from the capture boundary (device enumeration, start/stop/read)
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no device found: {0}")]
    NoDevice(String),
    #[error("failed to build capture pipeline: {0}")]
    Pipeline(String),
    #[error("capture backend error: {0}")]
    Backend(String),
}
