//! Error types for the snapcam core

use thiserror_no_std::Error;

/// Failures of the scarce auxiliary heap.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    #[error("heap not initialized")]
    NotInitialized,
    #[error("out of memory: requested {requested} bytes, {available} bytes free")]
    OutOfMemory { requested: u32, available: u32 },
    #[error("zero-size allocation")]
    ZeroSize,
    #[error("heap region cannot be claimed")]
    RegionUnavailable,
}

/// Failures of the single-slot photo store.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoError {
    #[error("photo data is empty")]
    EmptyInput,
    #[error("photo data is {actual} bytes, geometry needs {expected}")]
    SizeMismatch { expected: u32, actual: u32 },
    #[error("photo allocation failed: {0}")]
    AllocationFailed(#[from] HeapError),
    #[error("no photo stored")]
    NoPhoto,
}

/// Failures of the camera session lifecycle.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    #[error("camera device not found")]
    DeviceNotFound,
    #[error("camera init failed")]
    InitFailed,
    #[error("camera open failed")]
    OpenFailed,
    #[error("camera start failed")]
    StartFailed,
    #[error("no camera frame available")]
    NoFrameAvailable,
}

/// Failures of the photo transcript export.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportError {
    #[error("no photo to export")]
    NoPhoto,
    #[error("output channel write failed")]
    Channel,
}

impl From<core::fmt::Error> for ExportError {
    fn from(_: core::fmt::Error) -> Self {
        Self::Channel
    }
}

/// Umbrella error for controller operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppError {
    #[error("photo: {0}")]
    Photo(#[from] PhotoError),
    #[error("camera: {0}")]
    Session(#[from] SessionError),
    #[error("export: {0}")]
    Export(#[from] ExportError),
}
