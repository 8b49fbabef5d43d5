// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Gridscan.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::ErrorScope;

/// Top-level error type for all Gridscan operations.
#[derive(Debug, Error)]
pub enum GridscanError {
    // -- Input errors --
    #[error("input path does not match `.../w<NNN>-scans/<page>.png`: {}", path.display())]
    InputParse { path: PathBuf },

    #[error("image processing failed: {0}")]
    ImageError(String),

    #[error("template `{name}` could not be loaded from {}: {reason}", path.display())]
    TemplateLoad {
        name: String,
        path: PathBuf,
        reason: String,
    },

    // -- Pipeline errors --
    #[error("no answer cells detected: {0}")]
    EmptyDetection(String),

    #[error("scan cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, GridscanError>;

/// Decide whether an error only sinks the image being processed or the whole run.
///
/// A batch driver keeps going after `PerImage` errors and stops on `Fatal`
/// ones: without templates or a valid configuration no later image can
/// succeed either.
pub fn classify_error(err: &GridscanError) -> ErrorScope {
    match err {
        GridscanError::InputParse { .. } => ErrorScope::PerImage,
        GridscanError::ImageError(_) => ErrorScope::PerImage,
        GridscanError::EmptyDetection(_) => ErrorScope::PerImage,
        GridscanError::Serialization(_) => ErrorScope::PerImage,

        GridscanError::TemplateLoad { .. } => ErrorScope::Fatal,
        GridscanError::Config(_) => ErrorScope::Fatal,
        GridscanError::Cancelled => ErrorScope::Fatal,

        GridscanError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::PermissionDenied | std::io::ErrorKind::StorageFull => {
                ErrorScope::Fatal
            }
            _ => ErrorScope::PerImage,
        },
    }
}
