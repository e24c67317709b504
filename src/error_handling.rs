// SPDX-License-Identifier: GPL-3.0-only

//! Centralized error reporting for window-snapshot
//!
//! Capture failures are never fatal. Everything that goes wrong while
//! acquiring a snapshot ends up here and is emitted as a `tracing` event with
//! a severity, a short title naming the stage, and a free-form message.

use crate::snapshot::SourceKind;

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Nothing could be captured at all
    Error,
    /// A source failed and the next one will be tried
    Warning,
    /// State changes worth recording, such as a source being unsupported
    Info,
}

/// Universal error reporting function
pub fn report_error(severity: ErrorSeverity, title: &str, message: &str) {
    match severity {
        ErrorSeverity::Error => tracing::error!(title, "{message}"),
        ErrorSeverity::Warning => tracing::warn!(title, "{message}"),
        ErrorSeverity::Info => tracing::debug!(title, "{message}"),
    }
}

/// Report that `source` could not produce a snapshot and capture continues
/// with the next one.
pub fn report_source_failure(source: SourceKind, message: &str) {
    report_error(
        ErrorSeverity::Warning,
        "Source Fallback",
        &format!("{source} failed: {message}, trying next source..."),
    );
}

/// Report that `source` is not offered for this window. This is the normal
/// case for most applications and stays below the default log level.
pub fn report_source_unsupported(source: SourceKind, reason: &str) {
    report_error(
        ErrorSeverity::Info,
        "Source Unsupported",
        &format!("{source} not available: {reason}"),
    );
}

/// Convenience macros for common error reporting patterns
#[macro_export]
macro_rules! report_error {
    ($title:expr, $msg:expr) => {
        $crate::error_handling::report_error(
            $crate::error_handling::ErrorSeverity::Error,
            $title,
            $msg,
        )
    };
}

#[macro_export]
macro_rules! report_warning {
    ($title:expr, $msg:expr) => {
        $crate::error_handling::report_error(
            $crate::error_handling::ErrorSeverity::Warning,
            $title,
            $msg,
        )
    };
}

#[macro_export]
macro_rules! report_info {
    ($title:expr, $msg:expr) => {
        $crate::error_handling::report_error(
            $crate::error_handling::ErrorSeverity::Info,
            $title,
            $msg,
        )
    };
}
