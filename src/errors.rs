//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Kiln.
//! The Kiln project belongs to the Dunimd Team.
//!
//! Licensed under the Apache License, Version 2.0 (the "License");
//! You may not use this file except in compliance with the License.
//! You may obtain a copy of the License at
//!
//!     http://www.apache.org/licenses/LICENSE-2.0
//!
//! Unless required by applicable law or agreed to in writing, software
//! distributed under the License is distributed on an "AS IS" BASIS,
//! WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//! See the License for the specific language governing permissions and
//! limitations under the License.

//! # Kiln Error Module
//!
//! This module defines the error types and utilities used throughout the Kiln
//! engine for consistent error handling and reporting.
//!
//! ## Error Handling Philosophy
//!
//! Kiln distinguishes four classes of failure:
//!
//! - **Precondition violations** (`InvalidArgument`): raised immediately at
//!   the call boundary and never caught internally
//! - **Expected-absence conditions** (`UnknownCooker`, `UnknownTable`,
//!   `UnknownProcessingSource`, `CookerNotAvailable`, `TableNotAvailable`):
//!   raised as named variants from strict APIs; the matching `try_*` APIs
//!   report them as `false`/`None` instead
//! - **Partial-failure captured state** (`Processing`): recorded inside a
//!   pipeline's execution result so the rest of the session remains usable;
//!   never raised across pipelines
//! - **Fatal construction errors** (`EngineCreate`): wrap unrecoverable
//!   session setup failures after allocated resources have been released
//!
//! ## Usage
//!
//! ```ignore
//! use kilnx::errors::{Result, KilnError};
//!
//! fn lookup(name: &str) -> Result<u32> {
//!     if name.is_empty() {
//!         return Err(KilnError::invalid_argument("name must not be empty"));
//!     }
//!     Err(KilnError::unknown_cooker(name))
//! }
//! ```

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience result type used throughout Kiln.
pub type Result<T> = std::result::Result<T, KilnError>;

/// Canonical error enumeration for the Kiln engine.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum KilnError {
    /// Errors originating from filesystem or network IO.
    #[error("io error: {0}")]
    Io(String),

    /// Precondition violations: missing or invalid arguments at an API
    /// boundary.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// A cooker path that no plugin in the session has registered.
    #[error("unknown cooker: {path}")]
    UnknownCooker { path: String },

    /// A table GUID that no plugin in the session has registered.
    #[error("unknown table: {guid}")]
    UnknownTable { guid: String },

    /// An explicitly requested processing source id that is not in the
    /// catalog.
    #[error("unknown processing source: {id}")]
    UnknownProcessingSource { id: String },

    /// A registered cooker whose dependencies cannot be satisfied in this
    /// session, or whose data was never produced.
    #[error("cooker '{path}' is not available: {reason}")]
    CookerNotAvailable { path: String, reason: String },

    /// A registered table whose dependencies cannot be satisfied in this
    /// session.
    #[error("table '{guid}' is not available: {reason}")]
    TableNotAvailable { guid: String, reason: String },

    /// An operation invoked in a state that does not permit it, such as a
    /// processor factory yielding no instance or an executor run twice.
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },

    /// `process()` called more than once on the same engine.
    #[error("the session has already been processed")]
    AlreadyProcessed,

    /// A failure raised by a processing source implementation and captured
    /// inside that pipeline's execution result.
    #[error("processing source '{source_name}' failed: {message}")]
    Processing { source_name: String, message: String },

    /// Wrapper for serde-style serialization issues.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Fatal session construction failure.
    #[error("engine creation failed: {message}")]
    EngineCreate { message: String },

    /// Catch-all variant for unexpected situations.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<io::Error> for KilnError {
    fn from(err: io::Error) -> Self {
        KilnError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for KilnError {
    fn from(err: serde_json::Error) -> Self {
        KilnError::Serde(err.to_string())
    }
}

impl From<serde_yaml::Error> for KilnError {
    fn from(err: serde_yaml::Error) -> Self {
        KilnError::Serde(err.to_string())
    }
}

impl KilnError {
    /// Helper to construct precondition-violation errors.
    pub fn invalid_argument<T: Into<String>>(message: T) -> Self {
        KilnError::InvalidArgument {
            message: message.into(),
        }
    }

    /// Helper to construct unknown-cooker errors.
    pub fn unknown_cooker(path: impl ToString) -> Self {
        KilnError::UnknownCooker {
            path: path.to_string(),
        }
    }

    /// Helper to construct unknown-table errors.
    pub fn unknown_table(guid: impl ToString) -> Self {
        KilnError::UnknownTable {
            guid: guid.to_string(),
        }
    }

    /// Helper to construct unknown-processing-source errors.
    pub fn unknown_processing_source(id: impl Into<String>) -> Self {
        KilnError::UnknownProcessingSource { id: id.into() }
    }

    /// Helper to construct cooker-not-available errors.
    pub fn cooker_not_available(path: impl ToString, reason: impl Into<String>) -> Self {
        KilnError::CookerNotAvailable {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    /// Helper to construct table-not-available errors.
    pub fn table_not_available(guid: impl ToString, reason: impl Into<String>) -> Self {
        KilnError::TableNotAvailable {
            guid: guid.to_string(),
            reason: reason.into(),
        }
    }

    /// Helper to construct invalid-operation errors.
    pub fn invalid_operation<T: Into<String>>(message: T) -> Self {
        KilnError::InvalidOperation {
            message: message.into(),
        }
    }

    /// Helper to construct captured processing failures.
    pub fn processing(source: impl Into<String>, message: impl Into<String>) -> Self {
        KilnError::Processing {
            source_name: source.into(),
            message: message.into(),
        }
    }

    /// Helper to construct fatal construction errors.
    pub fn engine_create<T: Into<String>>(message: T) -> Self {
        KilnError::EngineCreate {
            message: message.into(),
        }
    }

    /// Helper to construct internal errors.
    pub fn internal<T: Into<String>>(message: T) -> Self {
        KilnError::Internal(message.into())
    }
}
