//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Kiln.
//! The Kiln project belongs to the Dunimd project team.
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

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Sink for processing progress reported by processor instances.
///
/// Progress is advisory; a processor that never reports still runs to
/// completion.
pub trait KilnProgress: Send + Sync + std::fmt::Debug {
    /// Reports progress as a percentage in `0..=100`.
    fn report(&self, percent: u8);
}

/// Progress sink that discards all reports.
#[derive(Clone, Copy, Debug, Default)]
pub struct KilnNullProgress;

impl KilnProgress for KilnNullProgress {
    fn report(&self, _percent: u8) {}
}

/// Progress sink that forwards reports to the log facade.
#[derive(Clone, Debug, Default)]
pub struct KilnLogProgress {
    /// Label included in every log line, typically the processing source id.
    pub label: String,
}

impl KilnLogProgress {
    pub fn new(label: impl Into<String>) -> Self {
        KilnLogProgress {
            label: label.into(),
        }
    }
}

impl KilnProgress for KilnLogProgress {
    fn report(&self, percent: u8) {
        log::debug!(
            "pipeline.progress: parse progress reported - source={}, percent={}",
            self.label,
            percent.min(100)
        );
    }
}

/// Cooperative cancellation signal threaded from `process()` into every
/// pipeline's parse call.
///
/// Cancellation is advisory: a processor that ignores the token simply runs
/// to completion, and the engine never force-aborts it. Clones share the
/// underlying flag.
#[derive(Clone, Debug, Default)]
pub struct KilnCancellationToken {
    inner: Arc<AtomicBool>,
}

impl KilnCancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.inner.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }
}

impl fmt::Display for KilnCancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            if self.is_cancelled() {
                "cancelled"
            } else {
                "active"
            }
        )
    }
}
