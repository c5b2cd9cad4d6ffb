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

//! # Kiln Execution Pipeline
//!
//! One executor drives one processor instance from creation through parsing
//! to a captured, immutable result:
//!
//! ```text
//! Created -> Initialized -> Executing -> { Completed, Faulted }
//! ```
//!
//! Failures inside a run are isolated, not fail-fast: every requested table
//! is attempted regardless of earlier enable failures, a metadata-build
//! failure aborts only that step, and a parse fault is captured in the
//! result instead of propagating. The only errors `initialize`/`execute`
//! raise are state-machine misuse and fatal per-pipeline configuration
//! errors (a factory that yields no processor).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::cooker::{KilnCookedDataSet, KilnDataCookerPath};
use crate::datasource::KilnDataSourceGroup;
use crate::errors::{KilnError, Result};
use crate::plugin::{
    KilnProcessingSourceReference, KilnProcessorEnvironment, KilnProcessorHandle,
    KilnProcessorOptions, KilnSourceInfoState,
};
use crate::progress::{KilnCancellationToken, KilnProgress};
use crate::table::{KilnBuiltTable, KilnTableDescriptor};

/// Immutable per-pipeline input bundle. Lifetime = one pipeline run.
#[derive(Clone)]
pub struct KilnExecutionContext {
    pub progress: Arc<dyn KilnProgress>,
    pub reference: Arc<KilnProcessingSourceReference>,
    pub group: KilnDataSourceGroup,
    /// Tables requested enabled at initialization time.
    pub enabled_tables: Vec<KilnTableDescriptor>,
    pub environment: KilnProcessorEnvironment,
    pub options: KilnProcessorOptions,
}

impl fmt::Debug for KilnExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KilnExecutionContext")
            .field("source", &self.reference.id())
            .field("group", &self.group)
            .field("enabled_tables", &self.enabled_tables.len())
            .finish()
    }
}

impl KilnExecutionContext {
    pub fn new(
        progress: Arc<dyn KilnProgress>,
        reference: Arc<KilnProcessingSourceReference>,
        group: KilnDataSourceGroup,
        enabled_tables: Vec<KilnTableDescriptor>,
        environment: KilnProcessorEnvironment,
        options: KilnProcessorOptions,
    ) -> Self {
        KilnExecutionContext {
            progress,
            reference,
            group,
            enabled_tables,
            environment,
            options,
        }
    }
}

/// Lifecycle state of an executor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KilnExecutorState {
    Created,
    Initialized,
    Executing,
    Completed,
    Faulted,
}

/// Immutable per-pipeline output.
///
/// Partial failures are recorded here, never raised, so the rest of this
/// pipeline's output and every other pipeline's output remain usable.
#[derive(Debug)]
pub struct KilnExecutionResult {
    /// Id of the processing source that ran this pipeline.
    pub source_id: String,
    pub group: KilnDataSourceGroup,
    /// Every table requested enabled on this pipeline.
    pub requested_tables: Vec<KilnTableDescriptor>,
    /// Per-table enable failures, keyed by table GUID.
    pub enable_failures: HashMap<Uuid, KilnError>,
    /// Plugin-owned metadata tables built before parsing.
    pub metadata_tables: Vec<KilnBuiltTable>,
    pub metadata_failure: Option<KilnError>,
    /// Descriptive source/time info. `Default` when the processor had none
    /// (or retrieval failed); `NotAvailable` when processing never
    /// completed.
    pub source_info: KilnSourceInfoState,
    pub source_info_failure: Option<KilnError>,
    /// True when the parse operation raised.
    pub faulted: bool,
    pub fault: Option<KilnError>,
    /// Cooked outputs of the activated source cookers.
    pub cooked: KilnCookedDataSet,
    /// The live processor instance, kept for later table building. Owned by
    /// the reference that created it.
    pub processor: KilnProcessorHandle,
}

/// Drives one processor instance through the pipeline state machine.
#[derive(Debug)]
pub struct KilnExecutor {
    state: KilnExecutorState,
    context: Option<KilnExecutionContext>,
    processor: Option<KilnProcessorHandle>,
    requested_tables: Vec<KilnTableDescriptor>,
    enable_failures: HashMap<Uuid, KilnError>,
}

impl Default for KilnExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl KilnExecutor {
    pub fn new() -> Self {
        KilnExecutor {
            state: KilnExecutorState::Created,
            context: None,
            processor: None,
            requested_tables: Vec::new(),
            enable_failures: HashMap::new(),
        }
    }

    pub fn state(&self) -> KilnExecutorState {
        self.state
    }

    /// Id of the bound processing source, once initialized.
    pub fn source_id(&self) -> Option<&str> {
        self.context.as_ref().map(|ctx| ctx.reference.id())
    }

    /// Creates the processor instance and enables the context's requested
    /// tables.
    ///
    /// A factory that yields no instance is a fatal configuration error for
    /// this pipeline only. Table enable failures are captured per table and
    /// never stop the loop.
    pub async fn initialize(&mut self, context: KilnExecutionContext) -> Result<()> {
        if self.state != KilnExecutorState::Created {
            return Err(KilnError::invalid_operation(format!(
                "initialize is only valid in the Created state, not {:?}",
                self.state
            )));
        }
        if context.reference.is_disposed() {
            return Err(KilnError::invalid_argument(
                "execution context references a disposed processing source",
            ));
        }

        let handle = match context.reference.create_processor(
            &context.group,
            &context.environment,
            &context.options,
        ) {
            Ok(handle) => handle,
            Err(err) => {
                self.state = KilnExecutorState::Faulted;
                return Err(err);
            }
        };

        let tables = context.enabled_tables.clone();
        self.enable_on(&handle, &tables, context.reference.id()).await;

        self.processor = Some(handle);
        self.context = Some(context);
        self.state = KilnExecutorState::Initialized;
        Ok(())
    }

    /// Enables additional tables after initialization, through the same
    /// failure-isolated loop.
    pub async fn enable_tables(&mut self, tables: &[KilnTableDescriptor]) -> Result<()> {
        if self.state != KilnExecutorState::Initialized {
            return Err(KilnError::invalid_operation(format!(
                "tables can only be enabled on an initialized pipeline, not {:?}",
                self.state
            )));
        }
        let handle = self.processor.clone().expect("initialized without processor");
        let source_id = self
            .context
            .as_ref()
            .map(|ctx| ctx.reference.id().to_string())
            .unwrap_or_default();
        self.enable_on(&handle, tables, &source_id).await;
        Ok(())
    }

    async fn enable_on(
        &mut self,
        handle: &KilnProcessorHandle,
        tables: &[KilnTableDescriptor],
        source_id: &str,
    ) {
        let mut processor = handle.lock().await;
        for table in tables {
            self.requested_tables.push(table.clone());
            if let Err(err) = processor.enable_table(table) {
                log::debug!(
                    "pipeline.enable_table.failed: table enable recorded as failure - source={}, table={}, error={}",
                    source_id,
                    table.guid,
                    err
                );
                self.enable_failures.insert(table.guid, err);
            }
        }
    }

    /// Runs the pipeline once and captures its result.
    ///
    /// Builds metadata tables, retrieves descriptive info, then invokes the
    /// parse operation exactly once with the activated source cookers,
    /// progress, and the cooperative cancellation token. A parse fault sets
    /// the fault flag and the `NotAvailable` info sentinel; it is captured,
    /// not raised.
    pub async fn execute(
        &mut self,
        activated_cookers: Vec<KilnDataCookerPath>,
        cancellation: KilnCancellationToken,
    ) -> Result<KilnExecutionResult> {
        if self.state != KilnExecutorState::Initialized {
            return Err(KilnError::invalid_operation(format!(
                "execute is only valid in the Initialized state, not {:?}",
                self.state
            )));
        }
        self.state = KilnExecutorState::Executing;

        let context = self.context.take().expect("initialized without context");
        let handle = self.processor.clone().expect("initialized without processor");
        let source_id = context.reference.id().to_string();

        let mut processor = handle.lock().await;

        let (metadata_tables, metadata_failure) = match processor.metadata_tables() {
            Ok(tables) => (tables, None),
            Err(err) => {
                log::debug!(
                    "pipeline.metadata.failed: metadata table build recorded as failure - source={}, error={}",
                    source_id,
                    err
                );
                (Vec::new(), Some(err))
            }
        };

        let (mut source_info, source_info_failure) = match processor.source_info() {
            Ok(Some(info)) => (KilnSourceInfoState::Known(info), None),
            Ok(None) => (KilnSourceInfoState::Default, None),
            Err(err) => (KilnSourceInfoState::Default, Some(err)),
        };

        let mut faulted = false;
        let mut fault = None;
        let cooked = match processor
            .parse(&activated_cookers, context.progress.clone(), cancellation)
            .await
        {
            Ok(cooked) => cooked,
            Err(err) => {
                faulted = true;
                fault = Some(err);
                source_info = KilnSourceInfoState::NotAvailable;
                KilnCookedDataSet::new()
            }
        };
        drop(processor);

        self.state = if faulted {
            KilnExecutorState::Faulted
        } else {
            KilnExecutorState::Completed
        };

        Ok(KilnExecutionResult {
            source_id,
            group: context.group,
            requested_tables: std::mem::take(&mut self.requested_tables),
            enable_failures: std::mem::take(&mut self.enable_failures),
            metadata_tables,
            metadata_failure,
            source_info,
            source_info_failure,
            faulted,
            fault,
            cooked,
            processor: handle,
        })
    }
}
