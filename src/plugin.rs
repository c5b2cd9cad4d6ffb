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

//! # Kiln Processing Source Module
//!
//! This module defines the plugin contracts of the engine and the reference
//! type that owns plugin-created processor instances.
//!
//! ## Contracts
//!
//! - [`KilnProcessingSource`]: a plugin that claims data sources and
//!   produces processor instances bound to a group of them
//! - [`KilnProcessor`]: one instance, driven by exactly one pipeline from
//!   creation through parsing to a captured result
//! - [`KilnProcessingSourceReference`]: claimed plugin metadata plus the
//!   factory; it *owns* every processor instance it creates and releases
//!   them all on (idempotent) disposal
//!
//! ## Ownership
//!
//! Processor instances are tracked by the reference that created them, never
//! by the pipeline or the session. Pipelines and results hold shared handles
//! (`Arc<tokio::sync::Mutex<..>>`); teardown visits the owned instances,
//! recording but not propagating individual release failures.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cooker::{KilnCookedDataSet, KilnCookerRegistration, KilnDataCookerPath};
use crate::datasource::{KilnAcceptanceRule, KilnCompiledRule, KilnDataSource, KilnDataSourceGroup};
use crate::errors::{KilnError, Result};
use crate::progress::{KilnCancellationToken, KilnProgress};
use crate::table::{KilnBuiltTable, KilnTableBuildOutcome, KilnTableDescriptor, KilnTableRegistration};

/// Display metadata of a claimed processing source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KilnProcessingSourceInfo {
    /// Stable identifier, unique within a session.
    pub id: String,
    pub name: String,
    pub description: String,
}

impl KilnProcessingSourceInfo {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        KilnProcessingSourceInfo {
            id: id.into(),
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Host environment handed to every processor instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KilnProcessorEnvironment {
    /// Identifier of the session the processor runs in.
    pub session_id: String,
    /// Name of the embedding application, for diagnostics.
    pub application: String,
}

impl Default for KilnProcessorEnvironment {
    fn default() -> Self {
        KilnProcessorEnvironment {
            session_id: uuid::Uuid::new_v4().to_string(),
            application: "kiln".to_string(),
        }
    }
}

/// Free-form options forwarded to processor instances.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KilnProcessorOptions {
    /// Simple key/value switches.
    pub entries: HashMap<String, String>,
    /// Arbitrary structured configuration.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub extra: Value,
}

impl KilnProcessorOptions {
    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }
}

/// Descriptive source/time information retrieved from a processor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KilnSourceInfo {
    pub first_event: Option<DateTime<Utc>>,
    pub last_event: Option<DateTime<Utc>>,
    pub event_count: u64,
}

/// Captured state of the descriptive info inside an execution result.
///
/// `Default` means the processor had nothing to report (or retrieval
/// failed, in which case the failure is recorded separately);
/// `NotAvailable` is the distinct sentinel meaning processing never
/// completed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KilnSourceInfoState {
    NotAvailable,
    Default,
    Known(KilnSourceInfo),
}

impl KilnSourceInfoState {
    /// The descriptive info as a value, substituting the defined default
    /// for both sentinels.
    pub fn value(&self) -> KilnSourceInfo {
        match self {
            KilnSourceInfoState::Known(info) => info.clone(),
            _ => KilnSourceInfo::default(),
        }
    }
}

/// One processor instance: parses a group of data sources and serves
/// plugin-owned tables.
///
/// All mutating operations take `&mut self`; instances are driven behind
/// their owning reference's shared handle.
#[async_trait]
pub trait KilnProcessor: Send + Sync + fmt::Debug {
    /// Asks the processor to include the given table in its output. Called
    /// once per requested table; failures are captured per table by the
    /// pipeline.
    fn enable_table(&mut self, table: &KilnTableDescriptor) -> Result<()>;

    /// Builds the processor's plugin-owned metadata tables.
    fn metadata_tables(&mut self) -> Result<Vec<KilnBuiltTable>>;

    /// Retrieves descriptive source/time information. `Ok(None)` means the
    /// processor has nothing to report.
    fn source_info(&mut self) -> Result<Option<KilnSourceInfo>>;

    /// Parses the bound data source group, producing cooked outputs for the
    /// activated source cookers. Invoked exactly once per instance.
    /// Cancellation is cooperative.
    async fn parse(
        &mut self,
        activated_cookers: &[KilnDataCookerPath],
        progress: Arc<dyn KilnProgress>,
        cancellation: KilnCancellationToken,
    ) -> Result<KilnCookedDataSet>;

    /// Builds one of the processor's plugin-owned tables.
    fn build_table(&mut self, table: &KilnTableDescriptor) -> Result<KilnTableBuildOutcome>;

    /// Releases resources held by the instance. Invoked by the owning
    /// reference during disposal.
    fn release(&mut self) -> Result<()>;
}

/// Shared handle to an owned processor instance.
pub type KilnProcessorHandle = Arc<tokio::sync::Mutex<Box<dyn KilnProcessor>>>;

/// A plugin that claims data sources and produces processor instances.
pub trait KilnProcessingSource: Send + Sync + fmt::Debug {
    /// Stable identifier and display metadata.
    fn info(&self) -> KilnProcessingSourceInfo;

    /// Declarative acceptance rules evaluated by the resolver before any
    /// plugin code runs.
    fn acceptance_rules(&self) -> Vec<KilnAcceptanceRule>;

    /// Cookers this plugin contributes to the session.
    fn cookers(&self) -> Vec<KilnCookerRegistration>;

    /// Tables this plugin contributes to the session.
    fn tables(&self) -> Vec<KilnTableRegistration>;

    /// Authoritative acceptance check, consulted only after at least one
    /// acceptance rule passed. Errors are treated as rejection by the
    /// resolver.
    fn supports(&self, data_source: &KilnDataSource) -> Result<bool>;

    /// Creates a processor instance bound to the given group. Returning
    /// `None` is a fatal configuration error for the requesting pipeline.
    fn create_processor(
        &self,
        group: &KilnDataSourceGroup,
        environment: &KilnProcessorEnvironment,
        options: &KilnProcessorOptions,
    ) -> Option<Box<dyn KilnProcessor>>;
}

/// A claimed plugin: metadata, compiled acceptance rules, the factory, and
/// the list of every processor instance the factory ever produced.
pub struct KilnProcessingSourceReference {
    source: Arc<dyn KilnProcessingSource>,
    info: KilnProcessingSourceInfo,
    rules: Vec<KilnCompiledRule>,
    instances: Mutex<Vec<KilnProcessorHandle>>,
    disposed: AtomicBool,
}

impl fmt::Debug for KilnProcessingSourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KilnProcessingSourceReference")
            .field("id", &self.info.id)
            .field("disposed", &self.disposed.load(Ordering::SeqCst))
            .finish()
    }
}

impl KilnProcessingSourceReference {
    /// Claims a processing source, validating its metadata and compiling its
    /// acceptance rules.
    pub fn new(source: Arc<dyn KilnProcessingSource>) -> Result<Self> {
        let info = source.info();
        if info.id.is_empty() {
            return Err(KilnError::invalid_argument(
                "processing source id must not be empty",
            ));
        }

        let mut rules = Vec::new();
        for rule in source.acceptance_rules() {
            rules.push(KilnCompiledRule::compile(&rule)?);
        }

        Ok(KilnProcessingSourceReference {
            source,
            info,
            rules,
            instances: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        })
    }

    pub fn info(&self) -> &KilnProcessingSourceInfo {
        &self.info
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Cookers declared by the underlying plugin.
    pub fn cookers(&self) -> Vec<KilnCookerRegistration> {
        self.source.cookers()
    }

    /// Tables declared by the underlying plugin.
    pub fn tables(&self) -> Vec<KilnTableRegistration> {
        self.source.tables()
    }

    /// Whether this plugin claims the data source.
    ///
    /// The declarative rules run first; when none pass, the plugin's
    /// authoritative check is never invoked. An error from the
    /// authoritative check counts as rejection and is not propagated.
    pub fn supports(&self, data_source: &KilnDataSource) -> bool {
        if !self.rules.iter().any(|rule| rule.matches(data_source)) {
            return false;
        }
        self.source.supports(data_source).unwrap_or(false)
    }

    /// Creates a processor instance for the group and registers it in the
    /// owned-instance list.
    pub fn create_processor(
        &self,
        group: &KilnDataSourceGroup,
        environment: &KilnProcessorEnvironment,
        options: &KilnProcessorOptions,
    ) -> Result<KilnProcessorHandle> {
        if self.is_disposed() {
            return Err(KilnError::invalid_operation(format!(
                "processing source '{}' has been disposed",
                self.info.id
            )));
        }

        let processor = self
            .source
            .create_processor(group, environment, options)
            .ok_or_else(|| {
                KilnError::invalid_operation(format!(
                    "processing source '{}' yielded no processor for group {}",
                    self.info.id, group
                ))
            })?;

        let handle: KilnProcessorHandle = Arc::new(tokio::sync::Mutex::new(processor));
        self.instances
            .lock()
            .expect("instance list poisoned")
            .push(handle.clone());
        Ok(handle)
    }

    /// Number of processor instances created so far.
    pub fn instance_count(&self) -> usize {
        self.instances.lock().expect("instance list poisoned").len()
    }

    /// Releases every processor instance this reference ever created.
    ///
    /// Idempotent: only the first call performs releases. Individual
    /// release failures are logged and skipped so one faulty teardown does
    /// not block the others.
    pub async fn dispose(&self) {
        if self
            .disposed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let instances = std::mem::take(
            &mut *self.instances.lock().expect("instance list poisoned"),
        );
        for handle in instances {
            let mut processor = handle.lock().await;
            if let Err(err) = processor.release() {
                log::warn!(
                    "plugin.dispose.release_failed: processor release failed, continuing - source={}, error={}",
                    self.info.id,
                    err
                );
            }
        }
        log::debug!(
            "plugin.dispose.complete: processing source reference disposed - source={}",
            self.info.id
        );
    }
}
