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

//! # Kiln Session Orchestrator
//!
//! The engine composes the resolver, the extension repository, and the
//! execution pipelines into one session:
//!
//! 1. free inputs are matched to plugins, explicit bindings are merged in
//!    (never deduplicated against resolver output),
//! 2. one pipeline is created and initialized per (plugin, input-group)
//!    pairing; a failing pairing is logged and dropped, not fatal,
//! 3. callers enable cookers and tables against the session snapshot,
//! 4. `process()` runs every pipeline to completion regardless of
//!    individual faults and returns a single aggregate, queryable result.
//!
//! Source cookers are registered into the graph only when their declaring
//! plugin received at least one pipeline, so availability classification
//! reflects what this session can actually produce; composite cookers and
//! extension tables are registered unconditionally and resolve against that
//! session-wide picture.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use uuid::Uuid;

use crate::catalog::KilnPluginCatalog;
use crate::cooker::{KilnCookedDataSet, KilnCookerRegistration, KilnDataCookerPath};
use crate::datasource::{KilnDataSource, KilnDataSourceGroup};
use crate::errors::{KilnError, Result};
use crate::executor::{KilnExecutionContext, KilnExecutionResult, KilnExecutor};
use crate::plugin::{
    KilnProcessingSourceReference, KilnProcessorEnvironment, KilnProcessorOptions,
};
use crate::progress::{KilnCancellationToken, KilnNullProgress, KilnProgress};
use crate::repository::{KilnAvailability, KilnExtensionRepository};
use crate::resolver;
use crate::table::{KilnTableBuildOutcome, KilnTableDescriptor, KilnTableRegistration};

/// A caller-supplied (plugin, input-group) pairing that bypasses the
/// resolver.
#[derive(Clone, Debug)]
pub struct KilnExplicitBinding {
    pub source_id: String,
    pub group: KilnDataSourceGroup,
}

/// Everything needed to create a session.
#[derive(Clone)]
pub struct KilnEngineCreateInfo {
    pub catalog: Arc<dyn KilnPluginCatalog>,
    /// Free inputs, matched by the resolver.
    pub data_sources: Vec<KilnDataSource>,
    /// Explicit pairings, merged in addition to resolver output.
    pub bindings: Vec<KilnExplicitBinding>,
    pub environment: KilnProcessorEnvironment,
    pub options: KilnProcessorOptions,
    pub progress: Arc<dyn KilnProgress>,
}

impl KilnEngineCreateInfo {
    pub fn new(catalog: Arc<dyn KilnPluginCatalog>) -> Self {
        KilnEngineCreateInfo {
            catalog,
            data_sources: Vec::new(),
            bindings: Vec::new(),
            environment: KilnProcessorEnvironment::default(),
            options: KilnProcessorOptions::default(),
            progress: Arc::new(KilnNullProgress),
        }
    }

    pub fn with_data_source(mut self, data_source: KilnDataSource) -> Self {
        self.data_sources.push(data_source);
        self
    }

    pub fn with_binding(mut self, source_id: impl Into<String>, group: KilnDataSourceGroup) -> Self {
        self.bindings.push(KilnExplicitBinding {
            source_id: source_id.into(),
            group,
        });
        self
    }

    pub fn with_options(mut self, options: KilnProcessorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_environment(mut self, environment: KilnProcessorEnvironment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn KilnProgress>) -> Self {
        self.progress = progress;
        self
    }
}

/// Where a table in the session snapshot comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KilnTableOrigin {
    /// Resolved through the extension repository's graph.
    Graph,
    /// Built directly by the declaring plugin's processor.
    Plugin { source_id: String },
}

#[derive(Clone, Debug)]
struct TableCatalogEntry {
    descriptor: KilnTableDescriptor,
    origin: KilnTableOrigin,
}

/// One session: matches inputs to plugins, runs every pipeline once, and
/// exposes a unified query/build-table surface.
#[derive(Debug)]
pub struct KilnEngine {
    references: Vec<Arc<KilnProcessingSourceReference>>,
    executors: Vec<KilnExecutor>,
    executor_sources: Vec<String>,
    repository: Arc<KilnExtensionRepository>,
    tables: HashMap<Uuid, TableCatalogEntry>,
    parsers_by_source: HashMap<String, HashSet<String>>,
    enabled_tables: HashSet<Uuid>,
    enabled_cookers: HashSet<KilnDataCookerPath>,
    environment: KilnProcessorEnvironment,
    options: KilnProcessorOptions,
    progress: Arc<dyn KilnProgress>,
    processed: bool,
}

impl KilnEngine {
    /// Creates a session: claims plugins, resolves free inputs, merges
    /// explicit bindings, builds the dependency graph, and initializes one
    /// pipeline per pairing.
    ///
    /// A pairing whose initialization fails is logged and dropped. An
    /// unknown explicitly-bound source id and duplicate cooker/table
    /// registrations are fatal; resources already claimed are released
    /// before the error propagates.
    pub async fn create(info: KilnEngineCreateInfo) -> Result<Self> {
        let mut references: Vec<Arc<KilnProcessingSourceReference>> = Vec::new();
        let mut reference_index: HashMap<String, usize> = HashMap::new();

        for source in info.catalog.processing_sources() {
            let reference = match KilnProcessingSourceReference::new(source) {
                Ok(reference) => Arc::new(reference),
                Err(err) => {
                    Self::dispose_all(&references).await;
                    return Err(KilnError::engine_create(format!(
                        "failed to claim processing source: {}",
                        err
                    )));
                }
            };
            if reference_index.contains_key(reference.id()) {
                let id = reference.id().to_string();
                Self::dispose_all(&references).await;
                return Err(KilnError::engine_create(format!(
                    "duplicate processing source id '{}'",
                    id
                )));
            }
            reference_index.insert(reference.id().to_string(), references.len());
            references.push(reference);
        }

        // pairing construction: resolver output first, explicit bindings
        // appended verbatim (no dedup)
        let assignments = resolver::assign(&info.data_sources, &references);
        let mut pairings: Vec<(usize, KilnDataSourceGroup)> = Vec::new();
        for (index, reference) in references.iter().enumerate() {
            if let Some(assigned) = assignments.get(reference.id()) {
                if !assigned.is_empty() {
                    pairings.push((index, KilnDataSourceGroup::new(assigned.clone())));
                }
            }
        }
        for binding in &info.bindings {
            match reference_index.get(&binding.source_id) {
                Some(index) => pairings.push((*index, binding.group.clone())),
                None => {
                    let id = binding.source_id.clone();
                    Self::dispose_all(&references).await;
                    return Err(KilnError::unknown_processing_source(id));
                }
            }
        }

        let sources_with_pipelines: HashSet<usize> =
            pairings.iter().map(|(index, _)| *index).collect();

        // dependency graph: source cookers only from plugins that will
        // actually run, composites and extension tables from every plugin
        let mut repository = KilnExtensionRepository::new();
        let mut tables: HashMap<Uuid, TableCatalogEntry> = HashMap::new();
        let mut parsers_by_source: HashMap<String, HashSet<String>> = HashMap::new();

        for (index, reference) in references.iter().enumerate() {
            for registration in reference.cookers() {
                match &registration {
                    KilnCookerRegistration::Source(descriptor) => {
                        if let Some(parser) = descriptor.path.parser_id() {
                            parsers_by_source
                                .entry(reference.id().to_string())
                                .or_default()
                                .insert(parser.to_string());
                        }
                        if !sources_with_pipelines.contains(&index) {
                            continue;
                        }
                    }
                    KilnCookerRegistration::Composite { .. } => {}
                }
                if let Err(err) = repository.register_cooker(registration) {
                    Self::dispose_all(&references).await;
                    return Err(KilnError::engine_create(format!(
                        "cooker registration from '{}' failed: {}",
                        reference.id(),
                        err
                    )));
                }
            }

            for registration in reference.tables() {
                let guid = registration.guid();
                if tables.contains_key(&guid) || repository.is_extension_table(&guid) {
                    let id = reference.id().to_string();
                    Self::dispose_all(&references).await;
                    return Err(KilnError::engine_create(format!(
                        "table '{}' from '{}' is already registered",
                        guid, id
                    )));
                }
                match registration {
                    KilnTableRegistration::Extension { descriptor, build } => {
                        if let Err(err) = repository.register_table(descriptor, build) {
                            Self::dispose_all(&references).await;
                            return Err(KilnError::engine_create(format!(
                                "table registration from '{}' failed: {}",
                                reference.id(),
                                err
                            )));
                        }
                    }
                    KilnTableRegistration::Plugin { descriptor } => {
                        tables.insert(
                            guid,
                            TableCatalogEntry {
                                descriptor,
                                origin: KilnTableOrigin::Plugin {
                                    source_id: reference.id().to_string(),
                                },
                            },
                        );
                    }
                }
            }
        }

        repository.resolve();
        for descriptor in repository.table_descriptors() {
            tables.insert(
                descriptor.guid,
                TableCatalogEntry {
                    descriptor: descriptor.clone(),
                    origin: KilnTableOrigin::Graph,
                },
            );
        }

        // one pipeline per pairing; failures drop the pairing only
        let mut executors = Vec::new();
        let mut executor_sources = Vec::new();
        for (index, group) in pairings {
            let reference = references[index].clone();
            let context = KilnExecutionContext::new(
                info.progress.clone(),
                reference.clone(),
                group.clone(),
                Vec::new(),
                info.environment.clone(),
                info.options.clone(),
            );
            let mut executor = KilnExecutor::new();
            match executor.initialize(context).await {
                Ok(()) => {
                    log::debug!(
                        "engine.pairing.ready: pipeline initialized - source={}, group={}",
                        reference.id(),
                        group
                    );
                    executor_sources.push(reference.id().to_string());
                    executors.push(executor);
                }
                Err(err) => {
                    log::warn!(
                        "engine.pairing.init_failed: pairing dropped - source={}, group={}, error={}",
                        reference.id(),
                        group,
                        err
                    );
                }
            }
        }

        log::info!(
            "engine.create: session constructed - sources={}, pipelines={}, tables={}",
            references.len(),
            executors.len(),
            tables.len()
        );

        Ok(KilnEngine {
            references,
            executors,
            executor_sources,
            repository: Arc::new(repository),
            tables,
            parsers_by_source,
            enabled_tables: HashSet::new(),
            enabled_cookers: HashSet::new(),
            environment: info.environment,
            options: info.options,
            progress: info.progress,
            processed: false,
        })
    }

    async fn dispose_all(references: &[Arc<KilnProcessingSourceReference>]) {
        for reference in references {
            reference.dispose().await;
        }
    }

    /// Descriptors of every table known to the session, graph-backed and
    /// plugin-owned alike.
    pub fn available_tables(&self) -> Vec<&KilnTableDescriptor> {
        self.tables.values().map(|entry| &entry.descriptor).collect()
    }

    pub fn table_descriptor(&self, guid: &Uuid) -> Option<&KilnTableDescriptor> {
        self.tables.get(guid).map(|entry| &entry.descriptor)
    }

    /// Number of pipelines this session will run.
    pub fn pipeline_count(&self) -> usize {
        self.executors.len()
    }

    pub fn repository(&self) -> &KilnExtensionRepository {
        &self.repository
    }

    /// Enables a cooker for this session. Strict: unknown paths and
    /// unavailable cookers raise.
    pub fn enable_cooker(&mut self, path: &KilnDataCookerPath) -> Result<()> {
        if self.processed {
            return Err(KilnError::invalid_operation(
                "cookers cannot be enabled after the session has been processed",
            ));
        }
        match self.repository.cooker_availability(path) {
            None => Err(KilnError::unknown_cooker(path)),
            Some(KilnAvailability::Available) => {
                self.enabled_cookers.insert(path.clone());
                Ok(())
            }
            Some(availability) => Err(KilnError::cooker_not_available(
                path,
                format!("classified {:?} in this session", availability),
            )),
        }
    }

    /// Non-raising variant of [`enable_cooker`](Self::enable_cooker).
    pub fn try_enable_cooker(&mut self, path: &KilnDataCookerPath) -> bool {
        self.enable_cooker(path).is_ok()
    }

    /// Enables a table for this session by GUID. Strict: unknown GUIDs and
    /// unavailable graph-backed tables raise.
    pub fn enable_table(&mut self, guid: &Uuid) -> Result<()> {
        if self.processed {
            return Err(KilnError::invalid_operation(
                "tables cannot be enabled after the session has been processed",
            ));
        }
        let entry = self
            .tables
            .get(guid)
            .ok_or_else(|| KilnError::unknown_table(guid))?;
        if entry.origin == KilnTableOrigin::Graph {
            match self.repository.table_availability(guid) {
                Some(KilnAvailability::Available) => {}
                Some(availability) => {
                    return Err(KilnError::table_not_available(
                        guid,
                        format!("classified {:?} in this session", availability),
                    ));
                }
                None => return Err(KilnError::unknown_table(guid)),
            }
        }
        self.enabled_tables.insert(*guid);
        Ok(())
    }

    /// Non-raising variant of [`enable_table`](Self::enable_table).
    pub fn try_enable_table(&mut self, guid: &Uuid) -> bool {
        self.enable_table(guid).is_ok()
    }

    /// Runs every pipeline to completion and aggregates their results.
    ///
    /// Single-use: a second call raises `AlreadyProcessed`. Individual
    /// pipeline faults are captured in their results and logged; they never
    /// abort the session.
    pub async fn process(
        &mut self,
        cancellation: KilnCancellationToken,
    ) -> Result<KilnRuntimeResults> {
        if self.processed {
            return Err(KilnError::AlreadyProcessed);
        }
        self.processed = true;

        // partition enabled tables into graph-backed and plugin-owned
        let mut graph_tables: Vec<Uuid> = Vec::new();
        let mut plugin_tables_by_source: HashMap<String, Vec<KilnTableDescriptor>> =
            HashMap::new();
        for guid in &self.enabled_tables {
            let entry = self.tables.get(guid).expect("enabled table disappeared");
            match &entry.origin {
                KilnTableOrigin::Graph => graph_tables.push(*guid),
                KilnTableOrigin::Plugin { source_id } => plugin_tables_by_source
                    .entry(source_id.clone())
                    .or_default()
                    .push(entry.descriptor.clone()),
            }
        }

        for (index, executor) in self.executors.iter_mut().enumerate() {
            if let Some(tables) = plugin_tables_by_source.get(&self.executor_sources[index]) {
                if let Err(err) = executor.enable_tables(tables).await {
                    log::warn!(
                        "engine.enable_tables.failed: late table enabling skipped - source={}, error={}",
                        self.executor_sources[index],
                        err
                    );
                }
            }
        }

        // session-wide activation set: enabled cookers plus everything the
        // enabled graph-backed tables transitively require
        let mut needed: HashSet<KilnDataCookerPath> = HashSet::new();
        for path in &self.enabled_cookers {
            if path.is_source() {
                needed.insert(path.clone());
            }
            needed.extend(self.repository.required_source_cookers(path)?);
        }
        for guid in &graph_tables {
            needed.extend(self.repository.required_source_cookers_of_table(guid)?);
        }

        let total = self.executors.len();
        let mut results: Vec<KilnExecutionResult> = Vec::new();
        for (index, executor) in self.executors.iter_mut().enumerate() {
            let source_id = self.executor_sources[index].clone();
            let parsers = self.parsers_by_source.get(&source_id);
            let mut activation: Vec<KilnDataCookerPath> = needed
                .iter()
                .filter(|path| {
                    path.parser_id()
                        .map(|parser| {
                            parsers.map(|set| set.contains(parser)).unwrap_or(false)
                        })
                        .unwrap_or(false)
                })
                .cloned()
                .collect();
            activation.sort();

            match executor.execute(activation, cancellation.clone()).await {
                Ok(result) => {
                    if result.faulted {
                        log::warn!(
                            "engine.pipeline.faulted: pipeline fault captured in result - source={}, group={}",
                            source_id,
                            result.group
                        );
                    }
                    results.push(result);
                }
                Err(err) => {
                    log::error!(
                        "engine.pipeline.failed: pipeline did not produce a result - source={}, error={}",
                        source_id,
                        err
                    );
                }
            }
            self.progress
                .report((((index + 1) * 100) / total.max(1)) as u8);
        }

        let mut source_cooker_index: HashMap<KilnDataCookerPath, usize> = HashMap::new();
        for (index, result) in results.iter().enumerate() {
            for path in result.cooked.keys() {
                source_cooker_index.entry(path.clone()).or_insert(index);
            }
        }

        let mut plugin_table_pipeline: HashMap<Uuid, usize> = HashMap::new();
        for (guid, entry) in &self.tables {
            if let KilnTableOrigin::Plugin { source_id } = &entry.origin {
                if let Some(index) = results.iter().position(|r| &r.source_id == source_id) {
                    plugin_table_pipeline.insert(*guid, index);
                }
            }
        }

        log::info!(
            "engine.process.complete: session processed - pipelines={}, faulted={}",
            results.len(),
            results.iter().filter(|r| r.faulted).count()
        );

        Ok(KilnRuntimeResults {
            results,
            repository: self.repository.clone(),
            tables: self.tables.clone(),
            source_cooker_index,
            plugin_table_pipeline,
            composite_cache: Mutex::new(HashMap::new()),
        })
    }

    /// Releases every processor instance created during this session by
    /// disposing the claimed references. Idempotent.
    pub async fn shutdown(&mut self) {
        Self::dispose_all(&self.references).await;
    }

    /// Environment handed to every processor of this session.
    pub fn environment(&self) -> &KilnProcessorEnvironment {
        &self.environment
    }

    pub fn options(&self) -> &KilnProcessorOptions {
        &self.options
    }
}

/// The aggregate, queryable outcome of one processed session.
///
/// Source cookers resolve directly to their owning pipeline's captured
/// output; composite cookers are instantiated lazily on first query, at
/// most once per session, and cached.
#[derive(Debug)]
pub struct KilnRuntimeResults {
    results: Vec<KilnExecutionResult>,
    repository: Arc<KilnExtensionRepository>,
    tables: HashMap<Uuid, TableCatalogEntry>,
    source_cooker_index: HashMap<KilnDataCookerPath, usize>,
    plugin_table_pipeline: HashMap<Uuid, usize>,
    composite_cache: Mutex<HashMap<KilnDataCookerPath, Value>>,
}

impl KilnRuntimeResults {
    /// Per-pipeline results in execution order, faulted pipelines included.
    pub fn results(&self) -> &[KilnExecutionResult] {
        &self.results
    }

    /// Faults captured during processing, by source id.
    pub fn faults(&self) -> Vec<(&str, &KilnError)> {
        self.results
            .iter()
            .filter_map(|result| {
                result
                    .fault
                    .as_ref()
                    .map(|fault| (result.source_id.as_str(), fault))
            })
            .collect()
    }

    /// Queries the cooked value of a cooker by path. Strict: unknown paths
    /// raise `UnknownCooker`; registered cookers whose data this session
    /// did not produce raise `CookerNotAvailable`.
    pub fn query_cooked(&self, path: &KilnDataCookerPath) -> Result<Value> {
        if path.is_source() {
            return match self.source_cooker_index.get(path) {
                Some(index) => Ok(self.results[*index]
                    .cooked
                    .get(path)
                    .cloned()
                    .unwrap_or(Value::Null)),
                None => {
                    if self.repository.has_cooker(path) {
                        Err(KilnError::cooker_not_available(
                            path,
                            "no pipeline produced this cooker's data",
                        ))
                    } else {
                        Err(KilnError::unknown_cooker(path))
                    }
                }
            };
        }

        if !self.repository.has_cooker(path) {
            return Err(KilnError::unknown_cooker(path));
        }
        match self.repository.cooker_availability(path) {
            Some(KilnAvailability::Available) => {}
            Some(availability) => {
                return Err(KilnError::cooker_not_available(
                    path,
                    format!("classified {:?} in this session", availability),
                ));
            }
            None => return Err(KilnError::unknown_cooker(path)),
        }

        // at-most-one instantiation per composite: the cache lock is held
        // across construction
        let mut cache = self.composite_cache.lock().expect("composite cache poisoned");
        self.resolve_composite(path, &mut cache)
    }

    /// Non-raising variant of [`query_cooked`](Self::query_cooked).
    pub fn try_query_cooked(&self, path: &KilnDataCookerPath) -> Option<Value> {
        self.query_cooked(path).ok()
    }

    fn resolve_composite(
        &self,
        path: &KilnDataCookerPath,
        cache: &mut HashMap<KilnDataCookerPath, Value>,
    ) -> Result<Value> {
        if let Some(value) = cache.get(path) {
            return Ok(value.clone());
        }

        let descriptor = self
            .repository
            .cooker_descriptor(path)
            .ok_or_else(|| KilnError::unknown_cooker(path))?;
        let build = self
            .repository
            .composite_build(path)
            .ok_or_else(|| KilnError::unknown_cooker(path))?;

        let mut inputs = KilnCookedDataSet::new();
        for dep in &descriptor.requires {
            let value = if dep.is_source() {
                match self.source_cooker_index.get(dep) {
                    Some(index) => self.results[*index]
                        .cooked
                        .get(dep)
                        .cloned()
                        .unwrap_or(Value::Null),
                    None => {
                        return Err(KilnError::cooker_not_available(
                            dep,
                            "no pipeline produced this cooker's data",
                        ))
                    }
                }
            } else {
                self.resolve_composite(dep, cache)?
            };
            inputs.insert(dep.clone(), value);
        }

        let value = build(&inputs)?;
        cache.insert(path.clone(), value.clone());
        log::debug!(
            "results.composite.instantiated: composite cooker evaluated - cooker={}",
            path
        );
        Ok(value)
    }

    /// Builds a table by GUID, dispatching to the repository's registered
    /// build action (graph-backed) or the owning pipeline's processor
    /// (plugin-owned).
    ///
    /// The ordinary "no data" case yields
    /// [`KilnTableBuildOutcome::Unavailable`], not an error.
    pub async fn build_table(&self, guid: &Uuid) -> Result<KilnTableBuildOutcome> {
        let entry = self
            .tables
            .get(guid)
            .ok_or_else(|| KilnError::unknown_table(guid))?;

        match &entry.origin {
            KilnTableOrigin::Graph => {
                match self.repository.table_availability(guid) {
                    Some(KilnAvailability::Available) => {}
                    Some(availability) => {
                        return Ok(KilnTableBuildOutcome::unavailable(format!(
                            "table is classified {:?} in this session",
                            availability
                        )));
                    }
                    None => return Err(KilnError::unknown_table(guid)),
                }

                let mut inputs = KilnCookedDataSet::new();
                for dep in &entry.descriptor.requires {
                    match self.query_cooked(dep) {
                        Ok(value) => {
                            inputs.insert(dep.clone(), value);
                        }
                        Err(KilnError::CookerNotAvailable { path, reason }) => {
                            return Ok(KilnTableBuildOutcome::unavailable(format!(
                                "required cooker '{}' is not available: {}",
                                path, reason
                            )));
                        }
                        Err(err) => return Err(err),
                    }
                }

                let build = self
                    .repository
                    .table_build(guid)
                    .ok_or_else(|| KilnError::unknown_table(guid))?;
                build(&inputs)
            }
            KilnTableOrigin::Plugin { .. } => {
                let index = match self.plugin_table_pipeline.get(guid) {
                    Some(index) => *index,
                    None => {
                        return Ok(KilnTableBuildOutcome::unavailable(
                            "no pipeline processed the declaring source",
                        ));
                    }
                };
                let result = &self.results[index];
                let mut processor = result.processor.lock().await;
                processor.build_table(&entry.descriptor)
            }
        }
    }

    /// Non-raising variant of [`build_table`](Self::build_table).
    pub async fn try_build_table(&self, guid: &Uuid) -> Option<KilnTableBuildOutcome> {
        self.build_table(guid).await.ok()
    }
}
