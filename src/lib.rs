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

//! # Kiln Core Library
//!
//! Kiln is an extensible engine that turns heterogeneous trace/telemetry
//! inputs into queryable tabular results. External plugins ("processing
//! sources") claim raw inputs ("data sources"), parse them, and expose
//! transformation units ("data cookers") and tables. The engine matches
//! inputs to plugins, resolves a dependency graph of cookers and tables so
//! cross-plugin composition works, and runs each matched plugin instance
//! through a controlled lifecycle that isolates per-instance failures while
//! producing one aggregate, queryable result set.
//!
//! ## Module Overview
//!
//! - **datasource**: input handles, data source groups, acceptance rules
//! - **cooker**: data cooker paths, descriptors, cooked data sets
//! - **table**: table descriptors, built tables, build outcomes
//! - **plugin**: processing source/processor contracts and owning references
//! - **catalog**: the abstract plugin catalog consumed from discovery
//! - **resolver**: data-source-to-plugin assignment
//! - **repository**: the cooker/table dependency graph and availability
//! - **executor**: the per-plugin execution pipeline
//! - **engine**: the session orchestrator and aggregate results
//! - **progress**: progress sinks and cooperative cancellation
//! - **tableconfig**: optional table display configuration import/export
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use kilnx::{KilnDataCookerPath, KilnDataSource, KilnEngine, KilnEngineCreateInfo,
//!             KilnStaticCatalog};
//!
//! let catalog = KilnStaticCatalog::new().with_source(Arc::new(MyPlugin));
//! let info = KilnEngineCreateInfo::new(Arc::new(catalog))
//!     .with_data_source(KilnDataSource::file("/traces/boot.etl"));
//!
//! let mut engine = KilnEngine::create(info).await?;
//! let path = KilnDataCookerPath::parse("etw/processes")?;
//! engine.enable_cooker(&path)?;
//! let results = engine.process(Default::default()).await?;
//! let cooked = results.query_cooked(&path)?;
//! ```
//!
//! ## Error Handling
//!
//! All operations return `Result<T, KilnError>`. Strict APIs raise named
//! error kinds for expected-absence conditions; the matching `try_*` APIs
//! return `bool`/`Option` instead. Per-pipeline failures are captured inside
//! execution results, never raised across pipelines.

#![allow(non_snake_case)]

pub mod catalog;
pub mod cooker;
pub mod datasource;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod plugin;
pub mod progress;
pub mod repository;
pub mod resolver;
pub mod table;
pub mod tableconfig;

pub use catalog::{KilnPluginCatalog, KilnStaticCatalog};
pub use cooker::{
    KilnCompositeCookerFn, KilnCookedDataSet, KilnCookerDescriptor, KilnCookerRegistration,
    KilnDataCookerPath,
};
pub use datasource::{
    KilnAcceptancePredicate, KilnAcceptanceRule, KilnDataSource, KilnDataSourceGroup,
    KilnDataSourceKind, KilnProcessingMode,
};
pub use engine::{
    KilnEngine, KilnEngineCreateInfo, KilnExplicitBinding, KilnRuntimeResults, KilnTableOrigin,
};
pub use errors::{KilnError, Result};
pub use executor::{KilnExecutionContext, KilnExecutionResult, KilnExecutor, KilnExecutorState};
pub use plugin::{
    KilnProcessingSource, KilnProcessingSourceInfo, KilnProcessingSourceReference, KilnProcessor,
    KilnProcessorEnvironment, KilnProcessorHandle, KilnProcessorOptions, KilnSourceInfo,
    KilnSourceInfoState,
};
pub use progress::{KilnCancellationToken, KilnLogProgress, KilnNullProgress, KilnProgress};
pub use repository::{KilnAvailability, KilnExtensionRepository};
pub use table::{
    KilnBuiltTable, KilnColumnConfig, KilnRowDetailFn, KilnTableBuildFn, KilnTableBuildOutcome,
    KilnTableDescriptor, KilnTableRegistration,
};
pub use tableconfig::{KilnColumnDisplay, KilnSortOrder, KilnTableDisplayConfig};
