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

//! # Kiln Table Module
//!
//! Tables are the queryable outputs of a session. An *extension* table
//! declares cooker-path dependencies and is built by a registered build
//! action against cooked data; a *plugin* table is built directly by a
//! processor instance and is invisible to the dependency graph.
//!
//! The table GUID is the only stable key accepted by enable and build
//! operations; names are display metadata.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::cooker::{KilnCookedDataSet, KilnDataCookerPath};
use crate::errors::Result;

/// Stable identity and display metadata of a table, plus its declared
/// cooker-path requirements (empty for plugin tables).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KilnTableDescriptor {
    pub guid: Uuid,
    pub name: String,
    pub description: String,
    pub requires: Vec<KilnDataCookerPath>,
}

impl KilnTableDescriptor {
    pub fn new(guid: Uuid, name: impl Into<String>, description: impl Into<String>) -> Self {
        KilnTableDescriptor {
            guid,
            name: name.into(),
            description: description.into(),
            requires: Vec::new(),
        }
    }

    pub fn with_requirement(mut self, dep: KilnDataCookerPath) -> Self {
        if !self.requires.contains(&dep) {
            self.requires.push(dep);
        }
        self
    }
}

/// One column of a built table: a name plus a coarse type label used by
/// display layers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KilnColumnConfig {
    pub name: String,
    pub type_label: String,
}

impl KilnColumnConfig {
    pub fn new(name: impl Into<String>, type_label: impl Into<String>) -> Self {
        KilnColumnConfig {
            name: name.into(),
            type_label: type_label.into(),
        }
    }
}

/// Generator producing the detail payload for one row, used by display
/// layers that expand rows on demand.
pub type KilnRowDetailFn = fn(usize) -> Value;

/// A structured, materialized table: row count, columns, display
/// configuration names, and an optional per-row detail generator.
#[derive(Clone, Debug)]
pub struct KilnBuiltTable {
    pub descriptor: KilnTableDescriptor,
    pub row_count: usize,
    pub columns: Vec<KilnColumnConfig>,
    pub display_configurations: Vec<String>,
    pub row_details: Option<KilnRowDetailFn>,
}

impl KilnBuiltTable {
    pub fn new(descriptor: KilnTableDescriptor, row_count: usize) -> Self {
        KilnBuiltTable {
            descriptor,
            row_count,
            columns: Vec::new(),
            display_configurations: Vec::new(),
            row_details: None,
        }
    }

    pub fn with_column(mut self, column: KilnColumnConfig) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_display_configuration(mut self, name: impl Into<String>) -> Self {
        self.display_configurations.push(name.into());
        self
    }

    pub fn with_row_details(mut self, details: KilnRowDetailFn) -> Self {
        self.row_details = Some(details);
        self
    }
}

/// Outcome of a build-table request. The ordinary "no data" case is a
/// well-defined `Unavailable` value, never an error.
#[derive(Clone, Debug)]
pub enum KilnTableBuildOutcome {
    Built(KilnBuiltTable),
    Unavailable { reason: String },
}

impl KilnTableBuildOutcome {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        KilnTableBuildOutcome::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_built(&self) -> bool {
        matches!(self, KilnTableBuildOutcome::Built(_))
    }
}

/// Build action of an extension table, invoked with the cooked values of the
/// table's declared requirements.
pub type KilnTableBuildFn = fn(&KilnCookedDataSet) -> Result<KilnTableBuildOutcome>;

/// How a processing source contributes a table to the session.
#[derive(Clone, Debug)]
pub enum KilnTableRegistration {
    /// An extension table, resolved through the dependency graph and built
    /// by the registered action.
    Extension {
        descriptor: KilnTableDescriptor,
        build: KilnTableBuildFn,
    },
    /// A plugin table, built directly by the declaring processor instance
    /// and invisible to the graph.
    Plugin { descriptor: KilnTableDescriptor },
}

impl KilnTableRegistration {
    pub fn descriptor(&self) -> &KilnTableDescriptor {
        match self {
            KilnTableRegistration::Extension { descriptor, .. } => descriptor,
            KilnTableRegistration::Plugin { descriptor } => descriptor,
        }
    }

    pub fn guid(&self) -> Uuid {
        self.descriptor().guid
    }
}
