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

//! Import/export of table display configuration. Optional for correctness
//! of resolution and execution; display layers persist these alongside
//! their own state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::Result;

/// Sort direction of one displayed column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KilnSortOrder {
    #[default]
    None,
    Ascending,
    Descending,
}

/// Display state of one column.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KilnColumnDisplay {
    pub column: String,
    pub width: u32,
    pub visible: bool,
    #[serde(default)]
    pub sort: KilnSortOrder,
}

/// Persisted display configuration of one table, keyed by the table GUID.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KilnTableDisplayConfig {
    pub table: Uuid,
    pub name: String,
    pub columns: Vec<KilnColumnDisplay>,
}

impl KilnTableDisplayConfig {
    pub fn new(table: Uuid, name: impl Into<String>) -> Self {
        KilnTableDisplayConfig {
            table,
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: KilnColumnDisplay) -> Self {
        self.columns.push(column);
        self
    }
}

/// Serializes a display configuration to JSON.
pub fn export_json(config: &KilnTableDisplayConfig) -> Result<String> {
    Ok(serde_json::to_string_pretty(config)?)
}

/// Deserializes a display configuration from JSON.
pub fn import_json(text: &str) -> Result<KilnTableDisplayConfig> {
    Ok(serde_json::from_str(text)?)
}

/// Serializes a display configuration to YAML.
pub fn export_yaml(config: &KilnTableDisplayConfig) -> Result<String> {
    Ok(serde_yaml::to_string(config)?)
}

/// Deserializes a display configuration from YAML.
pub fn import_yaml(text: &str) -> Result<KilnTableDisplayConfig> {
    Ok(serde_yaml::from_str(text)?)
}
