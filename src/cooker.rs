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

//! # Kiln Data Cooker Module
//!
//! Data cookers are the transformation units of the engine. A *source*
//! cooker is bound to exactly one originating parser and consumes that
//! parser's raw events during a pipeline run; a *composite* cooker consumes
//! the outputs of other cookers, possibly across parsers and therefore
//! across pipelines.
//!
//! Cookers are addressed by [`KilnDataCookerPath`], which has two textual
//! forms used wherever a cooker is requested by name:
//!
//! - `parserId/cookerId` for source cookers
//! - `cookerId` for composite cookers
//!
//! Cooked values are opaque to the engine and represented as
//! `serde_json::Value` payloads, one per cooker per session.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{KilnError, Result};

/// Identifier for a transformation unit.
///
/// Source cookers carry the id of their originating parser; composite
/// cookers carry a cooker id only.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KilnDataCookerPath {
    parser_id: Option<String>,
    cooker_id: String,
}

impl KilnDataCookerPath {
    /// Path of a source cooker bound to `parser_id`.
    pub fn source(parser_id: impl Into<String>, cooker_id: impl Into<String>) -> Self {
        KilnDataCookerPath {
            parser_id: Some(parser_id.into()),
            cooker_id: cooker_id.into(),
        }
    }

    /// Path of a composite cooker.
    pub fn composite(cooker_id: impl Into<String>) -> Self {
        KilnDataCookerPath {
            parser_id: None,
            cooker_id: cooker_id.into(),
        }
    }

    /// Parses the textual form: `parserId/cookerId` or `cookerId`.
    ///
    /// Empty components are precondition violations.
    pub fn parse(text: &str) -> Result<Self> {
        if text.is_empty() {
            return Err(KilnError::invalid_argument("cooker path must not be empty"));
        }
        match text.split_once('/') {
            Some((parser, cooker)) => {
                if parser.is_empty() || cooker.is_empty() || cooker.contains('/') {
                    return Err(KilnError::invalid_argument(format!(
                        "malformed cooker path '{}'",
                        text
                    )));
                }
                Ok(KilnDataCookerPath::source(parser, cooker))
            }
            None => Ok(KilnDataCookerPath::composite(text)),
        }
    }

    pub fn parser_id(&self) -> Option<&str> {
        self.parser_id.as_deref()
    }

    pub fn cooker_id(&self) -> &str {
        &self.cooker_id
    }

    /// True for `parserId/cookerId` paths.
    pub fn is_source(&self) -> bool {
        self.parser_id.is_some()
    }

    /// True for bare `cookerId` paths.
    pub fn is_composite(&self) -> bool {
        self.parser_id.is_none()
    }
}

impl fmt::Display for KilnDataCookerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parser_id {
            Some(parser) => write!(f, "{}/{}", parser, self.cooker_id),
            None => write!(f, "{}", self.cooker_id),
        }
    }
}

impl Serialize for KilnDataCookerPath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for KilnDataCookerPath {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        KilnDataCookerPath::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Declared metadata of a cooker: its path, a human-readable description,
/// and the cooker paths it requires.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KilnCookerDescriptor {
    pub path: KilnDataCookerPath,
    pub description: String,
    pub requires: Vec<KilnDataCookerPath>,
}

impl KilnCookerDescriptor {
    pub fn new(path: KilnDataCookerPath, description: impl Into<String>) -> Self {
        KilnCookerDescriptor {
            path,
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

/// Cooked outputs keyed by cooker path. Payloads are opaque to the engine.
pub type KilnCookedDataSet = HashMap<KilnDataCookerPath, Value>;

/// Factory producing a composite cooker's value from the cooked values of
/// its declared dependencies. Invoked lazily, at most once per session.
pub type KilnCompositeCookerFn = fn(&KilnCookedDataSet) -> Result<Value>;

/// How a processing source contributes a cooker to the session.
#[derive(Clone, Debug)]
pub enum KilnCookerRegistration {
    /// A source cooker: produced by the declaring plugin's parser during
    /// `parse`. The path must carry a parser id.
    Source(KilnCookerDescriptor),
    /// A composite cooker: evaluated by the engine from other cookers'
    /// outputs. The path must not carry a parser id.
    Composite {
        descriptor: KilnCookerDescriptor,
        build: KilnCompositeCookerFn,
    },
}

impl KilnCookerRegistration {
    pub fn descriptor(&self) -> &KilnCookerDescriptor {
        match self {
            KilnCookerRegistration::Source(descriptor) => descriptor,
            KilnCookerRegistration::Composite { descriptor, .. } => descriptor,
        }
    }

    pub fn path(&self) -> &KilnDataCookerPath {
        &self.descriptor().path
    }
}
