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

//! # Kiln Extension Repository
//!
//! The repository owns the full, finalized graph of cooker and table nodes
//! contributed by every plugin in the session. Once [`resolve`] runs, each
//! node is classified:
//!
//! - `Available`: every dependency, transitively and possibly across
//!   parsers, resolves to another `Available` node
//! - `MissingRequirement`: a dependency is declared but not registered by
//!   any plugin present in the session
//! - `Error`: a cycle was detected among composite-cooker/table
//!   dependencies
//!
//! Classification failures are isolated per node: an unavailable node
//! propagates its status only to the nodes that depend on it. Topology is
//! fixed at construction; per-run enabling selects among `Available` nodes
//! and never changes classification.
//!
//! [`resolve`]: KilnExtensionRepository::resolve

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cooker::{
    KilnCompositeCookerFn, KilnCookerDescriptor, KilnCookerRegistration, KilnDataCookerPath,
};
use crate::errors::{KilnError, Result};
use crate::table::{KilnTableBuildFn, KilnTableDescriptor};

/// Classification of whether a node's dependencies can be satisfied in the
/// current session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KilnAvailability {
    Available,
    MissingRequirement,
    Error,
}

impl KilnAvailability {
    /// Combines a node's status with one dependency's status. `Error`
    /// dominates `MissingRequirement`, which dominates `Available`.
    fn worse(self, other: KilnAvailability) -> KilnAvailability {
        use KilnAvailability::*;
        match (self, other) {
            (Error, _) | (_, Error) => Error,
            (MissingRequirement, _) | (_, MissingRequirement) => MissingRequirement,
            _ => Available,
        }
    }
}

#[derive(Debug)]
struct CookerNode {
    descriptor: KilnCookerDescriptor,
    build: Option<KilnCompositeCookerFn>,
    availability: KilnAvailability,
    transitive_sources: HashSet<KilnDataCookerPath>,
}

#[derive(Debug)]
struct TableNode {
    descriptor: KilnTableDescriptor,
    build: KilnTableBuildFn,
    availability: KilnAvailability,
    transitive_sources: HashSet<KilnDataCookerPath>,
}

/// The session-wide cooker/table dependency graph.
#[derive(Debug, Default)]
pub struct KilnExtensionRepository {
    cookers: HashMap<KilnDataCookerPath, CookerNode>,
    tables: HashMap<Uuid, TableNode>,
    resolved: bool,
}

impl KilnExtensionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a cooker contributed by a plugin.
    ///
    /// Registration is rejected once the topology has been finalized, and a
    /// path registered twice is a configuration error.
    pub fn register_cooker(&mut self, registration: KilnCookerRegistration) -> Result<()> {
        if self.resolved {
            return Err(KilnError::invalid_operation(
                "repository topology has been finalized",
            ));
        }

        let (descriptor, build) = match registration {
            KilnCookerRegistration::Source(descriptor) => {
                if !descriptor.path.is_source() {
                    return Err(KilnError::invalid_argument(format!(
                        "source cooker '{}' must carry a parser id",
                        descriptor.path
                    )));
                }
                (descriptor, None)
            }
            KilnCookerRegistration::Composite { descriptor, build } => {
                if !descriptor.path.is_composite() {
                    return Err(KilnError::invalid_argument(format!(
                        "composite cooker '{}' must not carry a parser id",
                        descriptor.path
                    )));
                }
                (descriptor, Some(build))
            }
        };

        if self.cookers.contains_key(&descriptor.path) {
            return Err(KilnError::invalid_argument(format!(
                "cooker '{}' is already registered",
                descriptor.path
            )));
        }

        self.cookers.insert(
            descriptor.path.clone(),
            CookerNode {
                descriptor,
                build,
                availability: KilnAvailability::Available,
                transitive_sources: HashSet::new(),
            },
        );
        Ok(())
    }

    /// Registers an extension table and its build action.
    pub fn register_table(
        &mut self,
        descriptor: KilnTableDescriptor,
        build: KilnTableBuildFn,
    ) -> Result<()> {
        if self.resolved {
            return Err(KilnError::invalid_operation(
                "repository topology has been finalized",
            ));
        }
        if self.tables.contains_key(&descriptor.guid) {
            return Err(KilnError::invalid_argument(format!(
                "table '{}' is already registered",
                descriptor.guid
            )));
        }

        self.tables.insert(
            descriptor.guid,
            TableNode {
                descriptor,
                build,
                availability: KilnAvailability::Available,
                transitive_sources: HashSet::new(),
            },
        );
        Ok(())
    }

    /// Finalizes the topology and classifies every node.
    ///
    /// Idempotent; the first call fixes the classification for the life of
    /// the session.
    pub fn resolve(&mut self) {
        if self.resolved {
            return;
        }

        let mut memo: HashMap<KilnDataCookerPath, KilnAvailability> = HashMap::new();
        let mut source_memo: HashMap<KilnDataCookerPath, HashSet<KilnDataCookerPath>> =
            HashMap::new();
        let paths: Vec<KilnDataCookerPath> = self.cookers.keys().cloned().collect();

        for path in &paths {
            let mut visiting = HashSet::new();
            Self::classify(&self.cookers, path, &mut visiting, &mut memo);
            let mut visiting = HashSet::new();
            Self::collect_sources(&self.cookers, path, &mut visiting, &mut source_memo);
        }

        for (path, node) in self.cookers.iter_mut() {
            node.availability = memo
                .get(path)
                .copied()
                .unwrap_or(KilnAvailability::Available);
            node.transitive_sources = source_memo.get(path).cloned().unwrap_or_default();
        }

        for node in self.tables.values_mut() {
            let mut availability = KilnAvailability::Available;
            let mut sources = HashSet::new();
            for dep in &node.descriptor.requires {
                match memo.get(dep) {
                    Some(status) => {
                        availability = availability.worse(*status);
                        if let Some(dep_sources) = source_memo.get(dep) {
                            sources.extend(dep_sources.iter().cloned());
                        }
                    }
                    None => {
                        availability = availability.worse(KilnAvailability::MissingRequirement);
                    }
                }
            }
            node.availability = availability;
            node.transitive_sources = sources;
        }

        self.resolved = true;
    }

    fn classify(
        cookers: &HashMap<KilnDataCookerPath, CookerNode>,
        path: &KilnDataCookerPath,
        visiting: &mut HashSet<KilnDataCookerPath>,
        memo: &mut HashMap<KilnDataCookerPath, KilnAvailability>,
    ) -> KilnAvailability {
        if let Some(status) = memo.get(path) {
            return *status;
        }
        if visiting.contains(path) {
            // cycle: reported to the dependent; the node itself is
            // classified when its own walk completes
            return KilnAvailability::Error;
        }
        let node = match cookers.get(path) {
            Some(node) => node,
            None => return KilnAvailability::MissingRequirement,
        };

        visiting.insert(path.clone());
        let mut status = KilnAvailability::Available;
        for dep in &node.descriptor.requires {
            let dep_status = Self::classify(cookers, dep, visiting, memo);
            status = status.worse(dep_status);
        }
        visiting.remove(path);

        memo.insert(path.clone(), status);
        status
    }

    fn collect_sources(
        cookers: &HashMap<KilnDataCookerPath, CookerNode>,
        path: &KilnDataCookerPath,
        visiting: &mut HashSet<KilnDataCookerPath>,
        memo: &mut HashMap<KilnDataCookerPath, HashSet<KilnDataCookerPath>>,
    ) -> HashSet<KilnDataCookerPath> {
        if let Some(sources) = memo.get(path) {
            return sources.clone();
        }
        if visiting.contains(path) {
            return HashSet::new();
        }
        let node = match cookers.get(path) {
            Some(node) => node,
            None => return HashSet::new(),
        };

        visiting.insert(path.clone());
        let mut sources = HashSet::new();
        if path.is_source() {
            sources.insert(path.clone());
        }
        for dep in &node.descriptor.requires {
            sources.extend(Self::collect_sources(cookers, dep, visiting, memo));
        }
        visiting.remove(path);

        memo.insert(path.clone(), sources.clone());
        sources
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Classification of a cooker, if registered.
    pub fn cooker_availability(&self, path: &KilnDataCookerPath) -> Option<KilnAvailability> {
        self.cookers.get(path).map(|node| node.availability)
    }

    /// Classification of an extension table, if registered.
    pub fn table_availability(&self, guid: &Uuid) -> Option<KilnAvailability> {
        self.tables.get(guid).map(|node| node.availability)
    }

    pub fn has_cooker(&self, path: &KilnDataCookerPath) -> bool {
        self.cookers.contains_key(path)
    }

    pub fn is_extension_table(&self, guid: &Uuid) -> bool {
        self.tables.contains_key(guid)
    }

    pub fn cooker_descriptor(&self, path: &KilnDataCookerPath) -> Option<&KilnCookerDescriptor> {
        self.cookers.get(path).map(|node| &node.descriptor)
    }

    pub fn table_descriptor(&self, guid: &Uuid) -> Option<&KilnTableDescriptor> {
        self.tables.get(guid).map(|node| &node.descriptor)
    }

    /// Descriptors of every extension table in the graph.
    pub fn table_descriptors(&self) -> Vec<&KilnTableDescriptor> {
        self.tables.values().map(|node| &node.descriptor).collect()
    }

    /// Build function of a composite cooker, if registered as one.
    pub fn composite_build(&self, path: &KilnDataCookerPath) -> Option<KilnCompositeCookerFn> {
        self.cookers.get(path).and_then(|node| node.build)
    }

    /// Registered build action of an extension table.
    pub fn table_build(&self, guid: &Uuid) -> Option<KilnTableBuildFn> {
        self.tables.get(guid).map(|node| node.build)
    }

    /// Transitive source-cooker closure of a cooker.
    pub fn required_source_cookers(
        &self,
        path: &KilnDataCookerPath,
    ) -> Result<HashSet<KilnDataCookerPath>> {
        self.cookers
            .get(path)
            .map(|node| node.transitive_sources.clone())
            .ok_or_else(|| KilnError::unknown_cooker(path))
    }

    /// Transitive source-cooker closure of an extension table.
    pub fn required_source_cookers_of_table(
        &self,
        guid: &Uuid,
    ) -> Result<HashSet<KilnDataCookerPath>> {
        self.tables
            .get(guid)
            .map(|node| node.transitive_sources.clone())
            .ok_or_else(|| KilnError::unknown_table(guid))
    }
}
