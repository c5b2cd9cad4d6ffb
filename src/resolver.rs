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

//! # Kiln Data Source Resolver
//!
//! Matches unassigned inputs to the plugins that can handle them. Matching
//! is many-to-many and order-independent: the same input may legitimately be
//! claimed by several plugins, and a plugin may claim several inputs.
//!
//! For each (data source, candidate) pair the candidate's
//! [`supports`](crate::plugin::KilnProcessingSourceReference::supports) is
//! consulted, which runs the declared acceptance rules before any plugin
//! code and swallows authoritative-check errors as rejection. The resolver
//! itself neither logs nor propagates those rejections.

use std::collections::HashMap;
use std::sync::Arc;

use crate::datasource::KilnDataSource;
use crate::plugin::KilnProcessingSourceReference;

/// Assigns data sources to the candidates that claim them.
///
/// Every candidate id appears as a key in the returned map, even when its
/// assigned set is empty. Assignments within one candidate are
/// deduplicated; across candidates the same data source may appear many
/// times.
pub fn assign(
    data_sources: &[KilnDataSource],
    candidates: &[Arc<KilnProcessingSourceReference>],
) -> HashMap<String, Vec<KilnDataSource>> {
    let mut assignments: HashMap<String, Vec<KilnDataSource>> = HashMap::new();

    for candidate in candidates {
        let assigned = assignments.entry(candidate.id().to_string()).or_default();
        for data_source in data_sources {
            if candidate.supports(data_source) && !assigned.contains(data_source) {
                assigned.push(data_source.clone());
            }
        }
    }

    assignments
}
