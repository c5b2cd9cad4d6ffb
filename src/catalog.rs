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

//! # Kiln Plugin Catalog Module
//!
//! Dynamic discovery of plugin code (library scanning, isolation sandboxes)
//! lives outside the engine. The engine consumes an abstract catalog that
//! yields already-validated processing sources; loaders are thin adapters
//! implementing [`KilnPluginCatalog`].

use std::fmt;
use std::sync::Arc;

use crate::plugin::KilnProcessingSource;

/// Catalog of discovered processing sources.
pub trait KilnPluginCatalog: Send + Sync {
    /// All processing sources available to the session, in a stable order.
    fn processing_sources(&self) -> Vec<Arc<dyn KilnProcessingSource>>;
}

/// In-memory catalog for embedding the engine and for tests.
#[derive(Default)]
pub struct KilnStaticCatalog {
    sources: Vec<Arc<dyn KilnProcessingSource>>,
}

impl fmt::Debug for KilnStaticCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.sources.iter().map(|s| s.info().id).collect();
        f.debug_struct("KilnStaticCatalog").field("sources", &ids).finish()
    }
}

impl KilnStaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a processing source to the catalog.
    pub fn register(&mut self, source: Arc<dyn KilnProcessingSource>) {
        self.sources.push(source);
    }

    /// Builder-style variant of [`register`](Self::register).
    pub fn with_source(mut self, source: Arc<dyn KilnProcessingSource>) -> Self {
        self.register(source);
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl KilnPluginCatalog for KilnStaticCatalog {
    fn processing_sources(&self) -> Vec<Arc<dyn KilnProcessingSource>> {
        self.sources.clone()
    }
}
