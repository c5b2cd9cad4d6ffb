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

//! # Kiln Data Source Module
//!
//! Data sources are the raw inputs a session is asked to process: trace
//! files, directories of logs, or live streams. A data source is an opaque,
//! immutable handle identified by a URI; the engine never opens it itself,
//! it only matches it against the processing sources that claim to
//! understand it.
//!
//! Acceptance rules are the declarative half of that matching: each rule
//! names a data source kind plus a cheap predicate (extension match, URI
//! pattern, or anything of that kind). The resolver evaluates rules before
//! ever invoking plugin code.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{KilnError, Result};

/// Kind of input a data source refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KilnDataSourceKind {
    File,
    Directory,
    Stream,
}

impl fmt::Display for KilnDataSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KilnDataSourceKind::File => "file",
            KilnDataSourceKind::Directory => "directory",
            KilnDataSourceKind::Stream => "stream",
        };
        write!(f, "{}", name)
    }
}

/// Opaque handle to a raw input, identified by a URI.
///
/// Equality is defined by (kind, uri); the handle carries no content.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KilnDataSource {
    kind: KilnDataSourceKind,
    uri: String,
}

impl KilnDataSource {
    /// Constructs a file-backed data source from a filesystem path.
    pub fn file(path: impl AsRef<Path>) -> Self {
        KilnDataSource {
            kind: KilnDataSourceKind::File,
            uri: path.as_ref().to_string_lossy().into_owned(),
        }
    }

    /// Constructs a directory-backed data source from a filesystem path.
    pub fn directory(path: impl AsRef<Path>) -> Self {
        KilnDataSource {
            kind: KilnDataSourceKind::Directory,
            uri: path.as_ref().to_string_lossy().into_owned(),
        }
    }

    /// Constructs a stream data source from an arbitrary URI.
    pub fn stream(uri: impl Into<String>) -> Self {
        KilnDataSource {
            kind: KilnDataSourceKind::Stream,
            uri: uri.into(),
        }
    }

    pub fn kind(&self) -> KilnDataSourceKind {
        self.kind
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Lower-cased extension of the URI, if it has one.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.uri)
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
    }
}

impl fmt::Display for KilnDataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.uri)
    }
}

/// Cheap declarative predicate evaluated during the resolver's preliminary
/// check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KilnAcceptancePredicate {
    /// Matches when the data source URI carries this extension
    /// (case-insensitive, without the leading dot).
    Extension(String),
    /// Matches when the regular expression matches the URI.
    Pattern(String),
    /// Matches every data source of the rule's kind.
    Any,
}

/// One declared acceptance rule of a processing source: a data source kind
/// plus a cheap content-signal predicate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KilnAcceptanceRule {
    pub kind: KilnDataSourceKind,
    pub predicate: KilnAcceptancePredicate,
}

impl KilnAcceptanceRule {
    /// Rule accepting files with the given extension.
    pub fn file_extension(ext: impl Into<String>) -> Self {
        KilnAcceptanceRule {
            kind: KilnDataSourceKind::File,
            predicate: KilnAcceptancePredicate::Extension(
                ext.into().trim_start_matches('.').to_ascii_lowercase(),
            ),
        }
    }

    /// Rule accepting every data source of the given kind.
    pub fn any(kind: KilnDataSourceKind) -> Self {
        KilnAcceptanceRule {
            kind,
            predicate: KilnAcceptancePredicate::Any,
        }
    }

    /// Rule accepting data sources of the given kind whose URI matches the
    /// regular expression.
    pub fn pattern(kind: KilnDataSourceKind, pattern: impl Into<String>) -> Self {
        KilnAcceptanceRule {
            kind,
            predicate: KilnAcceptancePredicate::Pattern(pattern.into()),
        }
    }
}

/// An acceptance rule with its pattern compiled, ready for repeated
/// evaluation. Compilation failures surface when the owning processing
/// source reference is constructed, not at match time.
#[derive(Clone, Debug)]
pub struct KilnCompiledRule {
    kind: KilnDataSourceKind,
    matcher: CompiledPredicate,
}

#[derive(Clone, Debug)]
enum CompiledPredicate {
    Extension(String),
    Pattern(regex::Regex),
    Any,
}

impl KilnCompiledRule {
    pub fn compile(rule: &KilnAcceptanceRule) -> Result<Self> {
        let matcher = match &rule.predicate {
            KilnAcceptancePredicate::Extension(ext) => {
                CompiledPredicate::Extension(ext.to_ascii_lowercase())
            }
            KilnAcceptancePredicate::Pattern(pattern) => {
                let re = regex::Regex::new(pattern).map_err(|err| {
                    KilnError::invalid_argument(format!(
                        "acceptance rule pattern '{}' is invalid: {}",
                        pattern, err
                    ))
                })?;
                CompiledPredicate::Pattern(re)
            }
            KilnAcceptancePredicate::Any => CompiledPredicate::Any,
        };
        Ok(KilnCompiledRule {
            kind: rule.kind,
            matcher,
        })
    }

    /// Evaluates the rule against a data source's kind and content signal.
    pub fn matches(&self, data_source: &KilnDataSource) -> bool {
        if data_source.kind() != self.kind {
            return false;
        }
        match &self.matcher {
            CompiledPredicate::Extension(ext) => {
                data_source.extension().as_deref() == Some(ext.as_str())
            }
            CompiledPredicate::Pattern(re) => re.is_match(data_source.uri()),
            CompiledPredicate::Any => true,
        }
    }
}

/// How the data sources of one group relate to each other during parsing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KilnProcessingMode {
    /// Sources in the group share a timeline and are parsed together.
    #[default]
    Aligned,
    /// Sources in the group are unrelated captures parsed independently.
    Independent,
}

/// The concrete group of data sources one processor instance is bound to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KilnDataSourceGroup {
    sources: Vec<KilnDataSource>,
    mode: KilnProcessingMode,
}

impl KilnDataSourceGroup {
    pub fn new(sources: Vec<KilnDataSource>) -> Self {
        KilnDataSourceGroup {
            sources,
            mode: KilnProcessingMode::default(),
        }
    }

    pub fn with_mode(sources: Vec<KilnDataSource>, mode: KilnProcessingMode) -> Self {
        KilnDataSourceGroup { sources, mode }
    }

    pub fn sources(&self) -> &[KilnDataSource] {
        &self.sources
    }

    pub fn mode(&self) -> KilnProcessingMode {
        self.mode
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }
}

impl fmt::Display for KilnDataSourceGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let uris: Vec<&str> = self.sources.iter().map(|s| s.uri()).collect();
        write!(f, "[{}]", uris.join(", "))
    }
}
