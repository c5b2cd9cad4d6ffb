//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Kiln.
//! The Kiln project belongs to the Dunimd project team.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use kilnx::cooker::KilnCookerRegistration;
use kilnx::datasource::{KilnAcceptanceRule, KilnDataSource, KilnDataSourceGroup};
use kilnx::errors::{KilnError, Result};
use kilnx::plugin::{
    KilnProcessingSource, KilnProcessingSourceInfo, KilnProcessingSourceReference, KilnProcessor,
    KilnProcessorEnvironment, KilnProcessorOptions,
};
use kilnx::resolver::assign;
use kilnx::table::KilnTableRegistration;
use proptest::prelude::*;

#[derive(Debug)]
struct StubSource {
    id: String,
    rules: Vec<KilnAcceptanceRule>,
    authoritative: Result<bool>,
    authoritative_calls: Arc<AtomicUsize>,
}

impl KilnProcessingSource for StubSource {
    fn info(&self) -> KilnProcessingSourceInfo {
        KilnProcessingSourceInfo::new(self.id.clone(), self.id.clone(), "stub plugin")
    }

    fn acceptance_rules(&self) -> Vec<KilnAcceptanceRule> {
        self.rules.clone()
    }

    fn cookers(&self) -> Vec<KilnCookerRegistration> {
        Vec::new()
    }

    fn tables(&self) -> Vec<KilnTableRegistration> {
        Vec::new()
    }

    fn supports(&self, _data_source: &KilnDataSource) -> Result<bool> {
        self.authoritative_calls.fetch_add(1, Ordering::SeqCst);
        match &self.authoritative {
            Ok(answer) => Ok(*answer),
            Err(_) => Err(KilnError::internal("authoritative check failed")),
        }
    }

    fn create_processor(
        &self,
        _group: &KilnDataSourceGroup,
        _environment: &KilnProcessorEnvironment,
        _options: &KilnProcessorOptions,
    ) -> Option<Box<dyn KilnProcessor>> {
        None
    }
}

fn stub(
    id: &str,
    rules: Vec<KilnAcceptanceRule>,
    authoritative: Result<bool>,
) -> (Arc<KilnProcessingSourceReference>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let reference = KilnProcessingSourceReference::new(Arc::new(StubSource {
        id: id.to_string(),
        rules,
        authoritative,
        authoritative_calls: calls.clone(),
    }))
    .expect("stub reference");
    (Arc::new(reference), calls)
}

#[test]
fn test_every_candidate_appears_even_with_empty_assignment() {
    let (etl, _) = stub("etl", vec![KilnAcceptanceRule::file_extension("etl")], Ok(true));
    let (pcap, _) = stub("pcap", vec![KilnAcceptanceRule::file_extension("pcap")], Ok(true));
    let (silent, _) = stub("silent", Vec::new(), Ok(true));

    let sources = vec![KilnDataSource::file("/traces/boot.etl")];
    let result = assign(&sources, &[etl, pcap, silent]);

    assert_eq!(result.len(), 3);
    assert_eq!(result["etl"].len(), 1);
    assert!(result["pcap"].is_empty());
    assert!(result["silent"].is_empty());
}

#[test]
fn test_membership_follows_supports() {
    let (accepting, _) = stub("yes", vec![KilnAcceptanceRule::file_extension("etl")], Ok(true));
    let (rejecting, _) = stub("no", vec![KilnAcceptanceRule::file_extension("etl")], Ok(false));

    let boot = KilnDataSource::file("/traces/boot.etl");
    let result = assign(std::slice::from_ref(&boot), &[accepting, rejecting]);

    assert!(result["yes"].contains(&boot));
    assert!(!result["no"].contains(&boot));
}

#[test]
fn test_preliminary_rejection_never_calls_the_plugin() {
    let (candidate, calls) = stub(
        "picky",
        vec![KilnAcceptanceRule::file_extension("etl")],
        Ok(true),
    );

    let sources = vec![
        KilnDataSource::file("/traces/capture.pcap"),
        KilnDataSource::directory("/traces"),
        KilnDataSource::stream("tcp://localhost:9000"),
    ];
    let result = assign(&sources, &[candidate]);

    assert!(result["picky"].is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_authoritative_error_counts_as_rejection() {
    let (candidate, calls) = stub(
        "flaky",
        vec![KilnAcceptanceRule::file_extension("etl")],
        Err(KilnError::internal("boom")),
    );

    let sources = vec![KilnDataSource::file("/traces/boot.etl")];
    let result = assign(&sources, &[candidate]);

    assert!(result["flaky"].is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_matching_is_order_independent() {
    let (a, _) = stub("a", vec![KilnAcceptanceRule::file_extension("etl")], Ok(true));
    let (b, _) = stub("b", vec![KilnAcceptanceRule::file_extension("pcap")], Ok(true));

    let sources = vec![
        KilnDataSource::file("/one.etl"),
        KilnDataSource::file("/two.pcap"),
        KilnDataSource::file("/three.etl"),
    ];

    let forward = assign(&sources, &[a.clone(), b.clone()]);
    let reversed = assign(&sources, &[b, a]);

    assert_eq!(forward["a"], reversed["a"]);
    assert_eq!(forward["b"], reversed["b"]);
}

proptest! {
    #[test]
    fn prop_assignment_is_total_and_consistent(
        extensions in proptest::collection::vec("(etl|pcap|log|json)", 0..12)
    ) {
        let (candidate, _) = stub(
            "etl-only",
            vec![KilnAcceptanceRule::file_extension("etl")],
            Ok(true),
        );

        let sources: Vec<KilnDataSource> = extensions
            .iter()
            .enumerate()
            .map(|(index, ext)| KilnDataSource::file(format!("/trace-{index}.{ext}")))
            .collect();

        let result = assign(&sources, std::slice::from_ref(&candidate));

        // the candidate is always a key
        prop_assert!(result.contains_key("etl-only"));

        // a source is assigned exactly when its extension matches
        for source in &sources {
            let expected = source.extension().as_deref() == Some("etl");
            prop_assert_eq!(result["etl-only"].contains(source), expected);
        }
    }
}
