//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Kiln.
//! The Kiln project belongs to the Dunimd project team.

use std::collections::HashSet;

use kilnx::cooker::{
    KilnCookedDataSet, KilnCookerDescriptor, KilnCookerRegistration, KilnDataCookerPath,
};
use kilnx::errors::Result;
use kilnx::repository::{KilnAvailability, KilnExtensionRepository};
use kilnx::table::{KilnTableBuildOutcome, KilnTableDescriptor};
use serde_json::json;
use uuid::Uuid;

fn empty_table(_inputs: &KilnCookedDataSet) -> Result<KilnTableBuildOutcome> {
    Ok(KilnTableBuildOutcome::unavailable("test table"))
}

fn null_composite(_inputs: &KilnCookedDataSet) -> Result<serde_json::Value> {
    Ok(json!(null))
}

fn register_source(repo: &mut KilnExtensionRepository, path: &KilnDataCookerPath) {
    repo.register_cooker(KilnCookerRegistration::Source(KilnCookerDescriptor::new(
        path.clone(),
        "source cooker",
    )))
    .expect("source registration");
}

fn register_composite(
    repo: &mut KilnExtensionRepository,
    id: &str,
    requires: &[KilnDataCookerPath],
) {
    let mut descriptor =
        KilnCookerDescriptor::new(KilnDataCookerPath::composite(id), "composite cooker");
    for dep in requires {
        descriptor = descriptor.with_requirement(dep.clone());
    }
    repo.register_cooker(KilnCookerRegistration::Composite {
        descriptor,
        build: null_composite,
    })
    .expect("composite registration");
}

#[test]
fn test_available_chain_across_parsers() {
    let alpha = KilnDataCookerPath::source("alpha", "events");
    let beta = KilnDataCookerPath::source("beta", "events");

    let mut repo = KilnExtensionRepository::new();
    register_source(&mut repo, &alpha);
    register_source(&mut repo, &beta);
    register_composite(&mut repo, "merged", &[alpha.clone(), beta.clone()]);

    let table = KilnTableDescriptor::new(Uuid::new_v4(), "Merged", "merged view")
        .with_requirement(KilnDataCookerPath::composite("merged"));
    let guid = table.guid;
    repo.register_table(table, empty_table).unwrap();

    repo.resolve();

    assert_eq!(
        repo.cooker_availability(&KilnDataCookerPath::composite("merged")),
        Some(KilnAvailability::Available)
    );
    assert_eq!(repo.table_availability(&guid), Some(KilnAvailability::Available));
    assert_eq!(
        repo.required_source_cookers_of_table(&guid).unwrap(),
        HashSet::from([alpha, beta])
    );
}

#[test]
fn test_missing_requirement_isolated_to_dependents() {
    // composite C depends on (parserA, cookerX) which no plugin registers;
    // a table on C inherits MissingRequirement while an unrelated table D
    // stays Available
    let missing = KilnDataCookerPath::source("parserA", "cookerX");
    let present = KilnDataCookerPath::source("parserB", "cookerY");

    let mut repo = KilnExtensionRepository::new();
    register_source(&mut repo, &present);
    register_composite(&mut repo, "C", &[missing]);

    let on_c = KilnTableDescriptor::new(Uuid::new_v4(), "OnC", "depends on C")
        .with_requirement(KilnDataCookerPath::composite("C"));
    let unrelated = KilnTableDescriptor::new(Uuid::new_v4(), "D", "depends on Y")
        .with_requirement(present.clone());
    let on_c_guid = on_c.guid;
    let unrelated_guid = unrelated.guid;
    repo.register_table(on_c, empty_table).unwrap();
    repo.register_table(unrelated, empty_table).unwrap();

    repo.resolve();

    assert_eq!(
        repo.cooker_availability(&KilnDataCookerPath::composite("C")),
        Some(KilnAvailability::MissingRequirement)
    );
    assert_eq!(
        repo.table_availability(&on_c_guid),
        Some(KilnAvailability::MissingRequirement)
    );
    assert_eq!(
        repo.table_availability(&unrelated_guid),
        Some(KilnAvailability::Available)
    );
}

#[test]
fn test_error_dominates_missing_requirement() {
    let mut repo = KilnExtensionRepository::new();
    register_composite(&mut repo, "x", &[KilnDataCookerPath::composite("y")]);
    register_composite(&mut repo, "y", &[KilnDataCookerPath::composite("x")]);
    // depends on the cycle and on a missing source cooker
    register_composite(
        &mut repo,
        "z",
        &[
            KilnDataCookerPath::composite("x"),
            KilnDataCookerPath::source("ghost", "events"),
        ],
    );

    repo.resolve();

    assert_eq!(
        repo.cooker_availability(&KilnDataCookerPath::composite("x")),
        Some(KilnAvailability::Error)
    );
    assert_eq!(
        repo.cooker_availability(&KilnDataCookerPath::composite("z")),
        Some(KilnAvailability::Error)
    );
}

#[test]
fn test_deep_transitive_closure() {
    let bottom = KilnDataCookerPath::source("alpha", "raw");
    let mut repo = KilnExtensionRepository::new();
    register_source(&mut repo, &bottom);
    register_composite(&mut repo, "level1", &[bottom.clone()]);
    register_composite(
        &mut repo,
        "level2",
        &[KilnDataCookerPath::composite("level1")],
    );
    register_composite(
        &mut repo,
        "level3",
        &[KilnDataCookerPath::composite("level2")],
    );

    repo.resolve();

    let closure = repo
        .required_source_cookers(&KilnDataCookerPath::composite("level3"))
        .unwrap();
    assert_eq!(closure, HashSet::from([bottom]));
}

#[test]
fn test_source_cooker_closure_includes_itself() {
    let events = KilnDataCookerPath::source("alpha", "events");
    let mut repo = KilnExtensionRepository::new();
    register_source(&mut repo, &events);
    repo.resolve();

    let closure = repo.required_source_cookers(&events).unwrap();
    assert_eq!(closure, HashSet::from([events]));
}

#[test]
fn test_classification_is_fixed_after_resolve() {
    let mut repo = KilnExtensionRepository::new();
    register_composite(&mut repo, "c", &[KilnDataCookerPath::source("late", "events")]);
    repo.resolve();
    assert!(repo.is_resolved());

    assert_eq!(
        repo.cooker_availability(&KilnDataCookerPath::composite("c")),
        Some(KilnAvailability::MissingRequirement)
    );

    // the late parser can no longer be registered; classification is
    // monotonic for the life of the session
    assert!(repo
        .register_cooker(KilnCookerRegistration::Source(KilnCookerDescriptor::new(
            KilnDataCookerPath::source("late", "events"),
            "too late",
        )))
        .is_err());

    repo.resolve();
    assert_eq!(
        repo.cooker_availability(&KilnDataCookerPath::composite("c")),
        Some(KilnAvailability::MissingRequirement)
    );
}
