//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Kiln.
//! The Kiln project belongs to the Dunimd project team.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use kilnx::cooker::{KilnCookedDataSet, KilnCookerRegistration, KilnDataCookerPath};
use kilnx::datasource::{KilnAcceptanceRule, KilnDataSource, KilnDataSourceGroup};
use kilnx::errors::{KilnError, Result};
use kilnx::executor::{KilnExecutionContext, KilnExecutor, KilnExecutorState};
use kilnx::plugin::{
    KilnProcessingSource, KilnProcessingSourceInfo, KilnProcessingSourceReference, KilnProcessor,
    KilnProcessorEnvironment, KilnProcessorOptions, KilnSourceInfo, KilnSourceInfoState,
};
use kilnx::progress::{KilnCancellationToken, KilnProgress};
use kilnx::table::{KilnBuiltTable, KilnTableBuildOutcome, KilnTableDescriptor, KilnTableRegistration};
use serde_json::json;
use uuid::Uuid;

/// What the scripted processor should do at each pipeline step.
#[derive(Clone, Debug, Default)]
struct ProcessorScript {
    enable_failures: HashMap<Uuid, String>,
    metadata_error: Option<String>,
    source_info: SourceInfoBehavior,
    parse_error: Option<String>,
}

#[derive(Clone, Debug, Default)]
enum SourceInfoBehavior {
    #[default]
    Nothing,
    Known,
    Fails,
}

#[derive(Clone, Default)]
struct Recorders {
    enable_calls: Arc<Mutex<Vec<Uuid>>>,
    releases: Arc<AtomicUsize>,
    progress_reports: Arc<Mutex<Vec<u8>>>,
}

#[derive(Debug)]
struct RecordingProgress {
    reports: Arc<Mutex<Vec<u8>>>,
}

impl KilnProgress for RecordingProgress {
    fn report(&self, percent: u8) {
        self.reports.lock().unwrap().push(percent);
    }
}

#[derive(Debug)]
struct ScriptedProcessor {
    script: ProcessorScript,
    enable_calls: Arc<Mutex<Vec<Uuid>>>,
    releases: Arc<AtomicUsize>,
}

#[async_trait]
impl KilnProcessor for ScriptedProcessor {
    fn enable_table(&mut self, table: &KilnTableDescriptor) -> Result<()> {
        self.enable_calls.lock().unwrap().push(table.guid);
        if let Some(message) = self.script.enable_failures.get(&table.guid) {
            return Err(KilnError::internal(message.clone()));
        }
        Ok(())
    }

    fn metadata_tables(&mut self) -> Result<Vec<KilnBuiltTable>> {
        if let Some(message) = &self.script.metadata_error {
            return Err(KilnError::internal(message.clone()));
        }
        let descriptor = KilnTableDescriptor::new(Uuid::new_v4(), "Trace Info", "metadata");
        Ok(vec![KilnBuiltTable::new(descriptor, 1)])
    }

    fn source_info(&mut self) -> Result<Option<KilnSourceInfo>> {
        match self.script.source_info {
            SourceInfoBehavior::Nothing => Ok(None),
            SourceInfoBehavior::Known => Ok(Some(KilnSourceInfo {
                first_event: Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()),
                last_event: Some(Utc.with_ymd_and_hms(2026, 1, 1, 1, 0, 0).unwrap()),
                event_count: 1000,
            })),
            SourceInfoBehavior::Fails => Err(KilnError::internal("info retrieval failed")),
        }
    }

    async fn parse(
        &mut self,
        activated_cookers: &[KilnDataCookerPath],
        progress: Arc<dyn KilnProgress>,
        cancellation: KilnCancellationToken,
    ) -> Result<KilnCookedDataSet> {
        progress.report(50);
        if let Some(message) = &self.script.parse_error {
            return Err(KilnError::internal(message.clone()));
        }
        let mut cooked = KilnCookedDataSet::new();
        for path in activated_cookers {
            cooked.insert(
                path.clone(),
                json!({ "cancelled": cancellation.is_cancelled() }),
            );
        }
        progress.report(100);
        Ok(cooked)
    }

    fn build_table(&mut self, table: &KilnTableDescriptor) -> Result<KilnTableBuildOutcome> {
        Ok(KilnTableBuildOutcome::Built(KilnBuiltTable::new(
            table.clone(),
            7,
        )))
    }

    fn release(&mut self) -> Result<()> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug)]
struct ScriptedSource {
    script: ProcessorScript,
    enable_calls: Arc<Mutex<Vec<Uuid>>>,
    releases: Arc<AtomicUsize>,
}

impl KilnProcessingSource for ScriptedSource {
    fn info(&self) -> KilnProcessingSourceInfo {
        KilnProcessingSourceInfo::new("scripted", "Scripted", "scripted test plugin")
    }

    fn acceptance_rules(&self) -> Vec<KilnAcceptanceRule> {
        vec![KilnAcceptanceRule::file_extension("etl")]
    }

    fn cookers(&self) -> Vec<KilnCookerRegistration> {
        Vec::new()
    }

    fn tables(&self) -> Vec<KilnTableRegistration> {
        Vec::new()
    }

    fn supports(&self, _data_source: &KilnDataSource) -> Result<bool> {
        Ok(true)
    }

    fn create_processor(
        &self,
        _group: &KilnDataSourceGroup,
        _environment: &KilnProcessorEnvironment,
        _options: &KilnProcessorOptions,
    ) -> Option<Box<dyn KilnProcessor>> {
        Some(Box::new(ScriptedProcessor {
            script: self.script.clone(),
            enable_calls: self.enable_calls.clone(),
            releases: self.releases.clone(),
        }))
    }
}

fn scripted_context(
    script: ProcessorScript,
    tables: Vec<KilnTableDescriptor>,
) -> (KilnExecutionContext, Recorders) {
    let recorders = Recorders::default();
    let reference = Arc::new(
        KilnProcessingSourceReference::new(Arc::new(ScriptedSource {
            script,
            enable_calls: recorders.enable_calls.clone(),
            releases: recorders.releases.clone(),
        }))
        .expect("scripted reference"),
    );
    let context = KilnExecutionContext::new(
        Arc::new(RecordingProgress {
            reports: recorders.progress_reports.clone(),
        }),
        reference,
        KilnDataSourceGroup::new(vec![KilnDataSource::file("/traces/boot.etl")]),
        tables,
        KilnProcessorEnvironment::default(),
        KilnProcessorOptions::default(),
    );
    (context, recorders)
}

fn three_tables() -> Vec<KilnTableDescriptor> {
    vec![
        KilnTableDescriptor::new(Uuid::new_v4(), "Table1", "first"),
        KilnTableDescriptor::new(Uuid::new_v4(), "Table2", "second"),
        KilnTableDescriptor::new(Uuid::new_v4(), "Table3", "third"),
    ]
}

#[tokio::test]
async fn test_enable_failures_are_isolated_per_table() {
    let tables = three_tables();
    let failing = tables[1].guid;
    let script = ProcessorScript {
        enable_failures: HashMap::from([(failing, "attempted to divide by zero".to_string())]),
        ..Default::default()
    };
    let (context, recorders) = scripted_context(script, tables.clone());

    let mut executor = KilnExecutor::new();
    executor.initialize(context).await.unwrap();
    let result = executor
        .execute(Vec::new(), KilnCancellationToken::new())
        .await
        .unwrap();

    // all three enables were attempted despite the middle one failing
    let calls = recorders.enable_calls.lock().unwrap().clone();
    assert_eq!(calls, vec![tables[0].guid, tables[1].guid, tables[2].guid]);

    assert_eq!(result.enable_failures.len(), 1);
    let recorded = result.enable_failures.get(&failing).expect("failure for table2");
    assert!(recorded.to_string().contains("divide by zero"));
    assert_eq!(result.requested_tables.len(), 3);
    assert!(!result.faulted);
}

#[tokio::test]
async fn test_descriptive_info_defaults_when_absent() {
    let (context, _recorders) = scripted_context(ProcessorScript::default(), Vec::new());

    let mut executor = KilnExecutor::new();
    executor.initialize(context).await.unwrap();
    let result = executor
        .execute(Vec::new(), KilnCancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.source_info, KilnSourceInfoState::Default);
    assert!(result.source_info_failure.is_none());
    assert_eq!(result.source_info.value(), KilnSourceInfo::default());
}

#[tokio::test]
async fn test_descriptive_info_failure_is_recorded_separately() {
    let script = ProcessorScript {
        source_info: SourceInfoBehavior::Fails,
        ..Default::default()
    };
    let (context, _recorders) = scripted_context(script, Vec::new());

    let mut executor = KilnExecutor::new();
    executor.initialize(context).await.unwrap();
    let result = executor
        .execute(Vec::new(), KilnCancellationToken::new())
        .await
        .unwrap();

    // same default value, but the failure is observable
    assert_eq!(result.source_info, KilnSourceInfoState::Default);
    assert!(result.source_info_failure.is_some());
    assert!(!result.faulted);
}

#[tokio::test]
async fn test_known_descriptive_info_is_captured() {
    let script = ProcessorScript {
        source_info: SourceInfoBehavior::Known,
        ..Default::default()
    };
    let (context, _recorders) = scripted_context(script, Vec::new());

    let mut executor = KilnExecutor::new();
    executor.initialize(context).await.unwrap();
    let result = executor
        .execute(Vec::new(), KilnCancellationToken::new())
        .await
        .unwrap();

    match result.source_info {
        KilnSourceInfoState::Known(info) => assert_eq!(info.event_count, 1000),
        other => panic!("expected known info, got {:?}", other),
    }
}

#[tokio::test]
async fn test_parse_fault_sets_the_none_sentinel() {
    let script = ProcessorScript {
        source_info: SourceInfoBehavior::Known,
        parse_error: Some("trace file truncated".to_string()),
        ..Default::default()
    };
    let (context, _recorders) = scripted_context(script, Vec::new());

    let mut executor = KilnExecutor::new();
    executor.initialize(context).await.unwrap();
    let result = executor
        .execute(Vec::new(), KilnCancellationToken::new())
        .await
        .unwrap();

    assert!(result.faulted);
    assert!(result.fault.as_ref().unwrap().to_string().contains("truncated"));
    // the sentinel is NotAvailable, distinct from Default, even though the
    // info had been retrieved before parsing started
    assert_eq!(result.source_info, KilnSourceInfoState::NotAvailable);
    assert_ne!(result.source_info, KilnSourceInfoState::Default);
    assert_eq!(executor.state(), KilnExecutorState::Faulted);
    assert!(result.cooked.is_empty());
}

#[tokio::test]
async fn test_metadata_failure_does_not_stop_the_run() {
    let script = ProcessorScript {
        metadata_error: Some("metadata builder exploded".to_string()),
        ..Default::default()
    };
    let (context, _recorders) = scripted_context(script, Vec::new());

    let mut executor = KilnExecutor::new();
    executor.initialize(context).await.unwrap();
    let result = executor
        .execute(Vec::new(), KilnCancellationToken::new())
        .await
        .unwrap();

    assert!(result.metadata_failure.is_some());
    assert!(result.metadata_tables.is_empty());
    assert!(!result.faulted);
    assert_eq!(executor.state(), KilnExecutorState::Completed);
}

#[tokio::test]
async fn test_cooked_outputs_follow_activation() {
    let (context, _recorders) = scripted_context(ProcessorScript::default(), Vec::new());

    let activated = vec![
        KilnDataCookerPath::source("etw", "processes"),
        KilnDataCookerPath::source("etw", "threads"),
    ];
    let mut executor = KilnExecutor::new();
    executor.initialize(context).await.unwrap();
    let result = executor
        .execute(activated.clone(), KilnCancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.cooked.len(), 2);
    for path in &activated {
        assert!(result.cooked.contains_key(path));
    }
}

#[tokio::test]
async fn test_cancellation_is_cooperative() {
    let (context, _recorders) = scripted_context(ProcessorScript::default(), Vec::new());

    let token = KilnCancellationToken::new();
    token.cancel();

    let activated = vec![KilnDataCookerPath::source("etw", "processes")];
    let mut executor = KilnExecutor::new();
    executor.initialize(context).await.unwrap();
    let result = executor.execute(activated.clone(), token).await.unwrap();

    // the processor saw the signal but still ran to completion
    assert!(!result.faulted);
    assert_eq!(result.cooked[&activated[0]], json!({ "cancelled": true }));
}

#[tokio::test]
async fn test_progress_is_threaded_through_parse() {
    let (context, recorders) = scripted_context(ProcessorScript::default(), Vec::new());

    let mut executor = KilnExecutor::new();
    executor.initialize(context).await.unwrap();
    executor
        .execute(Vec::new(), KilnCancellationToken::new())
        .await
        .unwrap();

    let reports = recorders.progress_reports.lock().unwrap().clone();
    assert_eq!(reports, vec![50, 100]);
}

#[tokio::test]
async fn test_metadata_tables_are_captured() {
    let (context, _recorders) = scripted_context(ProcessorScript::default(), Vec::new());

    let mut executor = KilnExecutor::new();
    executor.initialize(context).await.unwrap();
    let result = executor
        .execute(Vec::new(), KilnCancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.metadata_tables.len(), 1);
    assert!(result.metadata_failure.is_none());
    assert_eq!(result.metadata_tables[0].descriptor.name, "Trace Info");
}
