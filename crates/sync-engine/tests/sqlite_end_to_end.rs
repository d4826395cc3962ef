use async_trait::async_trait;
use record_persistence::new_sqlite_for_test;
use record_store::stubs::InMemoryRemoteStore;
use record_store::{EntityStore, JobStore, LocalStore};
use sample_domain::{DetailTable, EntityMutation, EntityTable, JobKey, JobState, Mutation, ProgressEvent, SampleGroup,
                    Syncable, WorkerRequest, WorkerResult};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use sync_engine::{ConnectivitySignal, DataType, NativeWorker, ProcessRequest, ProcessingConfig, ProcessingCoordinator,
                  ProcessingError, ProgressSink, SubmitOutcome, SyncManager};
use tokio_test::{assert_err, assert_ok};

fn tmp_db() -> PathBuf {
  std::env::temp_dir().join(format!("poleshift_e2e_{}.db", uuid::Uuid::new_v4()))
}

fn cleanup(path: &PathBuf) {
  for p in [path.clone(), path.with_extension("db-wal"), path.with_extension("db-shm")] {
    let _ = std::fs::remove_file(p);
  }
}

struct CtdWorker;

#[async_trait]
impl NativeWorker for CtdWorker {
  async fn invoke(&self, request: WorkerRequest, progress: ProgressSink) -> Result<WorkerResult, ProcessingError> {
    progress.emit(ProgressEvent::new(50, "parsing casts")).await;
    let raw = (0..400).map(|i| json!({"depth": i, "sample": request.sample_id})).collect();
    let processed = (0..40).map(|i| json!({"bin": i})).collect();
    Ok(WorkerResult::success(raw, processed))
  }
}

#[tokio::test]
async fn offline_edits_survive_restart_and_reach_remote() {
  let path = tmp_db();
  let remote = Arc::new(InMemoryRemoteStore::new());
  let group = SampleGroup::new("Station 12", "org-1").unwrap().with_id("sg-12");

  {
    let local = Arc::new(new_sqlite_for_test(&path).unwrap());
    let signal = Arc::new(ConnectivitySignal::new(false));
    let manager = SyncManager::new(local.clone(), remote.clone(), signal.clone()).unwrap();

    let created = assert_ok!(manager.submit(Mutation::insert(group.clone()).into()).await);
    assert!(matches!(created, SubmitOutcome::Queued(_)));
    let mut updates = serde_json::Map::new();
    updates.insert("notes".into(), json!("ice at 2 m"));
    assert_ok!(manager.submit(EntityMutation::update(EntityTable::SampleGroup, "sg-12", updates)).await);
    assert_eq!(manager.pending_count().unwrap(), 2);
    assert!(remote.get(EntityTable::SampleGroup, "sg-12").is_none());
  }

  // Reinicio: la cola sigue en SQLite.
  let local = Arc::new(new_sqlite_for_test(&path).unwrap());
  let signal = Arc::new(ConnectivitySignal::new(true));
  let manager = SyncManager::new(local.clone(), remote.clone(), signal.clone()).unwrap();
  assert_eq!(manager.pending_count().unwrap(), 2);

  let report = assert_ok!(manager.full_reconcile(&EntityTable::ALL).await);
  assert_eq!(report.drain.applied, 2);
  assert_eq!(report.drain.remaining, 0);

  let remote_copy = remote.get(EntityTable::SampleGroup, "sg-12").expect("remote record");
  assert_eq!(remote_copy.data["notes"], json!("ice at 2 m"));
  let local_copy = local.get_entity(EntityTable::SampleGroup, "sg-12").unwrap().unwrap();
  assert_eq!(SampleGroup::from_record(&local_copy).unwrap().id(), "sg-12");
  assert_eq!(local_copy.data["notes"], json!("ice at 2 m"));

  drop(manager);
  drop(local);
  cleanup(&path);
}

#[tokio::test]
async fn processing_commits_into_sqlite_in_batches() {
  let path = tmp_db();
  let local = Arc::new(new_sqlite_for_test(&path).unwrap());
  let coordinator = ProcessingCoordinator::new(local.clone() as Arc<dyn LocalStore>, ProcessingConfig::default());
  let request = ProcessRequest { data_type: DataType::CtdData,
                                 user_id: "u1".into(),
                                 org_id: "o1".into(),
                                 file_paths: vec!["/data/cast_12.rsk".into()],
                                 inputs: json!({}) };

  let outcome = assert_ok!(coordinator.process(JobKey::new("sg-12", "ctd-default"), Arc::new(CtdWorker), request.clone()).await);
  // 400 filas raw con lotes de 150: 150 + 150 + 100; 40 procesadas en uno.
  assert_eq!(outcome.committed.batches, 4);

  let job = local.get_job(&outcome.job.id).unwrap().unwrap();
  assert_eq!(job.state, JobState::Complete);
  assert_eq!(job.progress_percentage, 100);
  assert_eq!(local.count_details(&job.id, Some(DetailTable::Raw)).unwrap(), 400);
  assert_eq!(local.count_details(&job.id, Some(DetailTable::Processed)).unwrap(), 40);

  let no_files = ProcessRequest { file_paths: vec![], ..request };
  assert_err!(coordinator.process(JobKey::new("sg-12", "ctd-other"), Arc::new(CtdWorker), no_files).await);
  assert_eq!(coordinator.jobs_for_sample("sg-12").unwrap().len(), 1);

  assert_ok!(coordinator.delete_job(&job.id));
  assert_eq!(local.count_details(&job.id, None).unwrap(), 0);

  drop(coordinator);
  drop(local);
  cleanup(&path);
}
