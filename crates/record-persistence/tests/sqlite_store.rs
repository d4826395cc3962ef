use chrono::{Duration, Utc};
use record_persistence::{new_sqlite_for_test, DieselLocalStore};
use record_store::{EntityStore, JobStore, OperationLog, PendingOperationQueue, StoreError};
use sample_domain::{DetailRow, DetailTable, EntityMutation, EntityTable, FileNode, JobKey, JobState, Mutation,
                    ProcessingJob, SampleGroup, Syncable};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

fn tmp_db() -> PathBuf {
  std::env::temp_dir().join(format!("poleshift_test_{}.db", Uuid::new_v4()))
}

fn cleanup(path: &PathBuf) {
  let _ = std::fs::remove_file(path);
  let _ = std::fs::remove_file(path.with_extension("db-wal"));
  let _ = std::fs::remove_file(path.with_extension("db-shm"));
}

fn notes_update(id: &str, notes: &str) -> EntityMutation {
  let mut updates = serde_json::Map::new();
  updates.insert("notes".into(), json!(notes));
  EntityMutation::update(EntityTable::SampleGroup, id, updates)
}

fn rows(job: &ProcessingJob, table: DetailTable, n: i64) -> Vec<DetailRow> {
  (0..n).map(|i| DetailRow { id: Uuid::new_v4(),
                             job_id: job.id,
                             table,
                             data_id: job.raw_data_id,
                             ordinal: i,
                             data: json!({"pressure": i}) })
        .collect()
}

#[test]
fn queue_survives_restart_in_fifo_order() {
  let path = tmp_db();
  let (a, c) = {
    let store = Arc::new(new_sqlite_for_test(&path).expect("open store"));
    let queue = PendingOperationQueue::new(store.clone()).expect("queue");
    let a = queue.enqueue(notes_update("s1", "first")).unwrap();
    let b = queue.enqueue(EntityMutation::delete(EntityTable::FileNode, "n9")).unwrap();
    let c = queue.enqueue(notes_update("s2", "third")).unwrap();
    assert!(queue.remove(&b.id).unwrap());
    (a, c)
  };

  // Reabrir el mismo fichero simula un reinicio del proceso.
  let store = Arc::new(new_sqlite_for_test(&path).expect("reopen store"));
  let queue = PendingOperationQueue::new(store.clone()).expect("queue after restart");
  let listed = queue.list_all().unwrap();
  assert_eq!(listed.len(), 2);
  assert_eq!(listed[0].id, a.id);
  assert_eq!(listed[0].mutation, a.mutation);
  assert_eq!(listed[0].enqueued_at, a.enqueued_at);
  assert_eq!(listed[1].id, c.id);

  let d = queue.enqueue(notes_update("s3", "after restart")).unwrap();
  assert!(d.enqueued_at > c.enqueued_at);
  assert!(!queue.remove(&Uuid::new_v4()).unwrap());
  drop(queue);
  drop(store);
  cleanup(&path);
}

#[test]
fn duplicate_operation_id_is_a_conflict() {
  let path = tmp_db();
  let store = new_sqlite_for_test(&path).unwrap();
  let op = sample_domain::PendingOperation::new(notes_update("s1", "x"), Utc::now());
  store.append_operation(&op).unwrap();
  assert!(matches!(store.append_operation(&op), Err(StoreError::Conflict(_))));
  drop(store);
  cleanup(&path);
}

#[test]
fn entities_round_trip_and_overwrite() {
  let path = tmp_db();
  let store = new_sqlite_for_test(&path).unwrap();
  let group = SampleGroup::new("Station 7", "org-1").unwrap().with_id("s7").with_notes("cast 1");
  let rec = group.to_record().unwrap();
  store.put_entity(&rec).unwrap();
  assert_eq!(store.get_entity(EntityTable::SampleGroup, "s7").unwrap(), Some(rec.clone()));
  assert!(store.get_entity(EntityTable::FileNode, "s7").unwrap().is_none());

  let mut newer = rec.clone();
  let mut updates = serde_json::Map::new();
  updates.insert("notes".into(), json!("cast 2"));
  newer.apply_updates(&updates, rec.updated_at + Duration::seconds(1)).unwrap();
  store.put_entity(&newer).unwrap();
  let listed = store.list_entities(EntityTable::SampleGroup).unwrap();
  assert_eq!(listed, vec![newer]);

  let node = FileNode::for_sample_group("s7", "Station 7", "org-1", None).unwrap();
  store.put_entity(&node.to_record().unwrap()).unwrap();
  assert_eq!(store.list_entities(EntityTable::FileNode).unwrap().len(), 1);

  assert!(store.delete_entity(EntityTable::SampleGroup, "s7").unwrap());
  assert!(!store.delete_entity(EntityTable::SampleGroup, "s7").unwrap());
  drop(store);
  cleanup(&path);
}

#[test]
fn job_lifecycle_batches_and_cascade() {
  let path = tmp_db();
  let store: DieselLocalStore = new_sqlite_for_test(&path).unwrap();
  assert_eq!(store.max_rows_per_statement(), 166);

  let mut job = ProcessingJob::placeholder(&JobKey::new("s1", "cfg-ctd"), "ctd_data", "u1", "o1");
  store.insert_job(&job).unwrap();
  assert!(matches!(store.insert_job(&job), Err(StoreError::Conflict(_))));

  job.transition(JobState::Processing, "Processing").unwrap();
  job.record_progress(35, "reading casts");
  store.update_job(&job).unwrap();
  let loaded = store.get_job(&job.id).unwrap().expect("job row");
  assert_eq!(loaded.state, JobState::Processing);
  assert_eq!(loaded.progress_percentage, 35);
  assert_eq!(loaded.status_message, "reading casts");
  assert_eq!(loaded.raw_data_id, job.raw_data_id);

  let raw = rows(&job, DetailTable::Raw, 200);
  assert!(matches!(store.insert_detail_batch(&raw), Err(StoreError::Conflict(_))));
  assert_eq!(store.insert_detail_batch(&raw[..166]).unwrap(), 166);
  assert_eq!(store.insert_detail_batch(&raw[166..]).unwrap(), 34);
  store.insert_detail_batch(&rows(&job, DetailTable::Processed, 5)).unwrap();
  assert_eq!(store.count_details(&job.id, None).unwrap(), 205);
  assert_eq!(store.count_details(&job.id, Some(DetailTable::Processed)).unwrap(), 5);
  let read = store.read_details(&job.id, DetailTable::Raw).unwrap();
  assert_eq!(read.len(), 200);
  assert_eq!(read[10].ordinal, 10);
  assert_eq!(read[10].data, json!({"pressure": 10}));

  assert_eq!(store.list_jobs(Some("s1")).unwrap().len(), 1);
  assert!(store.list_jobs(Some("other")).unwrap().is_empty());

  store.delete_job(&job.id).unwrap();
  assert_eq!(store.count_details(&job.id, None).unwrap(), 0);
  assert!(store.get_job(&job.id).unwrap().is_none());
  assert!(matches!(store.delete_job(&job.id), Err(StoreError::NotFound(_))));
  assert!(matches!(store.update_job(&job), Err(StoreError::NotFound(_))));
  drop(store);
  cleanup(&path);
}

#[test]
fn detail_rows_for_unknown_job_are_rejected() {
  let path = tmp_db();
  let store = new_sqlite_for_test(&path).unwrap();
  let ghost = ProcessingJob::placeholder(&JobKey::new("s1", "cfg"), "ctd_data", "u1", "o1");
  let res = store.insert_detail_batch(&rows(&ghost, DetailTable::Raw, 2));
  assert!(matches!(res, Err(StoreError::NotFound(_))));
  drop(store);
  cleanup(&path);
}

#[test]
fn typed_mutations_survive_serialization_in_the_log() {
  let path = tmp_db();
  let store = Arc::new(new_sqlite_for_test(&path).unwrap());
  let queue = PendingOperationQueue::new(store.clone()).unwrap();
  let group = SampleGroup::new("Station 9", "org-2").unwrap();
  let op = queue.enqueue(Mutation::upsert(group.clone()).into()).unwrap();
  let listed = store.list_operations().unwrap();
  match &listed[0].mutation {
    EntityMutation::SampleGroup(Mutation::Upsert { record }) => assert_eq!(record, &group),
    other => panic!("unexpected {:?}", other),
  }
  assert_eq!(listed[0].id, op.id);
  drop(queue);
  drop(store);
  cleanup(&path);
}
