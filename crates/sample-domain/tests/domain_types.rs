use chrono::{Duration, Utc};
use sample_domain::{DomainError, EntityMutation, EntityRecord, EntityTable, JobKey, JobState, LocalEffect, Mutation,
                    OperationKind, PendingOperation, ProcessingJob, SampleGroup, Syncable, WorkerResult};
use serde_json::json;

#[test]
fn pending_operation_serializes_table_and_kind_tags() {
  let mut updates = serde_json::Map::new();
  updates.insert("notes".into(), json!("x"));
  let op = PendingOperation::new(EntityMutation::update(EntityTable::SampleGroup, "s1", updates), Utc::now());
  assert_eq!(op.kind(), OperationKind::Update);
  assert_eq!(op.entity_table(), EntityTable::SampleGroup);
  assert_eq!(op.target_id(), "s1");

  let v = serde_json::to_value(&op.mutation).unwrap();
  assert_eq!(v["entity_table"], json!("sample_group"));
  assert_eq!(v["mutation"]["kind"], json!("update"));
  assert_eq!(v["mutation"]["id"], json!("s1"));
  assert_eq!(v["mutation"]["updates"]["notes"], json!("x"));

  let back: EntityMutation = serde_json::from_value(v).unwrap();
  assert_eq!(back, op.mutation);
}

#[test]
fn update_effect_merges_fields_and_bumps_recency() {
  let group = SampleGroup::new("Station 4", "org-1").unwrap().with_id("s1");
  let current = group.to_record().unwrap();
  let later = current.updated_at + Duration::seconds(5);

  let mut updates = serde_json::Map::new();
  updates.insert("notes".into(), json!("ice core"));
  updates.insert("id".into(), json!("hijack"));
  let m: Mutation<SampleGroup> = Mutation::update("s1", updates);
  match m.local_effect(Some(&current), later).unwrap() {
    LocalEffect::Put(rec) => {
      assert_eq!(rec.id, "s1");
      assert_eq!(rec.data["notes"], json!("ice core"));
      assert_eq!(rec.data["id"], json!("s1"));
      assert_eq!(rec.updated_at, later);
      let typed = SampleGroup::from_record(&rec).unwrap();
      assert_eq!(typed.notes.as_deref(), Some("ice core"));
    }
    other => panic!("unexpected effect {:?}", other),
  }

  let missing = m.local_effect(None, later).unwrap();
  assert_eq!(missing, LocalEffect::Missing { table: EntityTable::SampleGroup, id: "s1".into() });
}

#[test]
fn stamp_sets_updated_at_on_records_and_patches() {
  let ts = Utc::now() + Duration::minutes(1);
  let group = SampleGroup::new("Station 5", "org-1").unwrap();
  let mut insert: EntityMutation = Mutation::insert(group.clone()).into();
  insert.stamp(ts);
  match insert {
    EntityMutation::SampleGroup(Mutation::Insert { record }) => assert_eq!(record.updated_at, ts),
    other => panic!("unexpected {:?}", other),
  }

  let mut patch = EntityMutation::update(EntityTable::FileNode, "n1", serde_json::Map::new());
  patch.stamp(ts);
  match patch {
    EntityMutation::FileNode(Mutation::Update { updates, .. }) => {
      assert_eq!(updates["updated_at"], json!(ts.to_rfc3339()));
    }
    other => panic!("unexpected {:?}", other),
  }
}

#[test]
fn entity_record_from_json_requires_id_and_timestamp() {
  let ok = EntityRecord::from_json(EntityTable::FileNode,
                                   json!({"id": "n1", "updated_at": "2024-03-01T10:00:00Z"})).unwrap();
  assert_eq!(ok.id, "n1");

  let no_id = EntityRecord::from_json(EntityTable::FileNode, json!({"updated_at": "2024-03-01T10:00:00Z"}));
  assert!(matches!(no_id, Err(DomainError::ValidationError(_))));

  let bad_ts = EntityRecord::from_json(EntityTable::FileNode, json!({"id": "n1", "updated_at": "yesterday"}));
  assert!(matches!(bad_ts, Err(DomainError::ValidationError(_))));
}

#[test]
fn job_state_machine_rejects_skips_and_leaving_terminal_states() {
  let mut job = ProcessingJob::placeholder(&JobKey::new("s1", "ctd"), "ctd_data", "u1", "o1");
  assert_eq!(job.state, JobState::Initiated);
  assert!(job.transition(JobState::Saving, "skip").is_err());
  job.transition(JobState::Processing, "Processing").unwrap();
  job.transition(JobState::Saving, "Saving").unwrap();
  job.transition(JobState::Complete, "Complete").unwrap();
  assert_eq!(job.progress_percentage, 100);
  assert!(job.transition(JobState::Error, "late failure").is_err());
}

#[test]
fn progress_never_regresses() {
  let mut job = ProcessingJob::placeholder(&JobKey::new("s1", "ctd"), "ctd_data", "u1", "o1");
  assert!(job.record_progress(40, "reading"));
  assert!(!job.record_progress(20, "stale"));
  assert_eq!(job.progress_percentage, 40);
  assert_eq!(job.status_message, "reading");
  assert!(job.record_progress(250, "overflow"));
  assert_eq!(job.progress_percentage, 100);
}

#[test]
fn worker_result_success_is_case_insensitive() {
  let mut r = WorkerResult::success(vec![json!({"a": 1})], vec![]);
  assert!(r.is_success());
  r.status = "SUCCESS ".into();
  assert!(r.is_success());
  r.status = "failed".into();
  assert!(!r.is_success());
  assert!(!r.is_empty());
}
