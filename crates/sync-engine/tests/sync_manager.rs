use async_trait::async_trait;
use chrono::{Duration, Utc};
use record_store::stubs::{InMemoryLocalStore, InMemoryRemoteStore, RemoteCall};
use record_store::{EntityStore, RemoteStore, StoreError};
use sample_domain::{EntityMutation, EntityRecord, EntityTable, Mutation, SampleGroup, Syncable, UserSetting};
use serde_json::json;
use std::sync::Arc;
use sync_engine::{ConnectivitySignal, SkipReason, SubmitOutcome, SyncError, SyncManager};
use tokio::sync::Semaphore;

struct Harness {
  local: Arc<InMemoryLocalStore>,
  remote: Arc<InMemoryRemoteStore>,
  signal: Arc<ConnectivitySignal>,
  manager: Arc<SyncManager>,
}

fn harness(online: bool) -> Harness {
  let local = Arc::new(InMemoryLocalStore::new());
  let remote = Arc::new(InMemoryRemoteStore::new());
  let signal = Arc::new(ConnectivitySignal::new(online));
  let manager = Arc::new(SyncManager::new(local.clone(), remote.clone(), signal.clone()).expect("manager"));
  Harness { local, remote, signal, manager }
}

fn group(id: &str) -> EntityRecord {
  SampleGroup::new("Station", "org-1").unwrap().with_id(id).to_record().unwrap()
}

fn seed_both(h: &Harness, id: &str) -> EntityRecord {
  let rec = group(id);
  h.local.put_entity(&rec).unwrap();
  h.remote.seed(rec.clone());
  rec
}

fn notes_update(id: &str, notes: &str) -> EntityMutation {
  let mut updates = serde_json::Map::new();
  updates.insert("notes".into(), json!(notes));
  EntityMutation::update(EntityTable::SampleGroup, id, updates)
}

#[tokio::test]
async fn offline_edit_is_queued_then_drained_once_online() {
  let h = harness(false);
  seed_both(&h, "s1");

  let outcome = h.manager.submit(notes_update("s1", "x")).await.unwrap();
  assert!(matches!(outcome, SubmitOutcome::Queued(_)));
  assert_eq!(h.manager.pending_count().unwrap(), 1);
  let local = h.local.get_entity(EntityTable::SampleGroup, "s1").unwrap().unwrap();
  assert_eq!(local.data["notes"], json!("x"));
  assert!(h.remote.write_calls().is_empty());

  h.signal.set_online(true);
  let report = h.manager.drain_pending_operations().await.unwrap();
  assert_eq!(report.applied, 1);
  assert_eq!(report.remaining, 0);
  assert_eq!(h.remote.write_calls(),
             vec![RemoteCall::Patch { table: EntityTable::SampleGroup, id: "s1".into() }]);
  assert_eq!(h.manager.pending_count().unwrap(), 0);

  let remote = h.remote.get(EntityTable::SampleGroup, "s1").unwrap();
  assert_eq!(remote.data["notes"], json!("x"));
  assert_eq!(remote.updated_at, local.updated_at);
}

#[tokio::test]
async fn drain_offline_is_skipped_not_failed() {
  let h = harness(false);
  seed_both(&h, "s1");
  h.manager.submit(notes_update("s1", "x")).await.unwrap();

  let report = h.manager.drain_pending_operations().await.unwrap();
  assert_eq!(report.skipped, Some(SkipReason::Offline));
  assert_eq!(h.manager.pending_count().unwrap(), 1);
  assert!(h.remote.calls().is_empty());
}

#[tokio::test]
async fn failed_operation_stays_queued_and_clears_on_next_pass() {
  let h = harness(false);
  for id in ["s1", "s2", "s3"] {
    seed_both(&h, id);
    h.manager.submit(notes_update(id, "cast")).await.unwrap();
  }
  let second = h.manager.queue().list_all().unwrap()[1].id;

  h.remote.fail_on(EntityTable::SampleGroup, "s2");
  h.signal.set_online(true);
  let first_pass = h.manager.drain_pending_operations().await.unwrap();
  assert_eq!(first_pass.applied, 2);
  assert_eq!(first_pass.failed.len(), 1);
  assert_eq!(first_pass.failed[0].0, second);
  assert_eq!(first_pass.remaining, 1);
  assert!(matches!(first_pass.ensure_clean(), Err(SyncError::PartialDrain { failed: 1, .. })));
  assert_eq!(h.manager.queue().list_all().unwrap()[0].id, second);

  h.remote.clear_failures();
  let second_pass = h.manager.drain_pending_operations().await.unwrap();
  assert_eq!(second_pass.applied, 1);
  assert!(second_pass.ensure_clean().is_ok());
  assert_eq!(h.manager.pending_count().unwrap(), 0);

  let patches = h.remote
                 .write_calls()
                 .into_iter()
                 .filter(|c| matches!(c, RemoteCall::Patch { id, .. } if id == "s1"))
                 .count();
  assert_eq!(patches, 1, "s1 is not re-applied on the second pass");
}

#[tokio::test]
async fn online_submit_bypasses_the_queue() {
  let h = harness(true);
  let setting = UserSetting::new("u1", "theme", json!("dark")).unwrap();
  let outcome = h.manager.submit(Mutation::insert(setting.clone()).into()).await.unwrap();
  assert_eq!(outcome, SubmitOutcome::Sent);
  assert_eq!(h.manager.pending_count().unwrap(), 0);
  assert!(h.remote.get(EntityTable::UserSetting, setting.id()).is_some());
  assert!(h.local.get_entity(EntityTable::UserSetting, setting.id()).unwrap().is_some());
}

#[tokio::test]
async fn rejected_direct_send_falls_back_to_queue() {
  let h = harness(true);
  seed_both(&h, "s1");
  h.remote.fail_on(EntityTable::SampleGroup, "s1");
  let outcome = h.manager.submit(notes_update("s1", "retry me")).await.unwrap();
  assert!(matches!(outcome, SubmitOutcome::Queued(_)));
  assert_eq!(h.manager.pending_count().unwrap(), 1);
}

#[tokio::test]
async fn upsert_checks_existence_before_writing() {
  let h = harness(false);
  let existing = SampleGroup::new("Existing", "org-1").unwrap().with_id("s1");
  h.remote.seed(existing.to_record().unwrap());
  let fresh = SampleGroup::new("Fresh", "org-1").unwrap().with_id("s2");
  h.manager.submit(Mutation::upsert(existing.with_notes("edited")).into()).await.unwrap();
  h.manager.submit(Mutation::upsert(fresh).into()).await.unwrap();

  h.signal.set_online(true);
  h.manager.drain_pending_operations().await.unwrap();
  assert_eq!(h.remote.calls(),
             vec![RemoteCall::Exists { table: EntityTable::SampleGroup, id: "s1".into() },
                  RemoteCall::Patch { table: EntityTable::SampleGroup, id: "s1".into() },
                  RemoteCall::Exists { table: EntityTable::SampleGroup, id: "s2".into() },
                  RemoteCall::Create { table: EntityTable::SampleGroup, id: "s2".into() }]);
  assert_eq!(h.remote.get(EntityTable::SampleGroup, "s1").unwrap().data["notes"], json!("edited"));
}

#[tokio::test]
async fn reconcile_keeps_the_strictly_newer_copy() {
  let h = harness(true);
  let t1 = Utc::now() - Duration::hours(2);
  let t2 = t1 + Duration::hours(1);

  // s1: remoto más reciente -> se importa.
  let mut local_s1 = group("s1");
  local_s1.apply_updates(&serde_json::Map::new(), t1).unwrap();
  let mut remote_s1 = local_s1.clone();
  let mut patch = serde_json::Map::new();
  patch.insert("notes".into(), json!("from remote"));
  remote_s1.apply_updates(&patch, t2).unwrap();
  h.local.put_entity(&local_s1).unwrap();
  h.remote.seed(remote_s1.clone());

  // s2: local más reciente -> se conserva.
  let mut remote_s2 = group("s2");
  remote_s2.apply_updates(&serde_json::Map::new(), t1).unwrap();
  let mut local_s2 = remote_s2.clone();
  let mut patch = serde_json::Map::new();
  patch.insert("notes".into(), json!("local wins"));
  local_s2.apply_updates(&patch, t2).unwrap();
  h.local.put_entity(&local_s2).unwrap();
  h.remote.seed(remote_s2);

  // s3: sólo remoto -> se importa.
  h.remote.seed(group("s3"));

  let report = h.manager.full_reconcile(&[EntityTable::SampleGroup]).await.unwrap();
  assert_eq!(report.imported, 2);
  assert_eq!(report.unchanged, 1);
  assert_eq!(h.local.get_entity(EntityTable::SampleGroup, "s1").unwrap(), Some(remote_s1));
  assert_eq!(h.local.get_entity(EntityTable::SampleGroup, "s2").unwrap(), Some(local_s2));
  assert!(h.local.get_entity(EntityTable::SampleGroup, "s3").unwrap().is_some());
}

#[tokio::test]
async fn reconcile_keeps_local_copy_on_equal_timestamps() {
  let h = harness(true);
  let ts = Utc::now() - Duration::minutes(30);
  let mut local = group("s1");
  let mut patch = serde_json::Map::new();
  patch.insert("notes".into(), json!("local"));
  local.apply_updates(&patch, ts).unwrap();
  let mut remote = local.clone();
  let mut patch = serde_json::Map::new();
  patch.insert("notes".into(), json!("remote"));
  remote.apply_updates(&patch, ts).unwrap();
  assert_eq!(local.updated_at, remote.updated_at);
  h.local.put_entity(&local).unwrap();
  h.remote.seed(remote);

  let report = h.manager.full_reconcile(&[EntityTable::SampleGroup]).await.unwrap();
  assert_eq!(report.imported, 0);
  assert_eq!(report.unchanged, 1);
  assert_eq!(h.local.get_entity(EntityTable::SampleGroup, "s1").unwrap(), Some(local));
}

#[tokio::test]
async fn reconcile_deletes_every_local_only_record() {
  let h = harness(true);
  seed_both(&h, "s1");
  h.local.put_entity(&group("gone")).unwrap();

  // El alta de s9 sigue en cola porque el remoto la rechaza; el remoto
  // manda igualmente y la copia local desaparece.
  h.remote.fail_on(EntityTable::SampleGroup, "s9");
  let s9 = SampleGroup::new("Pending", "org-1").unwrap().with_id("s9");
  h.manager.submit(Mutation::insert(s9).into()).await.unwrap();

  let report = h.manager.full_reconcile(&EntityTable::ALL).await.unwrap();
  assert_eq!(report.deleted, 2);
  assert_eq!(report.drain.failed.len(), 1);
  assert_eq!(h.manager.pending_count().unwrap(), 1);
  assert!(h.local.get_entity(EntityTable::SampleGroup, "gone").unwrap().is_none());
  assert!(h.local.get_entity(EntityTable::SampleGroup, "s9").unwrap().is_none());
  assert!(h.local.get_entity(EntityTable::SampleGroup, "s1").unwrap().is_some());
}

#[tokio::test]
async fn newer_remote_overwrites_local_edit_still_in_queue() {
  let h = harness(false);
  seed_both(&h, "s1");
  h.manager.submit(notes_update("s1", "local")).await.unwrap();
  let local = h.local.get_entity(EntityTable::SampleGroup, "s1").unwrap().unwrap();

  let mut remote = local.clone();
  let mut patch = serde_json::Map::new();
  patch.insert("notes".into(), json!("remote"));
  remote.apply_updates(&patch, local.updated_at + Duration::hours(1)).unwrap();
  h.remote.seed(remote.clone());
  h.remote.fail_on(EntityTable::SampleGroup, "s1");
  h.signal.set_online(true);

  let report = h.manager.full_reconcile(&[EntityTable::SampleGroup]).await.unwrap();
  assert_eq!(report.drain.failed.len(), 1);
  assert_eq!(report.imported, 1);
  assert_eq!(h.local.get_entity(EntityTable::SampleGroup, "s1").unwrap(), Some(remote));
}

#[tokio::test]
async fn reconcile_drains_before_fetching() {
  let h = harness(false);
  seed_both(&h, "s1");
  h.manager.submit(notes_update("s1", "offline edit")).await.unwrap();
  h.signal.set_online(true);

  let report = h.manager.full_reconcile(&[EntityTable::SampleGroup]).await.unwrap();
  assert_eq!(report.drain.applied, 1);
  let calls = h.remote.calls();
  assert!(matches!(calls[0], RemoteCall::Patch { .. }));
  assert!(matches!(calls[1], RemoteCall::FetchAll { table: EntityTable::SampleGroup }));
  let local = h.local.get_entity(EntityTable::SampleGroup, "s1").unwrap().unwrap();
  assert_eq!(local.data["notes"], json!("offline edit"));
}

/// Store remoto que bloquea cada `patch` hasta recibir un permiso.
struct GatedRemote {
  inner: InMemoryRemoteStore,
  gate: Semaphore,
}

#[async_trait]
impl RemoteStore for GatedRemote {
  async fn create(&self, table: EntityTable, record: &EntityRecord) -> Result<(), StoreError> {
    self.inner.create(table, record).await
  }

  async fn patch(&self,
                 table: EntityTable,
                 id: &str,
                 updates: &serde_json::Map<String, serde_json::Value>)
                 -> Result<(), StoreError> {
    let permit = self.gate.acquire().await.map_err(|e| StoreError::Other(e.to_string()))?;
    permit.forget();
    self.inner.patch(table, id, updates).await
  }

  async fn remove(&self, table: EntityTable, id: &str) -> Result<(), StoreError> {
    self.inner.remove(table, id).await
  }

  async fn exists(&self, table: EntityTable, id: &str) -> Result<bool, StoreError> {
    self.inner.exists(table, id).await
  }

  async fn fetch_all(&self, table: EntityTable) -> Result<Vec<EntityRecord>, StoreError> {
    self.inner.fetch_all(table).await
  }
}

#[tokio::test]
async fn concurrent_sync_calls_return_immediately() {
  let local = Arc::new(InMemoryLocalStore::new());
  let remote = Arc::new(GatedRemote { inner: InMemoryRemoteStore::new(), gate: Semaphore::new(0) });
  let signal = Arc::new(ConnectivitySignal::new(false));
  let manager = Arc::new(SyncManager::new(local.clone(), remote.clone(), signal.clone()).unwrap());

  let rec = group("s1");
  local.put_entity(&rec).unwrap();
  remote.inner.seed(rec);
  manager.submit(notes_update("s1", "slow")).await.unwrap();
  signal.set_online(true);

  let running = {
    let manager = manager.clone();
    tokio::spawn(async move { manager.drain_pending_operations().await })
  };
  while !manager.is_syncing() {
    tokio::task::yield_now().await;
  }

  let second = manager.drain_pending_operations().await.unwrap();
  assert_eq!(second.skipped, Some(SkipReason::AlreadyRunning));
  let reconcile = manager.full_reconcile(&EntityTable::ALL).await.unwrap();
  assert_eq!(reconcile.skipped, Some(SkipReason::AlreadyRunning));

  remote.gate.add_permits(1);
  let first = running.await.unwrap().unwrap();
  assert_eq!(first.applied, 1);
  assert!(!manager.is_syncing());
}

#[tokio::test]
async fn reconnecting_triggers_drain_and_reconcile() {
  let h = harness(false);
  seed_both(&h, "s1");
  h.remote.seed(group("remote-only"));
  h.manager.submit(notes_update("s1", "while offline")).await.unwrap();

  let watcher = {
    let manager = h.manager.clone();
    let rx = h.signal.subscribe();
    tokio::spawn(async move { manager.watch_connectivity(rx, vec![EntityTable::SampleGroup]).await })
  };
  // Deja que el watcher registre el estado inicial (desconectado).
  tokio::task::yield_now().await;

  h.signal.set_online(true);
  let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
  loop {
    let imported = h.local.get_entity(EntityTable::SampleGroup, "remote-only").unwrap().is_some();
    if imported && h.manager.pending_count().unwrap() == 0 {
      break;
    }
    assert!(tokio::time::Instant::now() < deadline, "reconnect sync did not run");
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
  }
  assert_eq!(h.remote.get(EntityTable::SampleGroup, "s1").unwrap().data["notes"], json!("while offline"));
  watcher.abort();
}

#[tokio::test]
async fn reconnect_during_manual_drain_reconciles_once_it_finishes() {
  let local = Arc::new(InMemoryLocalStore::new());
  let remote = Arc::new(GatedRemote { inner: InMemoryRemoteStore::new(), gate: Semaphore::new(0) });
  let signal = Arc::new(ConnectivitySignal::new(true));
  let manager = Arc::new(SyncManager::new(local.clone(), remote.clone(), signal.clone()).unwrap());

  let rec = group("s1");
  local.put_entity(&rec).unwrap();
  remote.inner.seed(rec);
  remote.inner.seed(group("remote-only"));
  signal.set_online(false);
  manager.submit(notes_update("s1", "slow")).await.unwrap();
  signal.set_online(true);

  let watcher = {
    let manager = manager.clone();
    let rx = signal.subscribe();
    tokio::spawn(async move { manager.watch_connectivity(rx, vec![EntityTable::SampleGroup]).await })
  };
  let running = {
    let manager = manager.clone();
    tokio::spawn(async move { manager.drain_pending_operations().await })
  };
  while !manager.is_syncing() {
    tokio::task::yield_now().await;
  }

  // La conexión cae y vuelve mientras el drenado manual sigue bloqueado.
  signal.set_online(false);
  tokio::time::sleep(std::time::Duration::from_millis(20)).await;
  signal.set_online(true);
  tokio::time::sleep(std::time::Duration::from_millis(20)).await;
  assert!(local.get_entity(EntityTable::SampleGroup, "remote-only").unwrap().is_none());

  remote.gate.add_permits(1);
  running.await.unwrap().unwrap();
  let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
  while local.get_entity(EntityTable::SampleGroup, "remote-only").unwrap().is_none() {
    assert!(tokio::time::Instant::now() < deadline, "reconcile was not retried");
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
  }
  watcher.abort();
}
