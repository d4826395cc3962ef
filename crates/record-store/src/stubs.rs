// Archivo: stubs.rs
// Propósito: implementaciones en memoria para pruebas y wiring rápido.
//
// Incluye un store local en memoria (`InMemoryLocalStore`), un store remoto
// (`InMemoryRemoteStore`) con registro de llamadas e inyección de fallos y un
// store de objetos (`InMemoryObjectStore`). No son durables.
use crate::errors::{Result, StoreError};
use crate::repository::{EntityStore, JobStore, ObjectStore, OperationLog, RemoteStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sample_domain::{DetailRow, DetailTable, EntityRecord, EntityTable, PendingOperation, ProcessingJob};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Límite de filas por sentencia que imita al de SQLite (999 variables / 6
/// columnas por fila).
pub const DEFAULT_MAX_ROWS_PER_STATEMENT: usize = 166;

/// Helper para mapear `Mutex::lock()` en un `Result` con
/// `StoreError::Storage`.
fn lock<T>(m: &Mutex<T>) -> std::result::Result<MutexGuard<'_, T>, StoreError> {
    m.lock().map_err(|e| StoreError::Storage(format!("mutex poisoned: {:?}", e)))
}

/// Llamada registrada contra el lote de filas de detalle.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailBatchCall {
    pub job_id: Uuid,
    pub table: DetailTable,
    pub rows: usize,
}

/// Store local en memoria. Implementa los tres contratos locales.
pub struct InMemoryLocalStore {
    entities: Mutex<HashMap<(EntityTable, String), EntityRecord>>,
    /// Operaciones indexadas por `(enqueued_at, id)` para listar en FIFO.
    operations: Mutex<BTreeMap<(DateTime<Utc>, Uuid), PendingOperation>>,
    jobs: Mutex<HashMap<Uuid, ProcessingJob>>,
    details: Mutex<Vec<DetailRow>>,
    batch_calls: Mutex<Vec<DetailBatchCall>>,
    /// Número de lotes que se aceptan antes de empezar a fallar.
    fail_batches_after: Mutex<Option<usize>>,
    max_rows: usize,
}

impl InMemoryLocalStore {
    pub fn new() -> Self {
        Self::with_max_rows(DEFAULT_MAX_ROWS_PER_STATEMENT)
    }

    /// Store con un límite de filas por sentencia distinto del de SQLite.
    pub fn with_max_rows(max_rows: usize) -> Self {
        Self { entities: Mutex::new(HashMap::new()),
               operations: Mutex::new(BTreeMap::new()),
               jobs: Mutex::new(HashMap::new()),
               details: Mutex::new(Vec::new()),
               batch_calls: Mutex::new(Vec::new()),
               fail_batches_after: Mutex::new(None),
               max_rows: max_rows.max(1) }
    }

    /// Hace fallar todos los lotes de detalle a partir del `n`-ésimo (0 =
    /// falla el primero).
    pub fn fail_detail_batches_after(&self, n: usize) {
        *self.fail_batches_after.lock().unwrap_or_else(|e| e.into_inner()) = Some(n);
    }

    /// Lotes aceptados hasta ahora, en orden.
    pub fn detail_batch_calls(&self) -> Vec<DetailBatchCall> {
        self.batch_calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for InMemoryLocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore for InMemoryLocalStore {
    fn get_entity(&self, table: EntityTable, id: &str) -> Result<Option<EntityRecord>> {
        Ok(lock(&self.entities)?.get(&(table, id.to_string())).cloned())
    }

    fn list_entities(&self, table: EntityTable) -> Result<Vec<EntityRecord>> {
        let entities = lock(&self.entities)?;
        let mut out: Vec<EntityRecord> = entities.values().filter(|r| r.table == table).cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    fn put_entity(&self, record: &EntityRecord) -> Result<()> {
        lock(&self.entities)?.insert((record.table, record.id.clone()), record.clone());
        Ok(())
    }

    fn delete_entity(&self, table: EntityTable, id: &str) -> Result<bool> {
        Ok(lock(&self.entities)?.remove(&(table, id.to_string())).is_some())
    }
}

impl OperationLog for InMemoryLocalStore {
    fn append_operation(&self, op: &PendingOperation) -> Result<()> {
        let mut ops = lock(&self.operations)?;
        if ops.values().any(|existing| existing.id == op.id) {
            return Err(StoreError::Conflict(format!("operación {} ya encolada", op.id)));
        }
        ops.insert((op.enqueued_at, op.id), op.clone());
        Ok(())
    }

    fn list_operations(&self) -> Result<Vec<PendingOperation>> {
        Ok(lock(&self.operations)?.values().cloned().collect())
    }

    fn remove_operation(&self, id: &Uuid) -> Result<bool> {
        let mut ops = lock(&self.operations)?;
        let key = ops.iter().find(|(_, op)| &op.id == id).map(|(k, _)| *k);
        Ok(match key {
            Some(k) => ops.remove(&k).is_some(),
            None => false,
        })
    }
}

impl JobStore for InMemoryLocalStore {
    fn insert_job(&self, job: &ProcessingJob) -> Result<()> {
        let mut jobs = lock(&self.jobs)?;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::Conflict(format!("job {} ya existe", job.id)));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    fn update_job(&self, job: &ProcessingJob) -> Result<()> {
        let mut jobs = lock(&self.jobs)?;
        match jobs.get_mut(&job.id) {
            Some(slot) => {
                *slot = job.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("job {}", job.id))),
        }
    }

    fn get_job(&self, id: &Uuid) -> Result<Option<ProcessingJob>> {
        Ok(lock(&self.jobs)?.get(id).cloned())
    }

    fn list_jobs(&self, sample_id: Option<&str>) -> Result<Vec<ProcessingJob>> {
        let jobs = lock(&self.jobs)?;
        let mut out: Vec<ProcessingJob> = jobs.values()
                                              .filter(|j| sample_id.map_or(true, |s| j.sample_id == s))
                                              .cloned()
                                              .collect();
        out.sort_by_key(|j| (j.created_at, j.id));
        Ok(out)
    }

    fn delete_job(&self, id: &Uuid) -> Result<()> {
        if lock(&self.jobs)?.remove(id).is_none() {
            return Err(StoreError::NotFound(format!("job {}", id)));
        }
        lock(&self.details)?.retain(|d| &d.job_id != id);
        Ok(())
    }

    fn insert_detail_batch(&self, rows: &[DetailRow]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        if rows.len() > self.max_rows {
            return Err(StoreError::Conflict(format!("lote de {} filas supera el máximo de {}",
                                                    rows.len(),
                                                    self.max_rows)));
        }
        let mut calls = lock(&self.batch_calls)?;
        if let Some(limit) = *lock(&self.fail_batches_after)? {
            if calls.len() >= limit {
                return Err(StoreError::Storage(format!("fallo inyectado en el lote {}", calls.len() + 1)));
            }
        }
        let jobs = lock(&self.jobs)?;
        if let Some(orphan) = rows.iter().find(|r| !jobs.contains_key(&r.job_id)) {
            return Err(StoreError::NotFound(format!("job {} de la fila {}", orphan.job_id, orphan.id)));
        }
        lock(&self.details)?.extend(rows.iter().cloned());
        calls.push(DetailBatchCall { job_id: rows[0].job_id, table: rows[0].table, rows: rows.len() });
        Ok(rows.len())
    }

    fn max_rows_per_statement(&self) -> usize {
        self.max_rows
    }

    fn count_details(&self, job_id: &Uuid, table: Option<DetailTable>) -> Result<i64> {
        let details = lock(&self.details)?;
        Ok(details.iter()
                  .filter(|d| &d.job_id == job_id && table.map_or(true, |t| d.table == t))
                  .count() as i64)
    }

    fn read_details(&self, job_id: &Uuid, table: DetailTable) -> Result<Vec<DetailRow>> {
        let details = lock(&self.details)?;
        let mut out: Vec<DetailRow> = details.iter()
                                             .filter(|d| &d.job_id == job_id && d.table == table)
                                             .cloned()
                                             .collect();
        out.sort_by_key(|d| d.ordinal);
        Ok(out)
    }

    fn delete_details(&self, job_id: &Uuid) -> Result<usize> {
        let mut details = lock(&self.details)?;
        let before = details.len();
        details.retain(|d| &d.job_id != job_id);
        Ok(before - details.len())
    }
}

/// Llamada registrada contra el store remoto.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    Create { table: EntityTable, id: String },
    Patch { table: EntityTable, id: String },
    Remove { table: EntityTable, id: String },
    Exists { table: EntityTable, id: String },
    FetchAll { table: EntityTable },
}

/// Store remoto en memoria con registro de llamadas.
///
/// Los ids marcados con `fail_on` rechazan cualquier escritura con
/// `StoreError::Remote` hasta que se llame a `clear_failures`.
pub struct InMemoryRemoteStore {
    records: Mutex<HashMap<(EntityTable, String), EntityRecord>>,
    calls: Mutex<Vec<RemoteCall>>,
    failing: Mutex<HashSet<(EntityTable, String)>>,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self { records: Mutex::new(HashMap::new()),
               calls: Mutex::new(Vec::new()),
               failing: Mutex::new(HashSet::new()) }
    }

    /// Siembra un registro sin registrar llamada.
    pub fn seed(&self, record: EntityRecord) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((record.table, record.id.clone()), record);
    }

    pub fn get(&self, table: EntityTable, id: &str) -> Option<EntityRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(table, id.to_string()))
            .cloned()
    }

    pub fn fail_on(&self, table: EntityTable, id: &str) {
        self.failing.lock().unwrap_or_else(|e| e.into_inner()).insert((table, id.to_string()));
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Llamadas recibidas, en orden.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Llamadas de escritura (create/patch/remove) recibidas.
    pub fn write_calls(&self) -> Vec<RemoteCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, RemoteCall::Create { .. } | RemoteCall::Patch { .. } | RemoteCall::Remove { .. }))
            .collect()
    }

    fn record_call(&self, call: RemoteCall) -> Result<()> {
        lock(&self.calls)?.push(call);
        Ok(())
    }

    fn check_failure(&self, table: EntityTable, id: &str) -> Result<()> {
        if lock(&self.failing)?.contains(&(table, id.to_string())) {
            return Err(StoreError::Remote(format!("rechazo inyectado para {} {}", table, id)));
        }
        Ok(())
    }
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn create(&self, table: EntityTable, record: &EntityRecord) -> Result<()> {
        self.record_call(RemoteCall::Create { table, id: record.id.clone() })?;
        self.check_failure(table, &record.id)?;
        let mut records = lock(&self.records)?;
        let key = (table, record.id.clone());
        if records.contains_key(&key) {
            return Err(StoreError::Conflict(format!("{} {} ya existe", table, record.id)));
        }
        records.insert(key, record.clone());
        Ok(())
    }

    async fn patch(&self, table: EntityTable, id: &str, updates: &JsonMap<String, JsonValue>) -> Result<()> {
        self.record_call(RemoteCall::Patch { table, id: id.to_string() })?;
        self.check_failure(table, id)?;
        let mut records = lock(&self.records)?;
        let record = records.get_mut(&(table, id.to_string()))
                            .ok_or_else(|| StoreError::NotFound(format!("{} {}", table, id)))?;
        let ts = updates.get("updated_at")
                        .and_then(|v| v.as_str())
                        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(Utc::now);
        record.apply_updates(updates, ts)?;
        Ok(())
    }

    async fn remove(&self, table: EntityTable, id: &str) -> Result<()> {
        self.record_call(RemoteCall::Remove { table, id: id.to_string() })?;
        self.check_failure(table, id)?;
        lock(&self.records)?.remove(&(table, id.to_string()));
        Ok(())
    }

    async fn exists(&self, table: EntityTable, id: &str) -> Result<bool> {
        self.record_call(RemoteCall::Exists { table, id: id.to_string() })?;
        Ok(lock(&self.records)?.contains_key(&(table, id.to_string())))
    }

    async fn fetch_all(&self, table: EntityTable) -> Result<Vec<EntityRecord>> {
        self.record_call(RemoteCall::FetchAll { table })?;
        let records = lock(&self.records)?;
        let mut out: Vec<EntityRecord> = records.values().filter(|r| r.table == table).cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }
}

/// Store de objetos en memoria indexado por `(bucket, path)`.
pub struct InMemoryObjectStore {
    blobs: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self { blobs: Mutex::new(HashMap::new()) }
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> Result<()> {
        lock(&self.blobs)?.insert((bucket.to_string(), path.to_string()), bytes);
        Ok(())
    }

    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>> {
        lock(&self.blobs)?.get(&(bucket.to_string(), path.to_string()))
                          .cloned()
                          .ok_or_else(|| StoreError::NotFound(format!("{}/{}", bucket, path)))
    }

    async fn remove(&self, bucket: &str, path: &str) -> Result<()> {
        lock(&self.blobs)?.remove(&(bucket.to_string(), path.to_string()));
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let blobs = lock(&self.blobs)?;
        let mut out: Vec<String> = blobs.keys()
                                        .filter(|(b, p)| b == bucket && p.starts_with(prefix))
                                        .map(|(_, p)| p.clone())
                                        .collect();
        out.sort();
        Ok(out)
    }
}
