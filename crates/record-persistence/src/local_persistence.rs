// Archivo: local_persistence.rs
// Propósito: store local durable sobre SQLite (Diesel + r2d2). Implementa
// `EntityStore`, `OperationLog` y `JobStore` de `record-store`.
use crate::schema::{detail_rows, entities, pending_operations, processing_jobs};
use chrono::{DateTime, SecondsFormat, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::{debug, info};
use record_store::{EntityStore, JobStore, OperationLog, Result, StoreError};
use sample_domain::{DetailRow, DetailTable, EntityMutation, EntityRecord, EntityTable, JobState, PendingOperation,
                    ProcessingJob};
use std::sync::Arc;
use uuid::Uuid;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

/// Límite clásico de variables enlazadas por sentencia en SQLite.
pub const SQLITE_MAX_VARIABLES: usize = 999;
/// Columnas de `detail_rows` que se enlazan por fila.
const DETAIL_COLUMNS: usize = 6;

type DbPool = Pool<ConnectionManager<SqliteConnection>>;
type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Ajustes por conexión: espera ante bloqueos y claves foráneas activas
/// (necesarias para el borrado en cascada de filas de detalle).
#[derive(Debug)]
struct SqlitePragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
  fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), diesel::r2d2::Error> {
    conn.batch_execute("PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;")
        .map_err(diesel::r2d2::Error::QueryError)
  }
}

/// Store local Diesel/SQLite.
pub struct DieselLocalStore {
  pool: Arc<DbPool>,
}

impl DieselLocalStore {
  /// Abre (o crea) la base de datos y aplica las migraciones pendientes.
  pub fn new(database_url: &str) -> Result<Self> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = Pool::builder().max_size(4)
                              .connection_customizer(Box::new(SqlitePragmas))
                              .build(manager)
                              .map_err(|e| StoreError::Storage(format!("pool: {}", e)))?;
    let store = DieselLocalStore { pool: Arc::new(pool) };
    let mut conn = store.conn()?;
    conn.batch_execute("PRAGMA journal_mode = WAL;").map_err(map_db_err)?;
    let applied = conn.run_pending_migrations(MIGRATIONS)
                      .map_err(|e| StoreError::Storage(format!("migraciones: {}", e)))?;
    if !applied.is_empty() {
      info!("store local {}: {} migraciones aplicadas", database_url, applied.len());
    }
    Ok(store)
  }

  fn conn(&self) -> Result<DbConn> {
    self.pool.get().map_err(|e| StoreError::Storage(format!("pool: {}", e)))
  }
}

/// Crear el store desde variables de entorno (`POLESHIFT_DB_URL` o
/// `DATABASE_URL`).
pub fn new_from_env() -> Result<DieselLocalStore> {
  dotenvy::dotenv().ok();
  let url = std::env::var("POLESHIFT_DB_URL").or_else(|_| std::env::var("DATABASE_URL"))
                                             .map_err(|_| {
                                               StoreError::Storage("POLESHIFT_DB_URL / DATABASE_URL not set".into())
                                             })?;
  DieselLocalStore::new(&url)
}

/// Store sobre un fichero SQLite concreto; pensado para pruebas.
pub fn new_sqlite_for_test(path: &std::path::Path) -> Result<DieselLocalStore> {
  let url = path.to_str()
                .ok_or_else(|| StoreError::Storage(format!("ruta no UTF-8: {:?}", path)))?;
  DieselLocalStore::new(url)
}

fn map_db_err(e: DieselError) -> StoreError {
  match e {
    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
      StoreError::Conflict(format!("db: {}", info.message()))
    }
    DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
      StoreError::NotFound(format!("db: {}", info.message()))
    }
    other => StoreError::Storage(format!("db: {}", other)),
  }
}

fn parse_uuid(s: &str) -> Result<Uuid> {
  Uuid::parse_str(s).map_err(|e| StoreError::Serialization(format!("invalid uuid {}: {}", s, e)))
}

fn from_micros(ts: i64) -> Result<DateTime<Utc>> {
  DateTime::from_timestamp_micros(ts).ok_or_else(|| StoreError::Serialization(format!("timestamp fuera de rango: {}", ts)))
}

// Filas Diesel

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = entities)]
struct EntityRow {
  pub table_name: String,
  pub id: String,
  pub data: String,
  pub updated_at: String,
}

impl EntityRow {
  fn from_record(record: &EntityRecord) -> Result<Self> {
    Ok(Self { table_name: record.table.as_str().to_string(),
              id: record.id.clone(),
              data: serde_json::to_string(&record.data)?,
              updated_at: record.updated_at.to_rfc3339_opts(SecondsFormat::AutoSi, true) })
  }

  fn into_record(self) -> Result<EntityRecord> {
    let table: EntityTable = self.table_name.parse()?;
    let updated_at = DateTime::parse_from_rfc3339(&self.updated_at)
      .map(|dt| dt.with_timezone(&Utc))
      .map_err(|e| StoreError::Serialization(format!("updated_at {}: {}", self.updated_at, e)))?;
    Ok(EntityRecord { table, id: self.id, data: serde_json::from_str(&self.data)?, updated_at })
  }
}

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = pending_operations)]
struct PendingOperationRow {
  pub id: String,
  pub kind: String,
  pub entity_table: String,
  pub target_id: String,
  pub payload: String,
  pub enqueued_at_ts: i64,
}

impl PendingOperationRow {
  fn from_operation(op: &PendingOperation) -> Result<Self> {
    Ok(Self { id: op.id.to_string(),
              kind: op.kind().to_string(),
              entity_table: op.entity_table().as_str().to_string(),
              target_id: op.target_id().to_string(),
              payload: serde_json::to_string(&op.mutation)?,
              enqueued_at_ts: op.enqueued_at.timestamp_micros() })
  }

  fn into_operation(self) -> Result<PendingOperation> {
    let mutation: EntityMutation = serde_json::from_str(&self.payload)?;
    Ok(PendingOperation { id: parse_uuid(&self.id)?, mutation, enqueued_at: from_micros(self.enqueued_at_ts)? })
  }
}

#[derive(Debug, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = processing_jobs)]
struct JobRow {
  pub id: String,
  pub data_type: String,
  pub user_id: String,
  pub org_id: String,
  pub sample_id: String,
  pub config_id: String,
  pub created_at_ts: i64,
  pub updated_at_ts: i64,
  pub state: String,
  pub status_message: String,
  pub progress_percentage: i32,
  pub raw_data_id: String,
  pub processed_data_id: String,
}

impl From<&ProcessingJob> for JobRow {
  fn from(job: &ProcessingJob) -> Self {
    Self { id: job.id.to_string(),
           data_type: job.data_type.clone(),
           user_id: job.user_id.clone(),
           org_id: job.org_id.clone(),
           sample_id: job.sample_id.clone(),
           config_id: job.config_id.clone(),
           created_at_ts: job.created_at.timestamp_micros(),
           updated_at_ts: job.updated_at.timestamp_micros(),
           state: job.state.to_string(),
           status_message: job.status_message.clone(),
           progress_percentage: i32::from(job.progress_percentage),
           raw_data_id: job.raw_data_id.to_string(),
           processed_data_id: job.processed_data_id.to_string() }
  }
}

impl JobRow {
  fn into_job(self) -> Result<ProcessingJob> {
    let state: JobState = self.state.parse()?;
    Ok(ProcessingJob { id: parse_uuid(&self.id)?,
                       data_type: self.data_type,
                       user_id: self.user_id,
                       org_id: self.org_id,
                       sample_id: self.sample_id,
                       config_id: self.config_id,
                       created_at: from_micros(self.created_at_ts)?,
                       updated_at: from_micros(self.updated_at_ts)?,
                       state,
                       status_message: self.status_message,
                       progress_percentage: self.progress_percentage.clamp(0, 100) as u8,
                       raw_data_id: parse_uuid(&self.raw_data_id)?,
                       processed_data_id: parse_uuid(&self.processed_data_id)? })
  }
}

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = detail_rows)]
struct DetailRowRecord {
  pub id: String,
  pub job_id: String,
  pub detail_table: String,
  pub data_id: String,
  pub ordinal: i64,
  pub data: String,
}

impl DetailRowRecord {
  fn from_row(row: &DetailRow) -> Result<Self> {
    Ok(Self { id: row.id.to_string(),
              job_id: row.job_id.to_string(),
              detail_table: row.table.as_str().to_string(),
              data_id: row.data_id.to_string(),
              ordinal: row.ordinal,
              data: serde_json::to_string(&row.data)? })
  }

  fn into_row(self) -> Result<DetailRow> {
    Ok(DetailRow { id: parse_uuid(&self.id)?,
                   job_id: parse_uuid(&self.job_id)?,
                   table: self.detail_table.parse()?,
                   data_id: parse_uuid(&self.data_id)?,
                   ordinal: self.ordinal,
                   data: serde_json::from_str(&self.data)? })
  }
}

impl EntityStore for DieselLocalStore {
  fn get_entity(&self, table: EntityTable, id: &str) -> Result<Option<EntityRecord>> {
    use crate::schema::entities::dsl as e_dsl;
    let mut conn = self.conn()?;
    let row = e_dsl::entities.filter(e_dsl::table_name.eq(table.as_str()))
                             .filter(e_dsl::id.eq(id))
                             .first::<EntityRow>(&mut conn)
                             .optional()
                             .map_err(map_db_err)?;
    row.map(EntityRow::into_record).transpose()
  }

  fn list_entities(&self, table: EntityTable) -> Result<Vec<EntityRecord>> {
    use crate::schema::entities::dsl as e_dsl;
    let mut conn = self.conn()?;
    let rows = e_dsl::entities.filter(e_dsl::table_name.eq(table.as_str()))
                              .order(e_dsl::id.asc())
                              .load::<EntityRow>(&mut conn)
                              .map_err(map_db_err)?;
    rows.into_iter().map(EntityRow::into_record).collect()
  }

  fn put_entity(&self, record: &EntityRecord) -> Result<()> {
    let row = EntityRow::from_record(record)?;
    let mut conn = self.conn()?;
    diesel::replace_into(entities::table).values(&row)
                                         .execute(&mut conn)
                                         .map_err(map_db_err)?;
    Ok(())
  }

  fn delete_entity(&self, table: EntityTable, id: &str) -> Result<bool> {
    use crate::schema::entities::dsl as e_dsl;
    let mut conn = self.conn()?;
    let n = diesel::delete(e_dsl::entities.filter(e_dsl::table_name.eq(table.as_str())).filter(e_dsl::id.eq(id)))
      .execute(&mut conn)
      .map_err(map_db_err)?;
    Ok(n > 0)
  }
}

impl OperationLog for DieselLocalStore {
  fn append_operation(&self, op: &PendingOperation) -> Result<()> {
    let row = PendingOperationRow::from_operation(op)?;
    let mut conn = self.conn()?;
    diesel::insert_into(pending_operations::table).values(&row)
                                                  .execute(&mut conn)
                                                  .map_err(map_db_err)?;
    debug!("operación {} persistida ({} {})", row.id, row.kind, row.entity_table);
    Ok(())
  }

  fn list_operations(&self) -> Result<Vec<PendingOperation>> {
    use crate::schema::pending_operations::dsl as po_dsl;
    let mut conn = self.conn()?;
    let rows = po_dsl::pending_operations.order((po_dsl::enqueued_at_ts.asc(), po_dsl::id.asc()))
                                         .load::<PendingOperationRow>(&mut conn)
                                         .map_err(map_db_err)?;
    rows.into_iter().map(PendingOperationRow::into_operation).collect()
  }

  fn remove_operation(&self, id: &Uuid) -> Result<bool> {
    use crate::schema::pending_operations::dsl as po_dsl;
    let mut conn = self.conn()?;
    let n = diesel::delete(po_dsl::pending_operations.filter(po_dsl::id.eq(id.to_string()))).execute(&mut conn)
                                                                                          .map_err(map_db_err)?;
    Ok(n > 0)
  }
}

impl JobStore for DieselLocalStore {
  fn insert_job(&self, job: &ProcessingJob) -> Result<()> {
    let row = JobRow::from(job);
    let mut conn = self.conn()?;
    diesel::insert_into(processing_jobs::table).values(&row)
                                               .execute(&mut conn)
                                               .map_err(map_db_err)?;
    Ok(())
  }

  fn update_job(&self, job: &ProcessingJob) -> Result<()> {
    use crate::schema::processing_jobs::dsl as pj_dsl;
    let row = JobRow::from(job);
    let mut conn = self.conn()?;
    let n = diesel::update(pj_dsl::processing_jobs.filter(pj_dsl::id.eq(&row.id))).set(&row)
                                                                                 .execute(&mut conn)
                                                                                 .map_err(map_db_err)?;
    if n == 0 {
      return Err(StoreError::NotFound(format!("job {}", job.id)));
    }
    Ok(())
  }

  fn get_job(&self, id: &Uuid) -> Result<Option<ProcessingJob>> {
    use crate::schema::processing_jobs::dsl as pj_dsl;
    let mut conn = self.conn()?;
    let row = pj_dsl::processing_jobs.filter(pj_dsl::id.eq(id.to_string()))
                                     .first::<JobRow>(&mut conn)
                                     .optional()
                                     .map_err(map_db_err)?;
    row.map(JobRow::into_job).transpose()
  }

  fn list_jobs(&self, sample_id: Option<&str>) -> Result<Vec<ProcessingJob>> {
    use crate::schema::processing_jobs::dsl as pj_dsl;
    let mut conn = self.conn()?;
    let mut query = pj_dsl::processing_jobs.into_boxed();
    if let Some(s) = sample_id {
      query = query.filter(pj_dsl::sample_id.eq(s.to_string()));
    }
    let rows = query.order((pj_dsl::created_at_ts.asc(), pj_dsl::id.asc()))
                    .load::<JobRow>(&mut conn)
                    .map_err(map_db_err)?;
    rows.into_iter().map(JobRow::into_job).collect()
  }

  fn delete_job(&self, id: &Uuid) -> Result<()> {
    use crate::schema::detail_rows::dsl as dr_dsl;
    use crate::schema::processing_jobs::dsl as pj_dsl;
    let mut conn = self.conn()?;
    let id_s = id.to_string();
    let removed = conn.transaction::<usize, DieselError, _>(|c| {
                        diesel::delete(dr_dsl::detail_rows.filter(dr_dsl::job_id.eq(&id_s))).execute(c)?;
                        diesel::delete(pj_dsl::processing_jobs.filter(pj_dsl::id.eq(&id_s))).execute(c)
                      })
                      .map_err(map_db_err)?;
    if removed == 0 {
      return Err(StoreError::NotFound(format!("job {}", id)));
    }
    Ok(())
  }

  fn insert_detail_batch(&self, rows: &[DetailRow]) -> Result<usize> {
    if rows.is_empty() {
      return Ok(0);
    }
    let max = self.max_rows_per_statement();
    if rows.len() > max {
      return Err(StoreError::Conflict(format!("lote de {} filas supera el máximo de {}", rows.len(), max)));
    }
    let records = rows.iter().map(DetailRowRecord::from_row).collect::<Result<Vec<_>>>()?;
    let mut conn = self.conn()?;
    let n = diesel::insert_into(detail_rows::table).values(&records)
                                                   .execute(&mut conn)
                                                   .map_err(map_db_err)?;
    Ok(n)
  }

  fn max_rows_per_statement(&self) -> usize {
    SQLITE_MAX_VARIABLES / DETAIL_COLUMNS
  }

  fn count_details(&self, job_id: &Uuid, table: Option<DetailTable>) -> Result<i64> {
    use crate::schema::detail_rows::dsl as dr_dsl;
    let mut conn = self.conn()?;
    let mut query = dr_dsl::detail_rows.filter(dr_dsl::job_id.eq(job_id.to_string())).into_boxed();
    if let Some(t) = table {
      query = query.filter(dr_dsl::detail_table.eq(t.as_str()));
    }
    query.count().get_result::<i64>(&mut conn).map_err(map_db_err)
  }

  fn read_details(&self, job_id: &Uuid, table: DetailTable) -> Result<Vec<DetailRow>> {
    use crate::schema::detail_rows::dsl as dr_dsl;
    let mut conn = self.conn()?;
    let rows = dr_dsl::detail_rows.filter(dr_dsl::job_id.eq(job_id.to_string()))
                                  .filter(dr_dsl::detail_table.eq(table.as_str()))
                                  .order(dr_dsl::ordinal.asc())
                                  .load::<DetailRowRecord>(&mut conn)
                                  .map_err(map_db_err)?;
    rows.into_iter().map(DetailRowRecord::into_row).collect()
  }

  fn delete_details(&self, job_id: &Uuid) -> Result<usize> {
    use crate::schema::detail_rows::dsl as dr_dsl;
    let mut conn = self.conn()?;
    diesel::delete(dr_dsl::detail_rows.filter(dr_dsl::job_id.eq(job_id.to_string()))).execute(&mut conn)
                                                                                    .map_err(map_db_err)
  }
}
