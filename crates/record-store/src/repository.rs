// Archivo: repository.rs
// Propósito: definir los contratos de los stores que usa el núcleo de
// sincronización: el store local (entidades, cola de operaciones, jobs y
// filas de detalle), el store remoto y el store de objetos binarios.
use crate::errors::Result;
use async_trait::async_trait;
use sample_domain::{DetailRow, DetailTable, EntityRecord, EntityTable, PendingOperation, ProcessingJob};
use serde_json::{Map as JsonMap, Value as JsonValue};
use uuid::Uuid;

/// Snapshots locales de entidades, indexadas por `(tabla, id)`.
pub trait EntityStore: Send + Sync {
    /// Obtiene la copia local de una entidad, si existe.
    fn get_entity(&self, table: EntityTable, id: &str) -> Result<Option<EntityRecord>>;

    /// Lista todas las entidades locales de una tabla.
    fn list_entities(&self, table: EntityTable) -> Result<Vec<EntityRecord>>;

    /// Inserta o sobrescribe la copia local.
    fn put_entity(&self, record: &EntityRecord) -> Result<()>;

    /// Borra la copia local. Devuelve `false` si no existía.
    fn delete_entity(&self, table: EntityTable, id: &str) -> Result<bool>;
}

/// Cola durable de operaciones pendientes.
///
/// Las operaciones se guardan indexadas por `enqueued_at` y nunca se
/// modifican una vez escritas.
pub trait OperationLog: Send + Sync {
    /// Añade una operación. Debe ser durable antes de retornar.
    fn append_operation(&self, op: &PendingOperation) -> Result<()>;

    /// Lista las operaciones ordenadas por `enqueued_at` (FIFO).
    fn list_operations(&self) -> Result<Vec<PendingOperation>>;

    /// Elimina una operación. Un id ausente no es error: devuelve `false`.
    fn remove_operation(&self, id: &Uuid) -> Result<bool>;
}

/// Jobs de procesamiento y sus filas de detalle.
pub trait JobStore: Send + Sync {
    /// Inserta el placeholder de un job. Falla con `Conflict` si el id ya
    /// existe.
    fn insert_job(&self, job: &ProcessingJob) -> Result<()>;

    /// Sobrescribe el estado de un job existente (`NotFound` si no existe).
    fn update_job(&self, job: &ProcessingJob) -> Result<()>;

    fn get_job(&self, id: &Uuid) -> Result<Option<ProcessingJob>>;

    /// Lista jobs, opcionalmente filtrados por muestra, del más antiguo al
    /// más reciente.
    fn list_jobs(&self, sample_id: Option<&str>) -> Result<Vec<ProcessingJob>>;

    /// Borra el job y, en cascada, sus filas de detalle.
    fn delete_job(&self, id: &Uuid) -> Result<()>;

    /// Inserta un lote de filas de detalle en una sola sentencia. El lote no
    /// puede superar `max_rows_per_statement()`.
    fn insert_detail_batch(&self, rows: &[DetailRow]) -> Result<usize>;

    /// Máximo de filas admitidas por sentencia de inserción.
    fn max_rows_per_statement(&self) -> usize;

    /// Cuenta filas de detalle de un job, opcionalmente de una sola tabla.
    fn count_details(&self, job_id: &Uuid, table: Option<DetailTable>) -> Result<i64>;

    /// Lee las filas de detalle de una tabla ordenadas por `ordinal`.
    fn read_details(&self, job_id: &Uuid, table: DetailTable) -> Result<Vec<DetailRow>>;

    /// Borra todas las filas de detalle de un job. Devuelve cuántas borró.
    fn delete_details(&self, job_id: &Uuid) -> Result<usize>;
}

/// Store local completo: lo que consumen el gestor de sincronización y el
/// coordinador de procesamiento.
pub trait LocalStore: EntityStore + OperationLog + JobStore {}

impl<T> LocalStore for T where T: EntityStore + OperationLog + JobStore {}

/// Contrato del store remoto (backend externo). Operaciones por tabla y por
/// `id`; cada registro lleva `updated_at`.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Crea el registro remoto.
    async fn create(&self, table: EntityTable, record: &EntityRecord) -> Result<()>;

    /// Aplica un parche parcial por id.
    async fn patch(&self, table: EntityTable, id: &str, updates: &JsonMap<String, JsonValue>) -> Result<()>;

    /// Borra por id.
    async fn remove(&self, table: EntityTable, id: &str) -> Result<()>;

    /// Comprueba si existe un registro con ese id.
    async fn exists(&self, table: EntityTable, id: &str) -> Result<bool>;

    /// Snapshot autoritativo de una tabla.
    async fn fetch_all(&self, table: EntityTable) -> Result<Vec<EntityRecord>>;
}

/// Store de objetos binarios por `bucket` + `path`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Sube (o reemplaza) un blob.
    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> Result<()>;

    /// Descarga un blob (`NotFound` si no existe).
    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>>;

    /// Borra un blob. Borrar un blob ausente no es error.
    async fn remove(&self, bucket: &str, path: &str) -> Result<()>;

    /// Lista los paths de un bucket que empiezan por `prefix`.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;
}
