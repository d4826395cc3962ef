use record_store::StoreError;
use sample_domain::DomainError;
use thiserror::Error;

// Errores del gestor de sincronización.
//
// Las operaciones omitidas (sin conexión, otra sincronización en curso) no
// son errores: se informan en el `DrainReport` / `ReconcileReport`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
  /// Errores del store local o remoto.
  #[error("Error de store: {0}")]
  Store(#[from] StoreError),

  /// Documentos que no cumplen el modelo de dominio.
  #[error("Error de dominio: {0}")]
  Domain(#[from] DomainError),

  /// Operaciones que siguen en cola tras un drenado con fallos.
  #[error("{failed} operaciones siguen pendientes tras el drenado: {first_error}")]
  PartialDrain { failed: usize, first_error: String },
}

// Errores del coordinador de procesamiento.
//
// Es `Clone` porque el mismo resultado se entrega a todos los llamadores
// que esperan un job con la misma clave.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcessingError {
  /// La petición no pasó la validación; no se creó ningún job.
  #[error("Error de validacion: {0}")]
  Validation(String),

  #[error("Error de store: {0}")]
  Store(#[from] StoreError),

  #[error("Error de dominio: {0}")]
  Domain(#[from] DomainError),

  /// El worker no pudo ejecutarse o se interrumpió.
  #[error("Error del worker: {0}")]
  Worker(String),

  /// El worker terminó con un estado distinto de éxito.
  #[error("El worker terminó con estado '{status}'")]
  WorkerFailed { status: String },

  /// El worker devolvió éxito sin filas.
  #[error("El worker no devolvió resultados")]
  EmptyResult,

  /// El worker superó el tiempo máximo configurado.
  #[error("El worker superó el tiempo máximo de {0} s")]
  Timeout(u64),

  /// Fallo al guardar las filas de detalle (ya compensado).
  #[error("Error de persistencia: {0}")]
  Persistence(String),

  /// La tarea del job terminó de forma anómala.
  #[error("La tarea del job terminó de forma anómala: {0}")]
  Join(String),
}

// Errores de configuración (variables de entorno con valores inválidos).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
  #[error("Valor inválido para {key}: {value}")]
  InvalidValue { key: String, value: String },
}
