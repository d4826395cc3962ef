// Archivo: errors.rs
// Propósito: definir los errores de los stores (local, remoto y de objetos)
// y el alias Result<T> usado por las APIs del crate.
use sample_domain::DomainError;
use thiserror::Error;

/// Errores comunes de los stores.
///
/// - `NotFound`: entidad no encontrada.
/// - `Conflict`: conflicto de unicidad o de límites del store.
/// - `Storage`: error al acceder al almacenamiento local.
/// - `Remote`: el store remoto rechazó o no pudo atender la llamada.
/// - `Other`: cualquier otro error.
///
/// Es `Clone` porque viaja dentro de resultados compartidos entre varios
/// awaiters.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
  /// Entidad no encontrada (registro, job u objeto).
  #[error("No encontrado: {0}")]
  NotFound(String),
  /// Conflicto (clave duplicada, lote demasiado grande, etc.).
  #[error("Conflicto: {0}")]
  Conflict(String),
  /// Error genérico de almacenamiento local (BD, pool, mutex).
  #[error("Error de almacenamiento: {0}")]
  Storage(String),
  /// Rechazo o fallo del store remoto.
  #[error("Error remoto: {0}")]
  Remote(String),
  /// Documento inválido según el dominio.
  #[error("Error de dominio: {0}")]
  Domain(#[from] DomainError),
  #[error("Error de serialización: {0}")]
  Serialization(String),
  /// Otro tipo de error.
  #[error("Otro: {0}")]
  Other(String),
}

impl From<serde_json::Error> for StoreError {
  fn from(e: serde_json::Error) -> Self {
    StoreError::Serialization(e.to_string())
  }
}

/// Alias de resultado usado por las APIs del crate.
pub type Result<T> = std::result::Result<T, StoreError>;
