// errors.rs
//
// Errores del modelo de muestras. Son `Clone` para poder viajar dentro de
// resultados compartidos entre varios llamadores.
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
  /// Documento o campo que no cumple el modelo.
  #[error("Dato inválido: {0}")]
  ValidationError(String),
  /// Cambio de estado no permitido para un job de procesamiento.
  #[error("Transición inválida {from} -> {to} para el job {job}")]
  InvalidTransition { job: String, from: String, to: String },
  #[error("JSON inválido: {0}")]
  SerializationError(String),
}

impl From<serde_json::Error> for DomainError {
  fn from(e: serde_json::Error) -> Self {
    Self::SerializationError(e.to_string())
  }
}
