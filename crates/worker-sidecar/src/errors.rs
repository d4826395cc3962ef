// errors.rs
use sync_engine::ProcessingError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SidecarError {
  #[error("no se pudo lanzar '{program}': {message}")]
  Spawn { program: String, message: String },
  #[error("E/S con el worker: {0}")]
  Io(String),
  #[error("protocolo: {0}")]
  Protocol(String),
  #[error("el worker terminó con código {code:?}: {stderr}")]
  Exit { code: Option<i32>, stderr: String },
  #[error("el worker terminó sin enviar resultado: {stderr}")]
  MissingResult { stderr: String },
  #[error("comando de worker no configurado ({0})")]
  NotConfigured(String),
}

impl From<std::io::Error> for SidecarError {
  fn from(e: std::io::Error) -> Self {
    SidecarError::Io(e.to_string())
  }
}

impl From<serde_json::Error> for SidecarError {
  fn from(e: serde_json::Error) -> Self {
    SidecarError::Protocol(e.to_string())
  }
}

impl From<SidecarError> for ProcessingError {
  fn from(e: SidecarError) -> Self {
    ProcessingError::Worker(e.to_string())
  }
}
