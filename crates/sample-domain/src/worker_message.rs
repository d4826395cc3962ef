// worker_message.rs
//
// Mensajes intercambiados con el worker nativo de procesamiento.
use crate::DetailTable;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Evento de progreso emitido fuera de banda por el worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
  pub progress_percentage: u8,
  pub status_message: String,
  #[serde(default)]
  pub processing_state: String,
}

impl ProgressEvent {
  pub fn new(progress_percentage: u8, status_message: &str) -> Self {
    Self { progress_percentage,
           status_message: status_message.to_string(),
           processing_state: "processing".to_string() }
  }
}

/// Payload con el que se invoca al worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
  pub job_name: String,
  pub sample_id: String,
  pub org_id: String,
  pub user_id: String,
  pub raw_data_id: Uuid,
  pub processed_data_id: Uuid,
  pub file_paths: Vec<String>,
  #[serde(default)]
  pub inputs: JsonValue,
}

/// Resultado estructurado devuelto por el worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResult {
  pub status: String,
  #[serde(default)]
  pub report: JsonValue,
  #[serde(default)]
  pub raw_rows: Vec<JsonValue>,
  #[serde(default)]
  pub processed_rows: Vec<JsonValue>,
}

impl WorkerResult {
  pub fn success(raw_rows: Vec<JsonValue>, processed_rows: Vec<JsonValue>) -> Self {
    Self { status: "Success".to_string(), report: JsonValue::Null, raw_rows, processed_rows }
  }

  pub fn is_success(&self) -> bool {
    self.status.trim().eq_ignore_ascii_case("success")
  }

  /// Sin filas en ninguna tabla.
  pub fn is_empty(&self) -> bool {
    self.raw_rows.is_empty() && self.processed_rows.is_empty()
  }

  pub fn rows(&self, table: DetailTable) -> &[JsonValue] {
    match table {
      DetailTable::Raw => &self.raw_rows,
      DetailTable::Processed => &self.processed_rows,
    }
  }
}
