// message.rs
//
// Mensajes que el worker escribe en stdout, uno por línea.
use sample_domain::{ProgressEvent, WorkerResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SidecarMessage {
  Progress(ProgressEvent),
  Result(WorkerResult),
  Log {
    #[serde(default)]
    level: String,
    message: String,
  },
}

impl SidecarMessage {
  /// Interpreta una línea de stdout. Las líneas vacías devuelven `None`.
  pub fn parse_line(line: &str) -> Option<Result<Self, serde_json::Error>> {
    let line = line.trim();
    if line.is_empty() {
      return None;
    }
    Some(serde_json::from_str(line))
  }
}
