// processing_job.rs
use crate::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Estado de un job de procesamiento.
///
/// Secuencia normal: `Initiated` → `Processing` → `Saving` → `Complete`.
/// `Error` es terminal y puede alcanzarse desde cualquier estado no terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
  Initiated,
  Processing,
  Saving,
  Complete,
  Error,
}

impl JobState {
  pub fn is_terminal(&self) -> bool {
    matches!(self, JobState::Complete | JobState::Error)
  }

  /// Transiciones permitidas por la máquina de estados.
  pub fn can_transition_to(&self, next: JobState) -> bool {
    match (self, next) {
      (JobState::Initiated, JobState::Processing) => true,
      (JobState::Processing, JobState::Saving) => true,
      (JobState::Saving, JobState::Complete) => true,
      (s, JobState::Error) => !s.is_terminal(),
      _ => false,
    }
  }
}

impl fmt::Display for JobState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      JobState::Initiated => "initiated",
      JobState::Processing => "processing",
      JobState::Saving => "saving",
      JobState::Complete => "complete",
      JobState::Error => "error",
    };
    write!(f, "{}", s)
  }
}

impl FromStr for JobState {
  type Err = DomainError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "initiated" => Ok(JobState::Initiated),
      "processing" => Ok(JobState::Processing),
      "saving" => Ok(JobState::Saving),
      "complete" => Ok(JobState::Complete),
      "error" => Ok(JobState::Error),
      other => Err(DomainError::ValidationError(format!("estado de job desconocido: {}", other))),
    }
  }
}

/// Identidad lógica de un procesamiento: una muestra procesada con una
/// configuración concreta.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
  pub sample_id: String,
  pub config_id: String,
}

impl JobKey {
  pub fn new(sample_id: &str, config_id: &str) -> Self {
    Self { sample_id: sample_id.to_string(), config_id: config_id.to_string() }
  }
}

impl fmt::Display for JobKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.sample_id, self.config_id)
  }
}

/// Registro de seguimiento de un job. Se crea como placeholder antes de
/// invocar al worker y siempre precede a sus filas de detalle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingJob {
  pub id: Uuid,
  pub data_type: String,
  pub user_id: String,
  pub org_id: String,
  pub sample_id: String,
  pub config_id: String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub state: JobState,
  pub status_message: String,
  pub progress_percentage: u8,
  pub raw_data_id: Uuid,
  pub processed_data_id: Uuid,
}

impl ProcessingJob {
  /// Placeholder en estado `Initiated` al 0%.
  pub fn placeholder(key: &JobKey, data_type: &str, user_id: &str, org_id: &str) -> Self {
    let now = Utc::now();
    Self { id: Uuid::new_v4(),
           data_type: data_type.to_string(),
           user_id: user_id.to_string(),
           org_id: org_id.to_string(),
           sample_id: key.sample_id.clone(),
           config_id: key.config_id.clone(),
           created_at: now,
           updated_at: now,
           state: JobState::Initiated,
           status_message: "Initiated".to_string(),
           progress_percentage: 0,
           raw_data_id: Uuid::new_v4(),
           processed_data_id: Uuid::new_v4() }
  }

  pub fn key(&self) -> JobKey {
    JobKey::new(&self.sample_id, &self.config_id)
  }

  /// Aplica una transición de estado validándola contra la máquina de
  /// estados.
  pub fn transition(&mut self, next: JobState, message: &str) -> Result<(), DomainError> {
    if !self.state.can_transition_to(next) {
      return Err(DomainError::InvalidTransition { job: self.id.to_string(),
                                                  from: self.state.to_string(),
                                                  to: next.to_string() });
    }
    self.state = next;
    self.status_message = message.to_string();
    if next == JobState::Complete {
      self.progress_percentage = 100;
    }
    self.updated_at = Utc::now();
    Ok(())
  }

  /// Registra progreso. Devuelve `false` (sin cambios) si el porcentaje
  /// retrocede respecto al ya registrado.
  pub fn record_progress(&mut self, percentage: u8, message: &str) -> bool {
    let percentage = percentage.min(100);
    if percentage < self.progress_percentage {
      return false;
    }
    self.progress_percentage = percentage;
    self.status_message = message.to_string();
    self.updated_at = Utc::now();
    true
  }
}

/// Tabla de detalle a la que pertenece una fila.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailTable {
  Raw,
  Processed,
}

impl DetailTable {
  pub fn as_str(&self) -> &'static str {
    match self {
      DetailTable::Raw => "raw",
      DetailTable::Processed => "processed",
    }
  }
}

impl fmt::Display for DetailTable {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for DetailTable {
  type Err = DomainError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "raw" => Ok(DetailTable::Raw),
      "processed" => Ok(DetailTable::Processed),
      other => Err(DomainError::ValidationError(format!("tabla de detalle desconocida: {}", other))),
    }
  }
}

/// Fila de medición (cruda o procesada) producida por un job. Sólo se
/// inserta; nunca se actualiza.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailRow {
  pub id: Uuid,
  pub job_id: Uuid,
  pub table: DetailTable,
  /// `raw_data_id` o `processed_data_id` del job, según la tabla.
  pub data_id: Uuid,
  pub ordinal: i64,
  pub data: JsonValue,
}
