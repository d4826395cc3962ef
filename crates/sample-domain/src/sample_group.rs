// sample_group.rs
use crate::{DomainError, EntityTable, Syncable};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Grupo de muestras registrado en campo: agrupa las muestras tomadas en un
/// mismo sitio y fecha. Es la entidad principal que edita la UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleGroup {
  pub id: String,
  pub name: String,
  pub human_readable_sample_id: Option<String>,
  pub org_id: String,
  pub user_id: Option<String>,
  pub loc_id: Option<String>,
  pub collection_date: Option<NaiveDate>,
  pub storage_location: Option<String>,
  pub notes: Option<String>,
  #[serde(default)]
  pub excluded: bool,
  pub latitude_recorded: Option<f64>,
  pub longitude_recorded: Option<f64>,
  pub updated_at: DateTime<Utc>,
}

impl SampleGroup {
  pub fn new(name: &str, org_id: &str) -> Result<Self, DomainError> {
    if name.trim().is_empty() {
      return Err(DomainError::ValidationError("El nombre del grupo no puede estar vacío".to_string()));
    }
    if org_id.trim().is_empty() {
      return Err(DomainError::ValidationError("org_id no puede estar vacío".to_string()));
    }
    Ok(Self { id: Uuid::new_v4().to_string(),
              name: name.trim().to_string(),
              human_readable_sample_id: None,
              org_id: org_id.to_string(),
              user_id: None,
              loc_id: None,
              collection_date: None,
              storage_location: None,
              notes: None,
              excluded: false,
              latitude_recorded: None,
              longitude_recorded: None,
              updated_at: Utc::now() })
  }

  pub fn with_id(mut self, id: &str) -> Self {
    self.id = id.to_string();
    self
  }

  pub fn with_notes(mut self, notes: &str) -> Self {
    self.notes = Some(notes.to_string());
    self
  }

  pub fn with_location(mut self, loc_id: &str, latitude: f64, longitude: f64) -> Result<Self, DomainError> {
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
      return Err(DomainError::ValidationError(format!("coordenadas fuera de rango: {}, {}", latitude, longitude)));
    }
    self.loc_id = Some(loc_id.to_string());
    self.latitude_recorded = Some(latitude);
    self.longitude_recorded = Some(longitude);
    Ok(self)
  }
}

impl Syncable for SampleGroup {
  const TABLE: EntityTable = EntityTable::SampleGroup;

  fn id(&self) -> &str {
    &self.id
  }

  fn updated_at(&self) -> DateTime<Utc> {
    self.updated_at
  }

  fn set_updated_at(&mut self, ts: DateTime<Utc>) {
    self.updated_at = ts;
  }
}

impl fmt::Display for SampleGroup {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "SampleGroup({}, {})", self.id, self.name)
  }
}
