// file_node.rs
use crate::{DomainError, EntityTable, Syncable};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileNodeType {
  Folder,
  SampleGroup,
}

/// Nodo del árbol de archivos que muestra la UI. Un nodo `SampleGroup`
/// apunta a su grupo de muestras mediante `sample_group_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileNode {
  pub id: String,
  pub org_id: String,
  pub name: String,
  #[serde(rename = "type")]
  pub node_type: FileNodeType,
  pub parent_id: Option<String>,
  pub sample_group_id: Option<String>,
  pub droplet_type: Option<String>,
  pub updated_at: DateTime<Utc>,
}

impl FileNode {
  pub fn folder(name: &str, org_id: &str, parent_id: Option<&str>) -> Result<Self, DomainError> {
    if name.trim().is_empty() {
      return Err(DomainError::ValidationError("El nombre del nodo no puede estar vacío".to_string()));
    }
    Ok(Self { id: Uuid::new_v4().to_string(),
              org_id: org_id.to_string(),
              name: name.trim().to_string(),
              node_type: FileNodeType::Folder,
              parent_id: parent_id.map(|p| p.to_string()),
              sample_group_id: None,
              droplet_type: None,
              updated_at: Utc::now() })
  }

  /// Nodo hoja asociado a un grupo de muestras existente.
  pub fn for_sample_group(group_id: &str, name: &str, org_id: &str, parent_id: Option<&str>) -> Result<Self, DomainError> {
    let mut node = Self::folder(name, org_id, parent_id)?;
    node.node_type = FileNodeType::SampleGroup;
    node.sample_group_id = Some(group_id.to_string());
    Ok(node)
  }

  pub fn is_folder(&self) -> bool {
    self.node_type == FileNodeType::Folder
  }
}

impl Syncable for FileNode {
  const TABLE: EntityTable = EntityTable::FileNode;

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
