// user_setting.rs
use crate::{DomainError, EntityTable, Syncable};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Preferencia de usuario sincronizada (p.ej. umbral de confianza de
/// taxonomía, capas del globo). El id es `{user_id}:{key}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSetting {
  pub id: String,
  pub user_id: String,
  pub key: String,
  pub value: JsonValue,
  pub updated_at: DateTime<Utc>,
}

impl UserSetting {
  pub fn new(user_id: &str, key: &str, value: JsonValue) -> Result<Self, DomainError> {
    if user_id.trim().is_empty() || key.trim().is_empty() {
      return Err(DomainError::ValidationError("user_id y key son obligatorios".to_string()));
    }
    Ok(Self { id: format!("{}:{}", user_id, key),
              user_id: user_id.to_string(),
              key: key.to_string(),
              value,
              updated_at: Utc::now() })
  }
}

impl Syncable for UserSetting {
  const TABLE: EntityTable = EntityTable::UserSetting;

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
