use crate::DomainError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::fmt;
use std::str::FromStr;

/// Tablas de entidades conocidas que participan en la sincronización.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityTable {
    SampleGroup,
    FileNode,
    UserSetting,
}

impl EntityTable {
    /// Todas las tablas, en el orden usado por una reconciliación completa.
    pub const ALL: [EntityTable; 3] = [EntityTable::SampleGroup, EntityTable::FileNode, EntityTable::UserSetting];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityTable::SampleGroup => "sample_group",
            EntityTable::FileNode => "file_node",
            EntityTable::UserSetting => "user_setting",
        }
    }
}

impl fmt::Display for EntityTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityTable {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sample_group" => Ok(EntityTable::SampleGroup),
            "file_node" => Ok(EntityTable::FileNode),
            "user_setting" => Ok(EntityTable::UserSetting),
            other => Err(DomainError::ValidationError(format!("tabla de entidad desconocida: {}", other))),
        }
    }
}

/// Copia genérica de una entidad tal como la guardan los stores (local o
/// remoto). `data` contiene el documento completo, incluyendo `id` y
/// `updated_at`; los campos homónimos se duplican para poder comparar
/// recencia sin deserializar el tipo concreto.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub table: EntityTable,
    pub id: String,
    pub data: JsonValue,
    pub updated_at: DateTime<Utc>,
}

impl EntityRecord {
    /// Construye un registro a partir de un documento JSON. El documento debe
    /// ser un objeto con `id` (string) y `updated_at` (RFC 3339).
    pub fn from_json(table: EntityTable, data: JsonValue) -> Result<Self, DomainError> {
        let id = data.get("id")
                     .and_then(|v| v.as_str())
                     .ok_or_else(|| DomainError::ValidationError(format!("{}: falta 'id'", table)))?
                     .to_string();
        let updated_at = data.get("updated_at")
                             .and_then(|v| v.as_str())
                             .ok_or_else(|| DomainError::ValidationError(format!("{} {}: falta 'updated_at'", table, id)))
                             .and_then(|s| {
                                 DateTime::parse_from_rfc3339(s)
                                     .map(|dt| dt.with_timezone(&Utc))
                                     .map_err(|e| DomainError::ValidationError(format!("{} {}: updated_at inválido: {}", table, id, e)))
                             })?;
        Ok(Self { table, id, data, updated_at })
    }

    /// Aplica un parche parcial sobre `data` y marca la nueva recencia.
    pub fn apply_updates(&mut self, updates: &JsonMap<String, JsonValue>, updated_at: DateTime<Utc>) -> Result<(), DomainError> {
        let obj = self.data
                      .as_object_mut()
                      .ok_or_else(|| DomainError::ValidationError(format!("{} {}: el documento no es un objeto", self.table, self.id)))?;
        for (k, v) in updates {
            if k == "id" {
                continue;
            }
            obj.insert(k.clone(), v.clone());
        }
        obj.insert("updated_at".into(), JsonValue::String(updated_at.to_rfc3339()));
        self.updated_at = updated_at;
        Ok(())
    }

    /// Un registro es estrictamente más reciente que otro si su `updated_at`
    /// es mayor. Empates no cuentan.
    pub fn is_newer_than(&self, other: &EntityRecord) -> bool {
        self.updated_at > other.updated_at
    }
}

/// Trait para entidades tipadas que viajan por la cola de operaciones y se
/// reconcilian contra el store remoto.
pub trait Syncable: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// Tabla a la que pertenece la entidad.
    const TABLE: EntityTable;

    /// Identificador estable entre local y remoto.
    fn id(&self) -> &str;

    /// Marca de recencia autoritativa.
    fn updated_at(&self) -> DateTime<Utc>;

    fn set_updated_at(&mut self, ts: DateTime<Utc>);

    /// Serializa la entidad en un `EntityRecord` genérico.
    fn to_record(&self) -> Result<EntityRecord, DomainError> {
        Ok(EntityRecord { table: Self::TABLE,
                          id: self.id().to_string(),
                          data: serde_json::to_value(self)?,
                          updated_at: self.updated_at() })
    }

    /// Reconstruye la entidad tipada desde un registro genérico.
    fn from_record(record: &EntityRecord) -> Result<Self, DomainError> {
        if record.table != Self::TABLE {
            return Err(DomainError::ValidationError(format!("se esperaba {} pero el registro es de {}",
                                                            Self::TABLE,
                                                            record.table)));
        }
        Ok(serde_json::from_value(record.data.clone())?)
    }
}
