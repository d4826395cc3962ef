// mutation.rs
use crate::{DomainError, EntityRecord, EntityTable, FileNode, SampleGroup, Syncable, UserSetting};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Tipo de operación de una mutación encolada.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
  Insert,
  Update,
  Delete,
  Upsert,
}

impl fmt::Display for OperationKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      OperationKind::Insert => "insert",
      OperationKind::Update => "update",
      OperationKind::Delete => "delete",
      OperationKind::Upsert => "upsert",
    };
    write!(f, "{}", s)
  }
}

impl FromStr for OperationKind {
  type Err = DomainError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "insert" => Ok(OperationKind::Insert),
      "update" => Ok(OperationKind::Update),
      "delete" => Ok(OperationKind::Delete),
      "upsert" => Ok(OperationKind::Upsert),
      other => Err(DomainError::ValidationError(format!("tipo de operación desconocido: {}", other))),
    }
  }
}

/// Mutación tipada sobre una entidad `T`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Mutation<T> {
  Insert { record: T },
  Update { id: String, updates: JsonMap<String, JsonValue> },
  Delete { id: String },
  Upsert { record: T },
}

/// Efecto de una mutación sobre el store local.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalEffect {
  /// Sobrescribir (o crear) el registro.
  Put(EntityRecord),
  /// Borrar el registro.
  Delete { table: EntityTable, id: String },
  /// No hay copia local que actualizar (update de un registro ausente).
  Missing { table: EntityTable, id: String },
}

impl<T: Syncable> Mutation<T> {
  pub fn insert(record: T) -> Self {
    Mutation::Insert { record }
  }

  pub fn upsert(record: T) -> Self {
    Mutation::Upsert { record }
  }

  pub fn update(id: &str, updates: JsonMap<String, JsonValue>) -> Self {
    Mutation::Update { id: id.to_string(), updates }
  }

  pub fn delete(id: &str) -> Self {
    Mutation::Delete { id: id.to_string() }
  }

  pub fn kind(&self) -> OperationKind {
    match self {
      Mutation::Insert { .. } => OperationKind::Insert,
      Mutation::Update { .. } => OperationKind::Update,
      Mutation::Delete { .. } => OperationKind::Delete,
      Mutation::Upsert { .. } => OperationKind::Upsert,
    }
  }

  pub fn target_id(&self) -> &str {
    match self {
      Mutation::Insert { record } | Mutation::Upsert { record } => record.id(),
      Mutation::Update { id, .. } | Mutation::Delete { id } => id,
    }
  }

  /// Marca la mutación con la recencia de la edición local, de modo que la
  /// copia remota termine con el mismo `updated_at` que la local.
  pub fn stamp(&mut self, ts: DateTime<Utc>) {
    match self {
      Mutation::Insert { record } | Mutation::Upsert { record } => record.set_updated_at(ts),
      Mutation::Update { updates, .. } => {
        updates.insert("updated_at".into(), JsonValue::String(ts.to_rfc3339()));
      }
      Mutation::Delete { .. } => {}
    }
  }

  /// Calcula el efecto local de la mutación dado el registro actual.
  pub fn local_effect(&self, current: Option<&EntityRecord>, ts: DateTime<Utc>) -> Result<LocalEffect, DomainError> {
    match self {
      Mutation::Insert { record } | Mutation::Upsert { record } => Ok(LocalEffect::Put(record.to_record()?)),
      Mutation::Update { id, updates } => match current {
        Some(existing) => {
          let mut next = existing.clone();
          next.apply_updates(updates, ts)?;
          Ok(LocalEffect::Put(next))
        }
        None => Ok(LocalEffect::Missing { table: T::TABLE, id: id.clone() }),
      },
      Mutation::Delete { id } => Ok(LocalEffect::Delete { table: T::TABLE, id: id.clone() }),
    }
  }
}

/// Mutación sobre cualquiera de las entidades conocidas. Cada variante lleva
/// su payload tipado; el despacho se hace con `match` exhaustivo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity_table", content = "mutation", rename_all = "snake_case")]
pub enum EntityMutation {
  SampleGroup(Mutation<SampleGroup>),
  FileNode(Mutation<FileNode>),
  UserSetting(Mutation<UserSetting>),
}

impl EntityMutation {
  /// Update parcial por id sobre la tabla indicada.
  pub fn update(table: EntityTable, id: &str, updates: JsonMap<String, JsonValue>) -> Self {
    match table {
      EntityTable::SampleGroup => EntityMutation::SampleGroup(Mutation::update(id, updates)),
      EntityTable::FileNode => EntityMutation::FileNode(Mutation::update(id, updates)),
      EntityTable::UserSetting => EntityMutation::UserSetting(Mutation::update(id, updates)),
    }
  }

  pub fn delete(table: EntityTable, id: &str) -> Self {
    match table {
      EntityTable::SampleGroup => EntityMutation::SampleGroup(Mutation::delete(id)),
      EntityTable::FileNode => EntityMutation::FileNode(Mutation::delete(id)),
      EntityTable::UserSetting => EntityMutation::UserSetting(Mutation::delete(id)),
    }
  }

  pub fn entity_table(&self) -> EntityTable {
    match self {
      EntityMutation::SampleGroup(_) => EntityTable::SampleGroup,
      EntityMutation::FileNode(_) => EntityTable::FileNode,
      EntityMutation::UserSetting(_) => EntityTable::UserSetting,
    }
  }

  pub fn kind(&self) -> OperationKind {
    match self {
      EntityMutation::SampleGroup(m) => m.kind(),
      EntityMutation::FileNode(m) => m.kind(),
      EntityMutation::UserSetting(m) => m.kind(),
    }
  }

  pub fn target_id(&self) -> &str {
    match self {
      EntityMutation::SampleGroup(m) => m.target_id(),
      EntityMutation::FileNode(m) => m.target_id(),
      EntityMutation::UserSetting(m) => m.target_id(),
    }
  }

  pub fn stamp(&mut self, ts: DateTime<Utc>) {
    match self {
      EntityMutation::SampleGroup(m) => m.stamp(ts),
      EntityMutation::FileNode(m) => m.stamp(ts),
      EntityMutation::UserSetting(m) => m.stamp(ts),
    }
  }

  pub fn local_effect(&self, current: Option<&EntityRecord>, ts: DateTime<Utc>) -> Result<LocalEffect, DomainError> {
    match self {
      EntityMutation::SampleGroup(m) => m.local_effect(current, ts),
      EntityMutation::FileNode(m) => m.local_effect(current, ts),
      EntityMutation::UserSetting(m) => m.local_effect(current, ts),
    }
  }
}

impl From<Mutation<SampleGroup>> for EntityMutation {
  fn from(m: Mutation<SampleGroup>) -> Self {
    EntityMutation::SampleGroup(m)
  }
}

impl From<Mutation<FileNode>> for EntityMutation {
  fn from(m: Mutation<FileNode>) -> Self {
    EntityMutation::FileNode(m)
  }
}

impl From<Mutation<UserSetting>> for EntityMutation {
  fn from(m: Mutation<UserSetting>) -> Self {
    EntityMutation::UserSetting(m)
  }
}

/// Mutación encolada a la espera de aplicarse en el store remoto.
///
/// Nunca se modifica una vez encolada: las correcciones se expresan como una
/// nueva operación.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
  pub id: Uuid,
  pub mutation: EntityMutation,
  pub enqueued_at: DateTime<Utc>,
}

impl PendingOperation {
  pub fn new(mutation: EntityMutation, enqueued_at: DateTime<Utc>) -> Self {
    Self { id: Uuid::new_v4(), mutation, enqueued_at }
  }

  pub fn kind(&self) -> OperationKind {
    self.mutation.kind()
  }

  pub fn entity_table(&self) -> EntityTable {
    self.mutation.entity_table()
  }

  pub fn target_id(&self) -> &str {
    self.mutation.target_id()
  }
}
