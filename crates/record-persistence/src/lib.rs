//! Persistencia local del núcleo offline sobre SQLite.
//! Este archivo expone el módulo `schema` y reexporta el store Diesel que
//! implementa los traits de `record-store`. La implementación detallada está
//! en `local_persistence.rs`.

mod local_persistence;
pub mod schema;

pub use local_persistence::{new_from_env, new_sqlite_for_test, DieselLocalStore, MIGRATIONS, SQLITE_MAX_VARIABLES};
