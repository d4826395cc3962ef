// Archivo: config.rs
// Propósito: configuración del motor (lotes, canal de progreso, timeout del
// worker, bucket de ficheros crudos y tablas a reconciliar), cargada desde
// variables de entorno con `dotenvy`.
use crate::errors::ConfigError;
use sample_domain::EntityTable;
use std::time::Duration;

pub const DEFAULT_BATCH_SIZE: usize = 150;
pub const DEFAULT_PROGRESS_CAPACITY: usize = 64;
pub const DEFAULT_WORKER_TIMEOUT_SECS: u64 = 3600;

/// Parámetros del coordinador de procesamiento.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingConfig {
  /// Filas por lote al guardar resultados. El tamaño efectivo es el mínimo
  /// entre este valor y el límite por sentencia del store.
  pub batch_size: usize,
  /// Capacidad del canal acotado de eventos de progreso.
  pub progress_channel_capacity: usize,
  /// `None` desactiva el timeout.
  pub worker_timeout: Option<Duration>,
  /// Bucket donde se copian los ficheros de entrada; `None` no sube nada.
  pub raw_file_bucket: Option<String>,
}

impl Default for ProcessingConfig {
  fn default() -> Self {
    Self { batch_size: DEFAULT_BATCH_SIZE,
           progress_channel_capacity: DEFAULT_PROGRESS_CAPACITY,
           worker_timeout: Some(Duration::from_secs(DEFAULT_WORKER_TIMEOUT_SECS)),
           raw_file_bucket: None }
  }
}

/// Configuración completa del motor.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
  /// Tablas cubiertas por la reconciliación completa.
  pub reconcile_scope: Vec<EntityTable>,
  pub processing: ProcessingConfig,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self { reconcile_scope: EntityTable::ALL.to_vec(), processing: ProcessingConfig::default() }
  }
}

impl EngineConfig {
  /// Lee `.env` (si existe) y las variables `POLESHIFT_*`.
  pub fn from_env() -> Result<Self, ConfigError> {
    dotenvy::dotenv().ok();
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  /// Construye la configuración a partir de una función de búsqueda de
  /// claves; las ausentes toman el valor por defecto.
  pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where F: Fn(&str) -> Option<String>
  {
    let mut cfg = EngineConfig::default();
    if let Some(v) = lookup("POLESHIFT_BATCH_SIZE") {
      cfg.processing.batch_size = parse_positive("POLESHIFT_BATCH_SIZE", &v)?;
    }
    if let Some(v) = lookup("POLESHIFT_PROGRESS_CAPACITY") {
      cfg.processing.progress_channel_capacity = parse_positive("POLESHIFT_PROGRESS_CAPACITY", &v)?;
    }
    if let Some(v) = lookup("POLESHIFT_WORKER_TIMEOUT_SECS") {
      let secs: u64 = v.trim().parse().map_err(|_| invalid("POLESHIFT_WORKER_TIMEOUT_SECS", &v))?;
      cfg.processing.worker_timeout = if secs == 0 { None } else { Some(Duration::from_secs(secs)) };
    }
    if let Some(v) = lookup("POLESHIFT_RAW_BUCKET") {
      let v = v.trim();
      cfg.processing.raw_file_bucket = if v.is_empty() { None } else { Some(v.to_string()) };
    }
    if let Some(v) = lookup("POLESHIFT_RECONCILE_TABLES") {
      let mut scope = Vec::new();
      for part in v.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let table: EntityTable = part.parse().map_err(|_| invalid("POLESHIFT_RECONCILE_TABLES", part))?;
        if !scope.contains(&table) {
          scope.push(table);
        }
      }
      cfg.reconcile_scope = scope;
    }
    Ok(cfg)
  }
}

fn invalid(key: &str, value: &str) -> ConfigError {
  ConfigError::InvalidValue { key: key.to_string(), value: value.to_string() }
}

fn parse_positive(key: &str, value: &str) -> Result<usize, ConfigError> {
  match value.trim().parse::<usize>() {
    Ok(n) if n > 0 => Ok(n),
    _ => Err(invalid(key, value)),
  }
}
