//! sync-engine: núcleo offline de Poleshift
//!
//! Define el gestor de sincronización (`SyncManager`), que drena la cola de
//! operaciones pendientes y reconcilia el store local con el remoto por
//! recencia, y el coordinador de procesamiento (`ProcessingCoordinator`),
//! que ejecuta jobs sobre un worker nativo con progreso y guardado por
//! lotes. Ambos trabajan sobre los contratos de `record-store`.

pub mod config;
pub mod data_type;
pub mod errors;
pub mod processing;
pub mod sync;

pub use config::{EngineConfig, ProcessingConfig};
pub use data_type::DataType;
pub use errors::{ConfigError, ProcessingError, SyncError};
pub use processing::{JobOutcome, NativeWorker, ProcessRequest, ProcessingCoordinator, ProgressSink};
pub use sync::{Connectivity, ConnectivitySignal, DrainReport, ReconcileReport, SkipReason, SubmitOutcome, SyncManager};
