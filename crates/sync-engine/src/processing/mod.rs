//! Coordinación de jobs de procesamiento: validación, worker nativo, relé de
//! progreso, guardado por lotes y deduplicación por clave.
pub mod batch;
pub mod coordinator;
pub mod progress;
pub mod validation;
pub mod worker;

pub use batch::{commit_results, effective_batch_size, CommitSummary};
pub use coordinator::{JobOutcome, ProcessRequest, ProcessingCoordinator};
pub use validation::validate_request;
pub use worker::{NativeWorker, ProgressSink};
