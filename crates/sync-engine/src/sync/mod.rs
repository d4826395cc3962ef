//! Sincronización offline: conectividad, despacho de mutaciones al store
//! remoto y el gestor que drena la cola y reconcilia por recencia.
pub mod connectivity;
pub mod dispatch;
pub mod manager;

pub use connectivity::{Connectivity, ConnectivitySignal};
pub use dispatch::dispatch_mutation;
pub use manager::{DrainReport, ReconcileReport, SkipReason, SubmitOutcome, SyncManager};
