//! Crate `record-store`: contratos de almacenamiento del núcleo offline
//!
//! Define los traits del store local (`EntityStore`, `OperationLog`,
//! `JobStore`, agrupados en `LocalStore`), del store remoto (`RemoteStore`) y
//! del store de objetos (`ObjectStore`), la fachada de la cola de operaciones
//! pendientes (`PendingOperationQueue`) y stubs en memoria para pruebas.
//!
//! Diseño resumido:
//! - El store local es síncrono y durable; el remoto y el de objetos son
//!   asíncronos.
//! - La cola es FIFO por `enqueued_at` y sólo se vacía con acuses remotos.
//! - Los lotes de filas de detalle respetan `max_rows_per_statement()`.
//!
//! Ejemplo rápido:
//! ```rust
//! use record_store::stubs::InMemoryLocalStore;
//! use record_store::PendingOperationQueue;
//! use std::sync::Arc;
//! let store = Arc::new(InMemoryLocalStore::new());
//! let queue = PendingOperationQueue::new(store).unwrap();
//! assert_eq!(queue.len().unwrap(), 0);
//! ```
pub mod errors;
pub mod queue;
pub mod repository;
pub mod stubs;

pub use errors::*;
pub use queue::*;
pub use repository::*;
pub use stubs::*;
