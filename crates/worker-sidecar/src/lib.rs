//! Worker nativo de procesamiento como proceso externo.
//!
//! `SidecarWorker` implementa `sync_engine::NativeWorker` lanzando un
//! programa que recibe la petición por stdin y responde con líneas JSON por
//! stdout.
pub mod errors;
pub mod message;
pub mod sidecar;

pub use errors::SidecarError;
pub use message::SidecarMessage;
pub use sidecar::{SidecarWorker, WORKER_CMD_ENV};
