// Archivo: worker.rs
// Propósito: contrato del worker nativo y canal por el que emite progreso.
use crate::errors::ProcessingError;
use async_trait::async_trait;
use log::debug;
use sample_domain::{ProgressEvent, WorkerRequest, WorkerResult};
use tokio::sync::mpsc;

/// Extremo emisor del canal de progreso que recibe el worker.
///
/// El canal es acotado: `emit` espera si el relé va atrasado. Cuando el
/// receptor ya no existe los eventos se descartan en silencio.
#[derive(Debug, Clone)]
pub struct ProgressSink {
  tx: mpsc::Sender<ProgressEvent>,
}

impl ProgressSink {
  /// Crea un sink y su receptor con la capacidad indicada.
  pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (Self { tx }, rx)
  }

  pub async fn emit(&self, event: ProgressEvent) {
    if self.tx.send(event).await.is_err() {
      debug!("evento de progreso descartado: relé cerrado");
    }
  }

  /// Variante sin espera; devuelve `false` si el evento se descartó.
  pub fn try_emit(&self, event: ProgressEvent) -> bool {
    self.tx.try_send(event).is_ok()
  }
}

/// Worker nativo que ejecuta un job con nombre. El worker no debe retener
/// el `ProgressSink` más allá de la invocación.
#[async_trait]
pub trait NativeWorker: Send + Sync {
  async fn invoke(&self, request: WorkerRequest, progress: ProgressSink) -> Result<WorkerResult, ProcessingError>;
}
