// Archivo: progress.rs
// Propósito: relé de progreso. Mientras el worker corre, esta tarea es la
// única que escribe el job: aplica cada evento y lo persiste.
use log::{debug, warn};
use record_store::LocalStore;
use sample_domain::{ProcessingJob, ProgressEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Lanza el relé. Devuelve el job actualizado cuando el canal se cierra
/// (todos los `ProgressSink` soltados).
pub fn spawn_relay(store: Arc<dyn LocalStore>,
                   mut job: ProcessingJob,
                   mut rx: mpsc::Receiver<ProgressEvent>)
                   -> JoinHandle<ProcessingJob> {
  tokio::spawn(async move {
    while let Some(event) = rx.recv().await {
      if !job.record_progress(event.progress_percentage, &event.status_message) {
        debug!("job {}: progreso {}% ignorado (ya en {}%)",
               job.id,
               event.progress_percentage,
               job.progress_percentage);
        continue;
      }
      if let Err(e) = store.update_job(&job) {
        warn!("job {}: no se pudo guardar el progreso: {}", job.id, e);
      }
    }
    job
  })
}
