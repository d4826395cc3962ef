// Archivo: manager.rs
// Propósito: gestor de sincronización. Drena la cola de operaciones
// pendientes contra el store remoto, reconcilia por recencia y aplica las
// mutaciones del usuario de forma optimista.
use crate::errors::SyncError;
use crate::sync::connectivity::Connectivity;
use crate::sync::dispatch::dispatch_mutation;
use chrono::Utc;
use log::{debug, info, warn};
use record_store::{LocalStore, PendingOperationQueue, RemoteStore};
use sample_domain::{EntityMutation, EntityRecord, EntityTable, LocalEffect};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use uuid::Uuid;

/// Motivo por el que una operación de sincronización no se ejecutó.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
  Offline,
  AlreadyRunning,
}

/// Resultado de un drenado de la cola.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainReport {
  pub skipped: Option<SkipReason>,
  /// Operaciones aplicadas y retiradas de la cola.
  pub applied: usize,
  /// Operaciones rechazadas que siguen en cola, con el error recibido.
  pub failed: Vec<(Uuid, String)>,
  /// La conectividad cayó a mitad de drenado.
  pub interrupted: bool,
  /// Tamaño de la cola al terminar.
  pub remaining: usize,
}

impl DrainReport {
  fn skipped(reason: SkipReason) -> Self {
    Self { skipped: Some(reason), ..Default::default() }
  }

  pub fn is_skipped(&self) -> bool {
    self.skipped.is_some()
  }

  /// Convierte los fallos registrados en un error.
  pub fn ensure_clean(&self) -> Result<(), SyncError> {
    match self.failed.first() {
      None => Ok(()),
      Some((_, first)) => Err(SyncError::PartialDrain { failed: self.failed.len(), first_error: first.clone() }),
    }
  }
}

/// Resultado de una reconciliación completa.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
  pub skipped: Option<SkipReason>,
  /// Drenado previo a la reconciliación.
  pub drain: DrainReport,
  /// Registros remotos copiados al store local.
  pub imported: usize,
  /// Registros locales iguales o más recientes que el remoto.
  pub unchanged: usize,
  /// Registros locales borrados por no existir en remoto.
  pub deleted: usize,
}

impl ReconcileReport {
  fn skipped(reason: SkipReason) -> Self {
    Self { skipped: Some(reason), ..Default::default() }
  }

  pub fn is_skipped(&self) -> bool {
    self.skipped.is_some()
  }
}

/// Destino de una mutación enviada con `submit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
  /// Aplicada directamente en el store remoto.
  Sent,
  /// Encolada con el id indicado.
  Queued(Uuid),
}

/// Libera el guard de sincronización al salir de ámbito y despierta a quien
/// espera en `wait_until_idle`.
struct SyncGuard<'a> {
  running: &'a AtomicBool,
  released: &'a Notify,
}

impl Drop for SyncGuard<'_> {
  fn drop(&mut self) {
    self.running.store(false, Ordering::Release);
    self.released.notify_waiters();
  }
}

/// Gestor de sincronización. Se construye una vez y se comparte con `Arc`.
pub struct SyncManager {
  local: Arc<dyn LocalStore>,
  queue: PendingOperationQueue,
  remote: Arc<dyn RemoteStore>,
  connectivity: Arc<dyn Connectivity>,
  running: AtomicBool,
  released: Notify,
}

impl SyncManager {
  pub fn new<L>(local: Arc<L>, remote: Arc<dyn RemoteStore>, connectivity: Arc<dyn Connectivity>) -> Result<Self, SyncError>
    where L: LocalStore + 'static
  {
    let queue = PendingOperationQueue::new(local.clone())?;
    Ok(Self { local, queue, remote, connectivity, running: AtomicBool::new(false), released: Notify::new() })
  }

  pub fn queue(&self) -> &PendingOperationQueue {
    &self.queue
  }

  pub fn pending_count(&self) -> Result<usize, SyncError> {
    Ok(self.queue.len()?)
  }

  /// Hay un drenado o una reconciliación en curso.
  pub fn is_syncing(&self) -> bool {
    self.running.load(Ordering::Acquire)
  }

  fn try_acquire(&self) -> Option<SyncGuard<'_>> {
    self.running
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .ok()
        .map(|_| SyncGuard { running: &self.running, released: &self.released })
  }

  /// Espera a que termine la sincronización en curso, si la hay.
  async fn wait_until_idle(&self) {
    let released = self.released.notified();
    tokio::pin!(released);
    released.as_mut().enable();
    if self.is_syncing() {
      released.await;
    }
  }

  /// Aplica la mutación en el store local y la envía al remoto si hay
  /// conexión; si no la hay, o el envío falla, la encola.
  pub async fn submit(&self, mut mutation: EntityMutation) -> Result<SubmitOutcome, SyncError> {
    let now = Utc::now();
    mutation.stamp(now);
    let table = mutation.entity_table();
    let current = self.local.get_entity(table, mutation.target_id())?;
    match mutation.local_effect(current.as_ref(), now)? {
      LocalEffect::Put(record) => self.local.put_entity(&record)?,
      LocalEffect::Delete { table, id } => {
        self.local.delete_entity(table, &id)?;
      }
      LocalEffect::Missing { table, id } => debug!("sin copia local de {} {}; sólo se envía el cambio", table, id),
    }

    if self.connectivity.is_online() {
      match dispatch_mutation(self.remote.as_ref(), &mutation).await {
        Ok(()) => return Ok(SubmitOutcome::Sent),
        Err(e) => warn!("envío directo de {} {} falló, se encola: {}", table, mutation.target_id(), e),
      }
    }
    let op = self.queue.enqueue(mutation)?;
    Ok(SubmitOutcome::Queued(op.id))
  }

  /// Aplica las operaciones pendientes en orden FIFO.
  ///
  /// Sin conexión o con otra sincronización en curso no hace nada y lo
  /// indica en `skipped`. Las operaciones rechazadas quedan en cola.
  pub async fn drain_pending_operations(&self) -> Result<DrainReport, SyncError> {
    if !self.connectivity.is_online() {
      debug!("drenado omitido: sin conexión");
      return Ok(DrainReport::skipped(SkipReason::Offline));
    }
    let Some(_guard) = self.try_acquire() else {
      debug!("drenado omitido: sincronización en curso");
      return Ok(DrainReport::skipped(SkipReason::AlreadyRunning));
    };
    self.drain_locked().await
  }

  async fn drain_locked(&self) -> Result<DrainReport, SyncError> {
    let mut report = DrainReport::default();
    for op in self.queue.list_all()? {
      if !self.connectivity.is_online() {
        info!("conexión perdida durante el drenado; se reanuda en la próxima sincronización");
        report.interrupted = true;
        break;
      }
      match dispatch_mutation(self.remote.as_ref(), &op.mutation).await {
        Ok(()) => {
          self.queue.remove(&op.id)?;
          report.applied += 1;
          debug!("aplicada {} {} {}", op.kind(), op.entity_table(), op.target_id());
        }
        Err(e) => {
          warn!("operación {} ({} {} {}) rechazada: {}", op.id, op.kind(), op.entity_table(), op.target_id(), e);
          report.failed.push((op.id, e.to_string()));
        }
      }
    }
    report.remaining = self.queue.len()?;
    if report.applied > 0 || !report.failed.is_empty() {
      info!("drenado: {} aplicadas, {} fallidas, {} pendientes",
            report.applied,
            report.failed.len(),
            report.remaining);
    }
    Ok(report)
  }

  /// Drena la cola y reconcilia cada tabla de `scope` con la copia remota:
  /// gana el `updated_at` estrictamente mayor y los registros ausentes en
  /// remoto se borran localmente.
  pub async fn full_reconcile(&self, scope: &[EntityTable]) -> Result<ReconcileReport, SyncError> {
    if !self.connectivity.is_online() {
      debug!("reconciliación omitida: sin conexión");
      return Ok(ReconcileReport::skipped(SkipReason::Offline));
    }
    let Some(_guard) = self.try_acquire() else {
      debug!("reconciliación omitida: sincronización en curso");
      return Ok(ReconcileReport::skipped(SkipReason::AlreadyRunning));
    };

    let mut report = ReconcileReport { drain: self.drain_locked().await?, ..Default::default() };
    if report.drain.interrupted {
      return Ok(report);
    }

    for &table in scope {
      let remote_records = self.remote.fetch_all(table).await?;
      let local_records: HashMap<String, EntityRecord> = self.local
                                                             .list_entities(table)?
                                                             .into_iter()
                                                             .map(|r| (r.id.clone(), r))
                                                             .collect();
      let remote_ids: HashSet<String> = remote_records.iter().map(|r| r.id.clone()).collect();

      for remote in remote_records {
        let newer = match local_records.get(&remote.id) {
          Some(local) => remote.is_newer_than(local),
          None => true,
        };
        if newer {
          self.local.put_entity(&remote)?;
          report.imported += 1;
        } else {
          report.unchanged += 1;
        }
      }

      for id in local_records.keys().filter(|id| !remote_ids.contains(*id)) {
        if self.local.delete_entity(table, id)? {
          report.deleted += 1;
        }
      }
    }
    info!("reconciliación: {} importados, {} sin cambios, {} borrados",
          report.imported,
          report.unchanged,
          report.deleted);
    Ok(report)
  }

  /// Observa la señal de conectividad y lanza una reconciliación completa
  /// en cada paso de desconectado a conectado. Termina cuando se suelta el
  /// emisor de la señal.
  pub async fn watch_connectivity(&self, mut rx: watch::Receiver<bool>, scope: Vec<EntityTable>) {
    let mut was_online = *rx.borrow_and_update();
    while rx.changed().await.is_ok() {
      let online = *rx.borrow_and_update();
      if online && !was_online {
        info!("conexión restablecida; reconciliando {} tablas", scope.len());
        let mut outcome = self.full_reconcile(&scope).await;
        if matches!(&outcome, Ok(r) if r.skipped == Some(SkipReason::AlreadyRunning)) {
          // Un único reintento cuando termine la sincronización en curso.
          debug!("reconciliación tras reconectar en espera de la sincronización en curso");
          self.wait_until_idle().await;
          outcome = self.full_reconcile(&scope).await;
        }
        match outcome {
          Ok(report) if report.is_skipped() => debug!("reconciliación omitida: {:?}", report.skipped),
          Ok(report) => {
            if let Err(e) = report.drain.ensure_clean() {
              warn!("{}", e);
            }
          }
          Err(e) => warn!("reconciliación tras reconectar falló: {}", e),
        }
      }
      was_online = online;
    }
    debug!("señal de conectividad cerrada");
  }
}
