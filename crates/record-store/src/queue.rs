// Archivo: queue.rs
// Propósito: fachada de la cola de operaciones pendientes sobre un
// `OperationLog` durable. Asigna ids y marcas de encolado estrictamente
// crecientes para que el orden FIFO sea total.
use crate::errors::{Result, StoreError};
use crate::repository::OperationLog;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use log::debug;
use sample_domain::{EntityMutation, PendingOperation};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Cola durable de mutaciones locales a la espera del store remoto.
///
/// Varias instancias sobre el mismo log no se coordinan entre sí; se espera
/// una única cola por proceso.
pub struct PendingOperationQueue {
    log: Arc<dyn OperationLog>,
    last_enqueued: Mutex<Option<DateTime<Utc>>>,
}

impl PendingOperationQueue {
    /// Crea la cola. Lee el log existente para continuar la secuencia de
    /// marcas a partir de la última operación persistida.
    pub fn new(log: Arc<dyn OperationLog>) -> Result<Self> {
        let last = log.list_operations()?.iter().map(|op| op.enqueued_at).max();
        Ok(Self { log, last_enqueued: Mutex::new(last) })
    }

    /// Encola una mutación. Cuando retorna `Ok`, la operación ya es durable.
    pub fn enqueue(&self, mutation: EntityMutation) -> Result<PendingOperation> {
        let mut last = self.last_enqueued
                           .lock()
                           .map_err(|e| StoreError::Storage(format!("mutex poisoned: {:?}", e)))?;
        // Resolución de microsegundos: la del almacenamiento persistente.
        let mut ts = Utc::now().trunc_subsecs(6);
        if let Some(prev) = *last {
            if ts <= prev {
                ts = prev + Duration::microseconds(1);
            }
        }
        let op = PendingOperation::new(mutation, ts);
        self.log.append_operation(&op)?;
        *last = Some(ts);
        debug!("encolada {} {} {} ({})", op.kind(), op.entity_table(), op.target_id(), op.id);
        Ok(op)
    }

    /// Todas las operaciones pendientes en orden de encolado.
    pub fn list_all(&self) -> Result<Vec<PendingOperation>> {
        self.log.list_operations()
    }

    /// Elimina una operación ya aplicada. Un id ausente devuelve `Ok(false)`.
    pub fn remove(&self, id: &Uuid) -> Result<bool> {
        self.log.remove_operation(id)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.log.list_operations()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
