// Archivo: batch.rs
// Propósito: guardar las filas devueltas por el worker en lotes acotados,
// primero la tabla cruda y después la procesada.
use log::debug;
use record_store::{LocalStore, StoreError};
use sample_domain::{DetailRow, DetailTable, ProcessingJob, WorkerResult};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Filas y lotes confirmados.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
  pub raw_rows: usize,
  pub processed_rows: usize,
  pub batches: usize,
}

/// Tamaño de lote efectivo: nunca supera el límite por sentencia del store.
pub fn effective_batch_size(configured: usize, store_cap: usize) -> usize {
  configured.min(store_cap).max(1)
}

fn detail_rows(job: &ProcessingJob, table: DetailTable, values: &[JsonValue]) -> Vec<DetailRow> {
  let data_id = match table {
    DetailTable::Raw => job.raw_data_id,
    DetailTable::Processed => job.processed_data_id,
  };
  values.iter()
        .enumerate()
        .map(|(i, v)| DetailRow { id: Uuid::new_v4(),
                                  job_id: job.id,
                                  table,
                                  data_id,
                                  ordinal: i as i64,
                                  data: v.clone() })
        .collect()
}

/// Inserta todas las filas del resultado, un lote por llamada y en orden.
/// Se detiene en el primer lote que falle; las filas ya insertadas quedan
/// en el store y el llamador decide cómo compensar.
pub fn commit_results(store: &dyn LocalStore,
                      job: &ProcessingJob,
                      result: &WorkerResult,
                      batch_size: usize)
                      -> Result<CommitSummary, StoreError> {
  let size = effective_batch_size(batch_size, store.max_rows_per_statement());
  let mut summary = CommitSummary::default();
  for table in [DetailTable::Raw, DetailTable::Processed] {
    let rows = detail_rows(job, table, result.rows(table));
    for chunk in rows.chunks(size) {
      store.insert_detail_batch(chunk)?;
      summary.batches += 1;
    }
    debug!("job {}: {} filas {} en lotes de {}", job.id, rows.len(), table, size);
    match table {
      DetailTable::Raw => summary.raw_rows = rows.len(),
      DetailTable::Processed => summary.processed_rows = rows.len(),
    }
  }
  Ok(summary)
}
