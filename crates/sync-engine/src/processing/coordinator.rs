// Archivo: coordinator.rs
// Propósito: coordinador de jobs de procesamiento.
//
// Ciclo de un job: Initiated (placeholder, 0%) -> Processing (worker en
// curso, progreso vía relé) -> Saving (filas por lotes) -> Complete (100%).
// Cualquier fallo tras crear el placeholder deja el job en Error. Dos
// llamadas con la misma `JobKey` comparten una única ejecución.
use crate::config::ProcessingConfig;
use crate::data_type::DataType;
use crate::errors::ProcessingError;
use crate::processing::batch::{commit_results, CommitSummary};
use crate::processing::progress::spawn_relay;
use crate::processing::validation::validate_request;
use crate::processing::worker::{NativeWorker, ProgressSink};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, info, warn};
use record_store::{LocalStore, ObjectStore};
use sample_domain::{JobKey, JobState, ProcessingJob, WorkerRequest, WorkerResult};
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Petición de procesamiento de una muestra.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRequest {
  pub data_type: DataType,
  pub user_id: String,
  pub org_id: String,
  pub file_paths: Vec<String>,
  /// Entradas adicionales del formulario (p. ej. `ammoniaValue`).
  pub inputs: JsonValue,
}

/// Resultado de un job completado.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
  pub job: ProcessingJob,
  pub committed: CommitSummary,
  /// Paths en el store de objetos de los ficheros de entrada subidos.
  pub uploaded_files: Vec<String>,
  /// Informe libre devuelto por el worker.
  pub report: JsonValue,
}

type SharedOutcome = Shared<BoxFuture<'static, Result<JobOutcome, ProcessingError>>>;

/// Ejecución en curso para una clave. `generation` evita que una ejecución
/// terminada retire la entrada de otra posterior con la misma clave.
struct InFlight {
  generation: u64,
  future: SharedOutcome,
}

/// Dependencias de una ejecución; se clona dentro de cada tarea.
#[derive(Clone)]
struct JobRunner {
  store: Arc<dyn LocalStore>,
  objects: Option<Arc<dyn ObjectStore>>,
  config: ProcessingConfig,
}

pub struct ProcessingCoordinator {
  runner: JobRunner,
  in_flight: Arc<DashMap<JobKey, InFlight>>,
  next_generation: AtomicU64,
}

impl ProcessingCoordinator {
  pub fn new(store: Arc<dyn LocalStore>, config: ProcessingConfig) -> Self {
    Self { runner: JobRunner { store, objects: None, config },
           in_flight: Arc::new(DashMap::new()),
           next_generation: AtomicU64::new(0) }
  }

  /// Adjunta el store de objetos usado para subir los ficheros de entrada
  /// cuando `raw_file_bucket` está configurado.
  pub fn with_object_store(mut self, objects: Arc<dyn ObjectStore>) -> Self {
    self.runner.objects = Some(objects);
    self
  }

  pub fn config(&self) -> &ProcessingConfig {
    &self.runner.config
  }

  /// Procesa una muestra. Si ya hay un job en curso con la misma clave, se
  /// espera a ese mismo resultado sin volver a invocar al worker.
  pub async fn process(&self,
                       key: JobKey,
                       worker: Arc<dyn NativeWorker>,
                       request: ProcessRequest)
                       -> Result<JobOutcome, ProcessingError> {
    let future = match self.in_flight.entry(key.clone()) {
      Entry::Occupied(entry) => {
        debug!("job {} ya en curso; se comparte el resultado", key);
        entry.get().future.clone()
      }
      Entry::Vacant(entry) => {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let shared = self.spawn_job(key.clone(), generation, worker, request);
        entry.insert(InFlight { generation, future: shared.clone() });
        shared
      }
    };
    future.await
  }

  fn spawn_job(&self,
               key: JobKey,
               generation: u64,
               worker: Arc<dyn NativeWorker>,
               request: ProcessRequest)
               -> SharedOutcome {
    let runner = self.runner.clone();
    let in_flight = self.in_flight.clone();
    let task_key = key.clone();
    let handle = tokio::spawn(async move {
      let result = runner.execute(&task_key, worker, request).await;
      in_flight.remove_if(&task_key, |_, f| f.generation == generation);
      result
    });

    let in_flight = self.in_flight.clone();
    async move {
      let joined = handle.await;
      // La tarea pudo terminar sin retirar su entrada (pánico).
      in_flight.remove_if(&key, |_, f| f.generation == generation);
      match joined {
        Ok(result) => result,
        Err(e) => Err(ProcessingError::Join(e.to_string())),
      }
    }.boxed()
     .shared()
  }

  pub fn is_in_flight(&self, key: &JobKey) -> bool {
    self.in_flight.contains_key(key)
  }

  pub fn job(&self, id: &Uuid) -> Result<Option<ProcessingJob>, ProcessingError> {
    Ok(self.runner.store.get_job(id)?)
  }

  /// Jobs de una muestra, del más antiguo al más reciente.
  pub fn jobs_for_sample(&self, sample_id: &str) -> Result<Vec<ProcessingJob>, ProcessingError> {
    Ok(self.runner.store.list_jobs(Some(sample_id))?)
  }

  /// Borra un job terminado y sus filas de detalle.
  pub fn delete_job(&self, id: &Uuid) -> Result<(), ProcessingError> {
    if let Some(job) = self.runner.store.get_job(id)? {
      if !job.state.is_terminal() && self.is_in_flight(&job.key()) {
        return Err(ProcessingError::Validation(format!("el job {} sigue en curso", id)));
      }
    }
    Ok(self.runner.store.delete_job(id)?)
  }
}

impl JobRunner {
  async fn execute(&self,
                   key: &JobKey,
                   worker: Arc<dyn NativeWorker>,
                   request: ProcessRequest)
                   -> Result<JobOutcome, ProcessingError> {
    let job_name = validate_request(request.data_type, &key.sample_id, &request.file_paths, &request.inputs)?;

    let mut job = ProcessingJob::placeholder(key, &request.data_type.to_string(), &request.user_id, &request.org_id);
    self.store.insert_job(&job)?;
    info!("job {} ({}) creado para {}", job.id, job_name, key);

    match self.run(&mut job, job_name, worker, &request).await {
      Ok(outcome) => {
        info!("job {} completo: {} lotes", job.id, outcome.committed.batches);
        Ok(outcome)
      }
      Err(err) => {
        self.mark_error(&mut job, &err);
        Err(err)
      }
    }
  }

  async fn run(&self,
               job: &mut ProcessingJob,
               job_name: &str,
               worker: Arc<dyn NativeWorker>,
               request: &ProcessRequest)
               -> Result<JobOutcome, ProcessingError> {
    job.transition(JobState::Processing, "Processing")?;
    self.store.update_job(job)?;

    let result = self.invoke_worker(job, job_name, worker, request).await?;
    if !result.is_success() {
      return Err(ProcessingError::WorkerFailed { status: result.status });
    }
    if result.is_empty() {
      return Err(ProcessingError::EmptyResult);
    }

    job.transition(JobState::Saving, "Saving")?;
    self.store.update_job(job)?;

    let (committed, uploaded_files) = match self.save_results(job, &result, request).await {
      Ok(saved) => saved,
      Err(err) => {
        match self.store.delete_details(&job.id) {
          Ok(n) => warn!("job {}: guardado fallido, {} filas retiradas", job.id, n),
          Err(e) => warn!("job {}: no se pudieron retirar las filas parciales: {}", job.id, e),
        }
        return Err(err);
      }
    };

    job.transition(JobState::Complete, "Complete")?;
    self.store.update_job(job)?;
    Ok(JobOutcome { job: job.clone(), committed, uploaded_files, report: result.report })
  }

  /// Invoca al worker con el relé de progreso activo. El relé se espera en
  /// todos los casos antes de volver a escribir el job.
  async fn invoke_worker(&self,
                         job: &mut ProcessingJob,
                         job_name: &str,
                         worker: Arc<dyn NativeWorker>,
                         request: &ProcessRequest)
                         -> Result<WorkerResult, ProcessingError> {
    let (sink, rx) = ProgressSink::channel(self.config.progress_channel_capacity);
    let relay = spawn_relay(self.store.clone(), job.clone(), rx);

    let worker_request = WorkerRequest { job_name: job_name.to_string(),
                                         sample_id: job.sample_id.clone(),
                                         org_id: job.org_id.clone(),
                                         user_id: job.user_id.clone(),
                                         raw_data_id: job.raw_data_id,
                                         processed_data_id: job.processed_data_id,
                                         file_paths: request.file_paths.clone(),
                                         inputs: request.inputs.clone() };
    let invocation = worker.invoke(worker_request, sink);
    let result = match self.config.worker_timeout {
      Some(limit) => match tokio::time::timeout(limit, invocation).await {
        Ok(r) => r,
        Err(_) => Err(ProcessingError::Timeout(limit.as_secs())),
      },
      None => invocation.await,
    };

    match relay.await {
      Ok(updated) => *job = updated,
      Err(e) => {
        warn!("job {}: el relé de progreso terminó mal: {}", job.id, e);
        if let Some(stored) = self.store.get_job(&job.id)? {
          *job = stored;
        }
      }
    }
    result
  }

  async fn save_results(&self,
                        job: &ProcessingJob,
                        result: &WorkerResult,
                        request: &ProcessRequest)
                        -> Result<(CommitSummary, Vec<String>), ProcessingError> {
    let committed = commit_results(self.store.as_ref(), job, result, self.config.batch_size)
      .map_err(|e| ProcessingError::Persistence(e.to_string()))?;

    let mut uploaded = Vec::new();
    if let (Some(bucket), Some(objects)) = (&self.config.raw_file_bucket, &self.objects) {
      for file in request.file_paths.iter().filter(|p| !p.trim().is_empty()) {
        let name = Path::new(file).file_name()
                                  .and_then(|n| n.to_str())
                                  .ok_or_else(|| ProcessingError::Persistence(format!("nombre de fichero inválido: {}", file)))?;
        let bytes = tokio::fs::read(file).await
                                         .map_err(|e| ProcessingError::Persistence(format!("{}: {}", file, e)))?;
        let path = format!("{}/{}/{}", job.org_id, job.sample_id, name);
        objects.upload(bucket, &path, bytes)
               .await
               .map_err(|e| ProcessingError::Persistence(e.to_string()))?;
        debug!("job {}: fichero subido a {}/{}", job.id, bucket, path);
        uploaded.push(path);
      }
    }
    Ok((committed, uploaded))
  }

  fn mark_error(&self, job: &mut ProcessingJob, err: &ProcessingError) {
    warn!("job {} falló: {}", job.id, err);
    if job.transition(JobState::Error, &err.to_string()).is_err() {
      return;
    }
    if let Err(e) = self.store.update_job(job) {
      warn!("job {}: no se pudo guardar el estado de error: {}", job.id, e);
    }
  }
}
