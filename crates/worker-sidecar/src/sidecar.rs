// Archivo: sidecar.rs
// Propósito: ejecutar el worker nativo como proceso hijo.
//
// Protocolo: el nombre del job va como último argumento; la petición se
// escribe en stdin como JSON; el hijo responde por stdout con una línea
// JSON por mensaje (`progress`, `log`, `result`). Un código de salida
// distinto de cero o la falta de `result` es un error.
use crate::errors::SidecarError;
use crate::message::SidecarMessage;
use async_trait::async_trait;
use log::{debug, info, warn};
use sample_domain::{WorkerRequest, WorkerResult};
use std::process::Stdio;
use sync_engine::{NativeWorker, ProcessingError, ProgressSink};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

pub const WORKER_CMD_ENV: &str = "POLESHIFT_WORKER_CMD";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarWorker {
  program: String,
  args: Vec<String>,
  env: Vec<(String, String)>,
}

impl SidecarWorker {
  pub fn new(program: &str) -> Self {
    Self { program: program.to_string(), args: Vec::new(), env: Vec::new() }
  }

  pub fn with_args<I, S>(mut self, args: I) -> Self
    where I: IntoIterator<Item = S>,
          S: Into<String>
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn with_env(mut self, key: &str, value: &str) -> Self {
    self.env.push((key.to_string(), value.to_string()));
    self
  }

  /// Construye el worker a partir de una línea de comando separada por
  /// espacios (p. ej. `python3 -m poleshift_worker`).
  pub fn from_command_line(line: &str) -> Result<Self, SidecarError> {
    let mut parts = line.split_whitespace();
    let program = parts.next().ok_or_else(|| SidecarError::NotConfigured("comando vacío".into()))?;
    Ok(Self::new(program).with_args(parts))
  }

  /// Lee `POLESHIFT_WORKER_CMD` (con `.env` si existe).
  pub fn from_env() -> Result<Self, SidecarError> {
    dotenvy::dotenv().ok();
    let line = std::env::var(WORKER_CMD_ENV).map_err(|_| SidecarError::NotConfigured(WORKER_CMD_ENV.into()))?;
    Self::from_command_line(&line)
  }

  pub fn program(&self) -> &str {
    &self.program
  }

  /// Ejecuta un job y reenvía el progreso a `progress` según llega.
  pub async fn run(&self, request: &WorkerRequest, progress: &ProgressSink) -> Result<WorkerResult, SidecarError> {
    let mut payload = serde_json::to_vec(request)?;
    payload.push(b'\n');

    let mut cmd = Command::new(&self.program);
    cmd.args(&self.args)
       .arg(&request.job_name)
       .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
       .stdin(Stdio::piped())
       .stdout(Stdio::piped())
       .stderr(Stdio::piped())
       .kill_on_drop(true);
    let mut child = cmd.spawn().map_err(|e| SidecarError::Spawn { program: self.program.clone(), message: e.to_string() })?;
    debug!("worker '{}' lanzado para {}", self.program, request.job_name);

    let mut stdin = child.stdin.take().ok_or_else(|| SidecarError::Io("stdin no disponible".into()))?;
    let stdout = child.stdout.take().ok_or_else(|| SidecarError::Io("stdout no disponible".into()))?;
    let mut stderr = child.stderr.take().ok_or_else(|| SidecarError::Io("stderr no disponible".into()))?;

    // stdin y stderr en tareas aparte para no bloquear la lectura de stdout.
    let writer = tokio::spawn(async move {
      let res = stdin.write_all(&payload).await;
      let _ = stdin.shutdown().await;
      res
    });
    let stderr_reader = tokio::spawn(async move {
      let mut buf = String::new();
      let _ = stderr.read_to_string(&mut buf).await;
      buf
    });

    let mut result = None;
    let mut lines = BufReader::new(stdout).lines();
    while let Some(line) = lines.next_line().await? {
      match SidecarMessage::parse_line(&line) {
        None => {}
        Some(Ok(SidecarMessage::Progress(event))) => progress.emit(event).await,
        Some(Ok(SidecarMessage::Result(r))) => result = Some(r),
        Some(Ok(SidecarMessage::Log { level, message })) => info!("[worker {}] {}", level, message),
        Some(Err(e)) => debug!("línea del worker ignorada ({}): {}", e, line),
      }
    }

    let status = child.wait().await?;
    if let Ok(Err(e)) = writer.await {
      // El hijo puede cerrar stdin sin leerlo.
      debug!("escritura de la petición al worker: {}", e);
    }
    let stderr = stderr_reader.await.unwrap_or_default().trim().to_string();

    if !status.success() {
      warn!("worker '{}' terminó con {:?}", self.program, status.code());
      return Err(SidecarError::Exit { code: status.code(), stderr });
    }
    result.ok_or(SidecarError::MissingResult { stderr })
  }
}

#[async_trait]
impl NativeWorker for SidecarWorker {
  async fn invoke(&self, request: WorkerRequest, progress: ProgressSink) -> Result<WorkerResult, ProcessingError> {
    Ok(self.run(&request, &progress).await?)
  }
}
