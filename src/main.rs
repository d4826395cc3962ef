use record_store::stubs::{InMemoryObjectStore, InMemoryRemoteStore};
use record_store::{EntityStore, LocalStore};
use sample_domain::{EntityMutation, EntityTable, JobKey, SampleGroup, Syncable};
use serde_json::json;
use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;
use sync_engine::{Connectivity, ConnectivitySignal, DataType, EngineConfig, ProcessRequest, ProcessingCoordinator, SubmitOutcome,
                  SyncManager};
use worker_sidecar::SidecarWorker;

/// Menú interactivo sobre el motor de sincronización y el coordinador de
/// procesamiento.
///
/// El store local es SQLite (`POLESHIFT_DB_URL`). El remoto es un store en
/// memoria: sirve para ver el ciclo offline/online sin backend real.
///
/// Opciones soportadas:
/// 1) Ver operaciones pendientes
/// 2) Crear grupo de muestras
/// 3) Editar notas de un grupo
/// 4) Alternar conectividad
/// 5) Sincronizar ahora
/// 6) Procesar muestra con el worker externo (`POLESHIFT_WORKER_CMD`)
/// 7) Ver jobs de una muestra
/// 8) Salir
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    let config = EngineConfig::from_env()?;
    let local = Arc::new(record_persistence::new_from_env()?);
    let remote = Arc::new(InMemoryRemoteStore::new());
    let signal = Arc::new(ConnectivitySignal::new(false));
    let manager = Arc::new(SyncManager::new(local.clone(), remote.clone(), signal.clone())?);

    let coordinator = ProcessingCoordinator::new(local.clone() as Arc<dyn LocalStore>, config.processing.clone())
        .with_object_store(Arc::new(InMemoryObjectStore::new()));

    tracing::info!(tables = config.reconcile_scope.len(), batch = config.processing.batch_size, "núcleo listo (offline)");

    // Reconciliación automática al volver la conexión.
    {
        let manager = manager.clone();
        let rx = signal.subscribe();
        let scope = config.reconcile_scope.clone();
        tokio::spawn(async move { manager.watch_connectivity(rx, scope).await });
    }

    loop {
        println!("\n== Poleshift core ({}) ==", if signal.is_online() { "online" } else { "offline" });
        println!("1) Ver operaciones pendientes");
        println!("2) Crear grupo de muestras");
        println!("3) Editar notas de un grupo");
        println!("4) Alternar conectividad");
        println!("5) Sincronizar ahora");
        println!("6) Procesar muestra");
        println!("7) Ver jobs de una muestra");
        println!("8) Salir");
        let choice = prompt("Elige una opción: ")?;
        match choice.trim() {
            "1" => match manager.queue().list_all() {
                Ok(ops) if ops.is_empty() => println!("Cola vacía"),
                Ok(ops) => {
                    println!("\nID                                   | ENCOLADA                         | OPERACIÓN");
                    println!("-----------------------------------------------------------------------------------");
                    for op in ops {
                        println!("{} | {} | {} {} {}", op.id, op.enqueued_at, op.kind(), op.entity_table(), op.target_id());
                    }
                }
                Err(e) => eprintln!("Error listando la cola: {}", e),
            },
            "2" => {
                let name = prompt("Nombre del grupo: ")?;
                let org = prompt("Organización: ")?;
                let group = match SampleGroup::new(name.trim(), org.trim()) {
                    Ok(g) => g,
                    Err(e) => { eprintln!("Grupo inválido: {}", e); continue; }
                };
                let id = group.id().to_string();
                match manager.submit(sample_domain::Mutation::insert(group).into()).await {
                    Ok(outcome) => print_outcome(&id, outcome),
                    Err(e) => eprintln!("Error creando grupo: {}", e),
                }
            }
            "3" => {
                let id = prompt("Id del grupo: ")?;
                let id = id.trim();
                match local.get_entity(EntityTable::SampleGroup, id) {
                    Ok(Some(_)) => {}
                    Ok(None) => { eprintln!("No existe el grupo {}", id); continue; }
                    Err(e) => { eprintln!("Error leyendo el grupo: {}", e); continue; }
                }
                let notes = prompt("Notas: ")?;
                let mut updates = serde_json::Map::new();
                updates.insert("notes".into(), json!(notes.trim()));
                match manager.submit(EntityMutation::update(EntityTable::SampleGroup, id, updates)).await {
                    Ok(outcome) => print_outcome(id, outcome),
                    Err(e) => eprintln!("Error editando el grupo: {}", e),
                }
            }
            "4" => {
                let online = !signal.is_online();
                signal.set_online(online);
                println!("Conectividad: {}", if online { "online" } else { "offline" });
            }
            "5" => match manager.drain_pending_operations().await {
                Ok(report) if report.is_skipped() => println!("Sincronización omitida: {:?}", report.skipped),
                Ok(report) => println!("Aplicadas {}, fallidas {}, pendientes {}",
                                       report.applied,
                                       report.failed.len(),
                                       report.remaining),
                Err(e) => eprintln!("Error sincronizando: {}", e),
            },
            "6" => {
                let worker = match SidecarWorker::from_env() {
                    Ok(w) => Arc::new(w),
                    Err(e) => { eprintln!("{}", e); continue; }
                };
                let sample_id = prompt("Id de la muestra: ")?;
                let config_id = prompt("Id de la configuración: ")?;
                let data_type = match DataType::parse_known(&prompt("Tipo (ctd, ammonia, sequence): ")?) {
                    Some(t) => t,
                    None => { eprintln!("Tipo desconocido"); continue; }
                };
                let files = prompt("Ficheros (separados por coma, enter para ninguno): ")?;
                let inputs = if data_type == DataType::NutrientAmmonia {
                    json!({ "ammoniaValue": prompt("Valor de amonio: ")?.trim() })
                } else {
                    json!({})
                };
                let request = ProcessRequest { data_type,
                                               user_id: "local-user".into(),
                                               org_id: "local-org".into(),
                                               file_paths: files.split(',')
                                                                .map(str::trim)
                                                                .filter(|f| !f.is_empty())
                                                                .map(String::from)
                                                                .collect(),
                                               inputs };
                let key = JobKey::new(sample_id.trim(), config_id.trim());
                match coordinator.process(key, worker, request).await {
                    Ok(outcome) => println!("Job {} completo: {} filas raw, {} procesadas, {} ficheros subidos",
                                            outcome.job.id,
                                            outcome.committed.raw_rows,
                                            outcome.committed.processed_rows,
                                            outcome.uploaded_files.len()),
                    Err(e) => eprintln!("Error procesando: {}", e),
                }
            }
            "7" => {
                let sample_id = prompt("Id de la muestra: ")?;
                match coordinator.jobs_for_sample(sample_id.trim()) {
                    Ok(jobs) => {
                        println!("\nID                                   | ESTADO     | %   | MENSAJE");
                        println!("-----------------------------------------------------------------------------------");
                        for j in jobs {
                            println!("{} | {:<10} | {:>3} | {}", j.id, j.state, j.progress_percentage, j.status_message);
                        }
                    }
                    Err(e) => eprintln!("Error listando jobs: {}", e),
                }
            }
            "8" => {
                println!("Saliendo");
                break;
            }
            other => eprintln!("Opción no válida: {}", other),
        }
    }
    Ok(())
}

fn print_outcome(id: &str, outcome: SubmitOutcome) {
    match outcome {
        SubmitOutcome::Sent => println!("{} enviado al remoto", id),
        SubmitOutcome::Queued(op) => println!("{} guardado en local; operación {} en cola", id, op),
    }
}

fn prompt(msg: &str) -> io::Result<String> {
    print!("{}", msg);
    io::stdout().flush()?;
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s)
}
