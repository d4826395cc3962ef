// Archivo: connectivity.rs
// Propósito: señal de conectividad consultada antes de cada paso de
// sincronización y observable para disparar reconciliaciones al reconectar.
use tokio::sync::watch;

/// Consulta del estado de red.
pub trait Connectivity: Send + Sync {
  fn is_online(&self) -> bool;
}

/// Señal de conectividad respaldada por un canal `watch`.
///
/// Quien observa la red (la capa de presentación, un sondeo HTTP, etc.)
/// llama a `set_online`; el núcleo consulta `is_online` y se suscribe para
/// reaccionar a los cambios.
#[derive(Debug)]
pub struct ConnectivitySignal {
  tx: watch::Sender<bool>,
}

impl ConnectivitySignal {
  pub fn new(initially_online: bool) -> Self {
    let (tx, _rx) = watch::channel(initially_online);
    Self { tx }
  }

  /// Publica el nuevo estado. Sólo notifica a los suscriptores si cambia.
  pub fn set_online(&self, online: bool) {
    self.tx.send_if_modified(|current| {
             if *current == online {
               false
             } else {
               *current = online;
               true
             }
           });
  }

  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.tx.subscribe()
  }
}

impl Connectivity for ConnectivitySignal {
  fn is_online(&self) -> bool {
    *self.tx.borrow()
  }
}
