//! Shutdown signal sources

use super::DaemonError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Notify;

/// Something that eventually asks the daemon to stop
#[async_trait]
pub trait SignalSource: Send {
    /// Resolves once shutdown is requested, naming the cause.
    async fn wait_for_shutdown(&mut self) -> Result<String, DaemonError>;
}

/// SIGINT and SIGTERM from the operating system
#[derive(Debug, Default)]
pub struct OsSignals;

#[async_trait]
impl SignalSource for OsSignals {
    async fn wait_for_shutdown(&mut self) -> Result<String, DaemonError> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut terminate = signal(SignalKind::terminate())?;
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result?;
                    Ok("SIGINT".to_string())
                }
                _ = terminate.recv() => Ok("SIGTERM".to_string()),
            }
        }

        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await?;
            Ok("ctrl-c".to_string())
        }
    }
}

/// In-process signal source fired through a [`ManualTrigger`]
pub struct ManualSignal {
    notify: Arc<Notify>,
}

/// Handle that fires a [`ManualSignal`]
#[derive(Clone)]
pub struct ManualTrigger {
    notify: Arc<Notify>,
}

impl ManualTrigger {
    pub fn fire(&self) {
        self.notify.notify_one();
    }
}

pub fn manual_signal() -> (ManualSignal, ManualTrigger) {
    let notify = Arc::new(Notify::new());
    (
        ManualSignal {
            notify: Arc::clone(&notify),
        },
        ManualTrigger { notify },
    )
}

#[async_trait]
impl SignalSource for ManualSignal {
    async fn wait_for_shutdown(&mut self) -> Result<String, DaemonError> {
        self.notify.notified().await;
        Ok("manual trigger".to_string())
    }
}
