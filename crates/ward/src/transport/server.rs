//! Unix socket server implementation.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use crate::bridge::transport::UnixIngress;
use crate::service::BedService;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub socket_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/tmp/ward.sock"),
        }
    }
}

/// Bind the ingress socket and serve until SIGINT, SIGTERM or
/// [`BedService::trigger_shutdown`].
pub async fn serve(config: ServerConfig, service: Arc<BedService>) -> anyhow::Result<()> {
    let ingress = UnixIngress::bind(&config.socket_path)?;
    info!("Starting ward server on {}", ingress.path().display());

    let shutdown = shutdown_signal(service.shutdown_rx());
    serve_on(ingress, service, shutdown).await
}

/// Accept connections on an already bound ingress until `shutdown` resolves.
///
/// Every connection gets its own task that competes for the admission gate.
/// The ingress socket file is removed when this returns.
pub async fn serve_on<F>(
    ingress: UnixIngress,
    service: Arc<BedService>,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = ingress.accept() => match accepted {
                Ok(stream) => {
                    let service = Arc::clone(&service);
                    tokio::spawn(async move {
                        let _ = service.serve_connection(stream).await;
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            },
        }
    }

    // Stop the service too when the signal came from outside it.
    service.trigger_shutdown();
    drop(ingress);
    info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM, SIGINT, or an explicit request).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed, which only happens when the
/// tokio runtime is misconfigured. That should fail fast at startup.
async fn shutdown_signal(mut shutdown_rx: watch::Receiver<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler - is tokio runtime configured correctly?");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler - is tokio runtime configured correctly?")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let explicit_shutdown = async {
        while !*shutdown_rx.borrow() {
            if shutdown_rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
        _ = explicit_shutdown => {
            info!("Shutdown requested by service...");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::Path;

    use crate::audit::MemoryAuditSink;
    use crate::bridge::protocol::{Command, ResponseKind};
    use crate::client::Client;
    use crate::config::ServiceConfig;
    use crate::patient::{NewPatient, PatientId};

    fn patient(n: usize, critical: bool) -> NewPatient {
        NewPatient {
            name: format!("p{n}"),
            age: 50,
            national_id: format!("nid-{n}"),
            phone: "0300".to_string(),
            critical,
        }
    }

    async fn start(
        path: &Path,
    ) -> (Arc<BedService>, Arc<MemoryAuditSink>, tokio::task::JoinHandle<()>) {
        let audit = Arc::new(MemoryAuditSink::new());
        let service = Arc::new(BedService::new(ServiceConfig::default(), audit.clone()).unwrap());
        let ingress = UnixIngress::bind(path).unwrap();

        let server = tokio::spawn({
            let service = Arc::clone(&service);
            let mut rx = service.shutdown_rx();
            async move {
                let shutdown = async move {
                    let _ = rx.wait_for(|stop| *stop).await;
                };
                serve_on(ingress, service, shutdown).await.unwrap();
            }
        });
        (service, audit, server)
    }

    #[test]
    fn server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/ward.sock"));
    }

    #[tokio::test]
    async fn round_trip_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ward.sock");
        let (service, audit, server) = start(&path).await;
        let client = Client::new(&path).with_label("desk");

        let admitted = client.admit(patient(0, false)).await.unwrap();
        assert_eq!(admitted.message, "Admitted: ID=0 Bed=1");

        let found = client.search("nid-0").await.unwrap();
        assert_eq!(found.message, "ID=0 Name=p0 Age=50 Phone=0300 Bed=1 Critical=0");

        let released = client.release(PatientId::new(0)).await.unwrap();
        assert_eq!(released.message, "Patient released");
        assert_eq!(audit.events().len(), 1);

        let unknown = client.send(Command::Unknown).await.unwrap();
        assert_eq!(unknown.kind(), ResponseKind::UnknownCommand);

        service.trigger_shutdown();
        server.await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn garbage_frame_does_not_stall_other_requesters() {
        use tokio::io::AsyncWriteExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ward.sock");
        let (service, _audit, server) = start(&path).await;

        let mut raw = tokio::net::UnixStream::connect(&path).await.unwrap();
        raw.write_all(&[0, 0, 0, 3, b'{', b'x', b'}']).await.unwrap();

        let response = Client::new(&path).search("nobody").await.unwrap();
        assert_eq!(response.message, "Patient not found");

        service.trigger_shutdown();
        server.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_clients_never_share_a_bed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ward.sock");
        let (service, _audit, server) = start(&path).await;

        let mut tasks = Vec::new();
        for n in 0..20 {
            let client = Client::new(&path);
            tasks.push(tokio::spawn(async move {
                client.admit(patient(n, true)).await.unwrap().message
            }));
        }

        let mut beds = HashSet::new();
        for task in tasks {
            let message = task.await.unwrap();
            match ResponseKind::classify(&message) {
                ResponseKind::Admitted => {
                    let bed = message.rsplit("Bed=").next().unwrap().to_string();
                    assert!(beds.insert(bed), "bed assigned twice: {message}");
                }
                kind => assert_eq!(kind, ResponseKind::NoBeds),
            }
        }
        assert_eq!(beds.len(), 13);
        assert_eq!(service.health().admitted_frames, 20);

        service.trigger_shutdown();
        server.await.unwrap();
    }
}
