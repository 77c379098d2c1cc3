//! wardd: serves one shared allocation table to local requesters.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::Instrument;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use ward::transport::{ServerConfig, serve};
use ward::{BedService, FileAuditSink, SaturationPolicy, ServiceConfig, TableLimits};

/// How long in-flight requests get to finish after the server stops accepting.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Hospital bed allocation server
#[derive(Debug, Parser)]
#[command(name = "wardd", version, about, long_about = None)]
struct Args {
    /// Path of the ingress socket
    #[arg(long, env = "WARD_SOCKET", default_value = "/tmp/ward.sock")]
    socket: PathBuf,

    /// Name of the shared allocation table, recorded on every log line
    #[arg(long, env = "WARD_INSTANCE", default_value = "ward")]
    instance: String,

    /// Number of regular beds
    #[arg(long, env = "WARD_REGULAR_BEDS", default_value_t = 10)]
    regular_beds: usize,

    /// Number of emergency beds, used only for critical patients
    #[arg(long, env = "WARD_EMERGENCY_BEDS", default_value_t = 3)]
    emergency_beds: usize,

    /// Total patient identifiers this table can hand out
    #[arg(long, env = "WARD_MAX_PATIENTS", default_value_t = 100)]
    max_patients: usize,

    /// Requests processed concurrently
    #[arg(long, env = "WARD_WORKERS", default_value_t = 8)]
    workers: usize,

    /// Admitted requests allowed to wait for a handler
    #[arg(long, env = "WARD_QUEUE_DEPTH", default_value_t = 64)]
    queue_depth: usize,

    /// What to do when the queue is full: wait or reject
    #[arg(long, env = "WARD_WHEN_SATURATED", default_value = "wait")]
    when_saturated: SaturationPolicy,

    /// File release events are appended to
    #[arg(long, env = "WARD_AUDIT_LOG", default_value = "patient_log.txt")]
    audit_log: PathBuf,
}

impl Args {
    fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            instance: self.instance.clone(),
            limits: TableLimits {
                regular_beds: self.regular_beds,
                emergency_beds: self.emergency_beds,
                max_patients: self.max_patients,
            },
            workers: self.workers,
            queue_depth: self.queue_depth,
            when_saturated: self.when_saturated,
        }
    }
}

/// `RUST_LOG` wins. Otherwise `WARD_LOG` picks the level for ward crates.
fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match std::env::var("WARD_LOG").as_deref() {
            Ok("trace") => "trace",
            Ok("debug") => "debug",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("ward={level},wardd={level}"))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing();

    let span = tracing::info_span!("serve", instance = %args.instance);
    run(args).instrument(span).await
}

async fn run(args: Args) -> anyhow::Result<()> {
    let audit = Arc::new(FileAuditSink::new(&args.audit_log));
    tracing::info!(path = %args.audit_log.display(), "Appending release events to audit log");

    let service = Arc::new(BedService::new(args.service_config(), audit)?);
    let server = ServerConfig {
        socket_path: args.socket,
    };

    serve(server, Arc::clone(&service)).await?;

    if !service.drain(DRAIN_TIMEOUT).await {
        tracing::warn!("Exiting with requests still in flight");
    }
    let health = service.health();
    tracing::info!(
        health = %serde_json::to_string(&health).unwrap_or_default(),
        "Final state"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build_a_valid_config() {
        let args = Args::try_parse_from(["wardd"]).unwrap();
        let config = args.service_config();
        assert!(config.validate().is_ok());
        assert_eq!(args.socket, PathBuf::from("/tmp/ward.sock"));
        assert_eq!(args.audit_log, PathBuf::from("patient_log.txt"));
    }

    #[test]
    fn flags_map_onto_service_config() {
        let args = Args::try_parse_from([
            "wardd",
            "--instance",
            "north-wing",
            "--regular-beds",
            "4",
            "--emergency-beds",
            "0",
            "--max-patients",
            "12",
            "--workers",
            "2",
            "--queue-depth",
            "1",
            "--when-saturated",
            "reject",
        ])
        .unwrap();

        let config = args.service_config();
        assert_eq!(config.instance, "north-wing");
        assert_eq!(
            config.limits,
            TableLimits {
                regular_beds: 4,
                emergency_beds: 0,
                max_patients: 12,
            }
        );
        assert_eq!(config.workers, 2);
        assert_eq!(config.queue_depth, 1);
        assert_eq!(config.when_saturated, SaturationPolicy::Reject);
    }

    #[test]
    fn unknown_policy_is_a_parse_error() {
        assert!(Args::try_parse_from(["wardd", "--when-saturated", "drop"]).is_err());
    }
}
