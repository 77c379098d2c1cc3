//! wardctl: send one request to a running wardd and print the reply.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ward::{Client, NewPatient, PatientId};

/// Hospital bed allocation client
#[derive(Debug, Parser)]
#[command(name = "wardctl", version, about, long_about = None)]
struct Cli {
    /// Path of the server's ingress socket
    #[arg(long, env = "WARD_SOCKET", default_value = "/tmp/ward.sock")]
    socket: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Admit a patient
    Admit {
        #[arg(long)]
        name: String,
        #[arg(long)]
        age: u32,
        /// National identity number (CNIC)
        #[arg(long)]
        national_id: String,
        #[arg(long)]
        phone: String,
        /// Allow overflow into emergency beds
        #[arg(long)]
        critical: bool,
    },
    /// Release a patient by ID
    Release {
        id: u32,
    },
    /// Look up an active patient by national identity number
    Search {
        national_id: String,
    },
}

impl Cli {
    async fn execute(self) -> anyhow::Result<String> {
        let client = Client::new(self.socket);
        let response = match self.command {
            Command::Admit {
                name,
                age,
                national_id,
                phone,
                critical,
            } => {
                client
                    .admit(NewPatient {
                        name,
                        age,
                        national_id,
                        phone,
                        critical,
                    })
                    .await?
            }
            Command::Release { id } => client.release(PatientId::new(id)).await?,
            Command::Search { national_id } => client.search(national_id).await?,
        };
        Ok(response.message)
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.execute().await {
        Ok(line) => println!("Server response: {line}"),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admit_flags_parse() {
        let cli = Cli::try_parse_from([
            "wardctl",
            "--socket",
            "/run/ward.sock",
            "admit",
            "--name",
            "Ali",
            "--age",
            "42",
            "--national-id",
            "35202-1234567-1",
            "--phone",
            "0300",
            "--critical",
        ])
        .unwrap();

        assert_eq!(cli.socket, PathBuf::from("/run/ward.sock"));
        match cli.command {
            Command::Admit { name, age, critical, .. } => {
                assert_eq!(name, "Ali");
                assert_eq!(age, 42);
                assert!(critical);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn release_and_search_take_positionals() {
        let cli = Cli::try_parse_from(["wardctl", "release", "7"]).unwrap();
        assert!(matches!(cli.command, Command::Release { id: 7 }));

        let cli = Cli::try_parse_from(["wardctl", "search", "111"]).unwrap();
        assert!(matches!(cli.command, Command::Search { national_id } if national_id == "111"));
    }

    #[test]
    fn negative_release_id_is_rejected() {
        assert!(Cli::try_parse_from(["wardctl", "release", "-1"]).is_err());
    }

    #[tokio::test]
    async fn unreachable_server_is_an_error() {
        let cli = Cli {
            socket: PathBuf::from("/nonexistent/ward.sock"),
            command: Command::Search {
                national_id: "111".to_string(),
            },
        };
        assert!(cli.execute().await.is_err());
    }
}
