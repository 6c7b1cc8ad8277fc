#![deny(unsafe_code)]

//! locint CLI: drive the location integration client from a shell.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use locint_config::AppConfig;
use locint_core::build_info;
use locint_core::client::QueryReply;
use locint_core::transport::{SocketPathWatcher, UnixDatagramTransport};
use locint_core::types::{AidingData, EngineRunState, EngineType, XtraStatusEvent};
use locint_core::{
    ClientError, ClientFactory, ConfigTicket, IntegrationClient, QueryTicket, RegistrationState,
};

/// locint: configure the positioning engine through the location daemon.
#[derive(Debug, Parser)]
#[command(name = "locint", version = build_info::VERSION, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "locint.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Seconds to wait for the daemon to answer.
    #[arg(long, default_value_t = 5)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Enable or disable robust location.
    RobustLocation {
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        enable: bool,

        /// Also use robust location for emergency calls.
        #[arg(long, default_value_t = false, action = ArgAction::Set)]
        e911: bool,
    },

    /// Show the robust location settings reported by the daemon.
    GetRobustLocation,

    /// Set the minimum GPS week.
    MinGpsWeek { week: u16 },

    /// Show the minimum GPS week.
    GetMinGpsWeek,

    /// Set the minimum satellite elevation, in degrees.
    MinSvElevation {
        #[arg(value_parser = clap::value_parser!(u8).range(0..=90))]
        degrees: u8,
    },

    /// Pause or resume a positioning engine.
    EngineRunState {
        #[arg(value_enum)]
        engine: EngineArg,

        #[arg(value_enum)]
        state: RunStateArg,
    },

    /// Delete aiding data held by the engine.
    DeleteAidingData {
        /// Delete everything.
        #[arg(long, conflicts_with_all = ["ephemeris", "dr_calibration"])]
        all: bool,

        #[arg(long)]
        ephemeris: bool,

        /// Dead-reckoning sensor calibration.
        #[arg(long)]
        dr_calibration: bool,
    },

    /// Show the data-source download status.
    XtraStatus {
        /// Keep printing status changes until interrupted.
        #[arg(long)]
        watch: bool,
    },

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EngineArg {
    Spe,
    Ppe,
    Dre,
    Vpe,
}

impl From<EngineArg> for EngineType {
    fn from(arg: EngineArg) -> Self {
        match arg {
            EngineArg::Spe => EngineType::Spe,
            EngineArg::Ppe => EngineType::Ppe,
            EngineArg::Dre => EngineType::Dre,
            EngineArg::Vpe => EngineType::Vpe,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RunStateArg {
    Pause,
    Resume,
}

impl From<RunStateArg> for EngineRunState {
    fn from(arg: RunStateArg) -> Self {
        match arg {
            RunStateArg::Pause => EngineRunState::Pause,
            RunStateArg::Resume => EngineRunState::Resume,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config).await?;

    let filter = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    debug!(version = %build_info::version_string(), "locint starting");

    if let Commands::Config { show } = cli.command {
        return cmd_config(&cli.config, &config, show);
    }

    let limit = Duration::from_secs(cli.timeout);
    let mut session = Session::connect(&config)?;
    let outcome = run_command(&mut session, cli.command, limit).await;
    session.close().await;
    outcome
}

async fn run_command(session: &mut Session, command: Commands, limit: Duration) -> Result<()> {
    session.wait_registered(limit).await?;
    let client = &session.client;
    match command {
        Commands::RobustLocation { enable, e911 } => {
            confirm(client.config_robust_location(enable, e911)?, limit).await
        }
        Commands::GetRobustLocation => answer(client.get_robust_location_config()?, limit).await,
        Commands::MinGpsWeek { week } => confirm(client.config_min_gps_week(week)?, limit).await,
        Commands::GetMinGpsWeek => answer(client.get_min_gps_week()?, limit).await,
        Commands::MinSvElevation { degrees } => {
            confirm(client.config_min_sv_elevation(degrees)?, limit).await
        }
        Commands::EngineRunState { engine, state } => {
            let ticket = client.config_engine_run_state(engine.into(), state.into())?;
            confirm(ticket, limit).await
        }
        Commands::DeleteAidingData {
            all,
            ephemeris,
            dr_calibration,
        } => {
            let data = aiding_data(all, ephemeris, dr_calibration)?;
            confirm(client.delete_aiding_data(data)?, limit).await
        }
        Commands::XtraStatus { watch } => {
            answer(client.get_xtra_status()?, limit).await?;
            if watch {
                watch_xtra(session, limit).await?;
            }
            Ok(())
        }
        Commands::Config { .. } => Ok(()),
    }
}

fn aiding_data(all: bool, ephemeris: bool, dr_calibration: bool) -> Result<AidingData> {
    if all {
        return Ok(AidingData::All);
    }
    if !ephemeris && !dr_calibration {
        bail!("nothing to delete: pass --all, --ephemeris or --dr-calibration");
    }
    Ok(AidingData::Selected {
        ephemeris,
        dr_sensor_calibration: dr_calibration,
    })
}

/// Wait for a configuration acknowledgement and fail unless it is a success.
async fn confirm(ticket: ConfigTicket, limit: Duration) -> Result<()> {
    let category = ticket.category();
    let response = tokio::time::timeout(limit, ticket.wait())
        .await
        .with_context(|| format!("daemon did not answer {category} within {limit:?}"))??;
    if !response.is_success() {
        bail!("daemon answered {category} with {response}");
    }
    println!("{category}: {response}");
    Ok(())
}

/// Wait for a query report and print it as JSON.
async fn answer<T: QueryReply + Serialize>(ticket: QueryTicket<T>, limit: Duration) -> Result<()> {
    let category = ticket.category();
    let report = tokio::time::timeout(limit, ticket.wait())
        .await
        .with_context(|| format!("daemon did not answer {category} within {limit:?}"))??;
    print_json(&report)
}

async fn watch_xtra(session: &mut Session, limit: Duration) -> Result<()> {
    confirm(session.client.subscribe_xtra_status()?, limit).await?;
    info!("Watching data-source status, press Ctrl-C to stop");

    loop {
        tokio::select! {
            event = session.events.recv() => match event {
                Some(event) => print_json(&event)?,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    confirm(session.client.unsubscribe_xtra_status()?, limit).await
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to render report")?;
    println!("{json}");
    Ok(())
}

fn cmd_config(config_path: &Path, config: &AppConfig, show: bool) -> Result<()> {
    if show {
        let toml_str =
            toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("TOML error: {e}"))?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}

async fn load_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        AppConfig::load(path)
            .await
            .with_context(|| format!("failed to load {}", path.display()))
    } else {
        Ok(AppConfig::default())
    }
}

// ── Session ─────────────────────────────────────────────────────────

/// A client wired to the daemon socket for the lifetime of one command.
struct Session {
    client: IntegrationClient,
    events: mpsc::UnboundedReceiver<XtraStatusEvent>,
    worker: JoinHandle<()>,
    receiver: JoinHandle<()>,
    watcher: JoinHandle<()>,
    transport: UnixDatagramTransport,
}

impl Session {
    fn connect(config: &AppConfig) -> Result<Self> {
        let local = config.client.socket_path(std::process::id());
        let transport = UnixDatagramTransport::bind(local, config.client.daemon_socket.clone())
            .context("failed to bind client socket")?;

        let (events_tx, events) = mpsc::unbounded_channel();
        let (service, client) = ClientFactory::process()
            .builder(config, Arc::new(transport.sender()))
            .status_listener(events_tx)
            .build()?;

        let worker = tokio::spawn(service.run());
        let receiver = transport.spawn_receiver(client.clone());
        let watcher = SocketPathWatcher::new(config.client.daemon_socket.clone(), &config.watcher)
            .spawn(client.clone());

        info!(
            socket = %transport.local_path().display(),
            daemon = %config.client.daemon_socket.display(),
            "Session started"
        );

        Ok(Self {
            client,
            events,
            worker,
            receiver,
            watcher,
            transport,
        })
    }

    async fn wait_registered(&self, limit: Duration) -> Result<()> {
        let registered = async {
            loop {
                if self.client.snapshot().await?.state == RegistrationState::Registered {
                    return Ok::<_, ClientError>(());
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        tokio::time::timeout(limit, registered)
            .await
            .with_context(|| format!("daemon did not accept registration within {limit:?}"))??;
        debug!("Registered");
        Ok(())
    }

    /// Deregister, stop the background tasks, and remove the client socket.
    async fn close(self) {
        if self.client.shutdown().is_ok() {
            let _ = self.worker.await;
        }
        self.receiver.abort();
        self.watcher.abort();
        debug!(socket = %self.transport.local_path().display(), "Session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("locint").chain(args.iter().copied()))
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_robust_location_defaults_to_enable() {
        let cli = parse(&["robust-location"]).unwrap();
        match cli.command {
            Commands::RobustLocation { enable, e911 } => {
                assert!(enable);
                assert!(!e911);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_robust_location_explicit_values() {
        let cli = parse(&["robust-location", "--enable", "false", "--e911", "true"]).unwrap();
        match cli.command {
            Commands::RobustLocation { enable, e911 } => {
                assert!(!enable);
                assert!(e911);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_min_sv_elevation_range() {
        assert!(parse(&["min-sv-elevation", "15"]).is_ok());
        assert!(parse(&["min-sv-elevation", "91"]).is_err());
    }

    #[test]
    fn test_engine_run_state_values() {
        let cli = parse(&["engine-run-state", "dre", "pause"]).unwrap();
        match cli.command {
            Commands::EngineRunState { engine, state } => {
                assert_eq!(EngineType::from(engine), EngineType::Dre);
                assert_eq!(EngineRunState::from(state), EngineRunState::Pause);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(parse(&["engine-run-state", "gps", "pause"]).is_err());
    }

    #[test]
    fn test_delete_all_conflicts_with_selection() {
        assert!(parse(&["delete-aiding-data", "--all", "--ephemeris"]).is_err());
    }

    #[test]
    fn test_aiding_data_selection() {
        assert_eq!(aiding_data(true, false, false).unwrap(), AidingData::All);
        assert_eq!(
            aiding_data(false, true, false).unwrap(),
            AidingData::Selected {
                ephemeris: true,
                dr_sensor_calibration: false,
            }
        );
        assert!(aiding_data(false, false, false).is_err());
    }

    #[test]
    fn test_global_options() {
        let cli = parse(&["-vv", "--timeout", "2", "-c", "other.toml", "get-min-gps-week"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.timeout, 2);
        assert_eq!(cli.config, PathBuf::from("other.toml"));
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).await.unwrap();
        assert_eq!(config.client.name, AppConfig::default().client.name);
    }

    #[test_log::test(tokio::test)]
    async fn test_invalid_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locint.toml");
        std::fs::write(&path, "[client]\nname = \"\"\n").unwrap();
        assert!(load_config(&path).await.is_err());
    }
}
