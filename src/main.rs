#![forbid(unsafe_code)]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{error, info, warn, Level as TraceLevel};
use tracing_subscriber::FmtSubscriber;

use outputd::backend::FileBackend;
use outputd::control::ControlConfig;
use outputd::daemon::{ideal_config, Daemon, Event};
use outputd::output::LiveConfig;
use outputd::rotation::Orientation;
use outputd::store::{ConfigStore, DeviceState};

#[derive(Parser)]
#[command(name = "outputd", version, about = "Display output layout persistence and reconciliation")]
struct Cli {
    /// Store directory, defaults to $OUTPUTD_STORE_DIR or the user data directory
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the stored snapshot of a topology and the global records of its outputs
    Show {
        /// Live configuration file to take the topology from
        #[arg(long, conflicts_with = "topology")]
        live: Option<PathBuf>,
        /// Topology id
        #[arg(long)]
        topology: Option<String>,
    },
    /// Rebuild a live configuration from the stored layout and print it
    Reconcile {
        /// Live configuration file
        live: PathBuf,
        /// Write the result here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
        /// Store the result as the layout of its topology
        #[arg(long)]
        save: bool,
        #[arg(long)]
        laptop: bool,
        #[arg(long)]
        lid_closed: bool,
    },
    /// Keep a live configuration file reconciled, reading events from stdin
    Daemon {
        /// Live configuration file, rewritten on every apply
        live: PathBuf,
        #[arg(long)]
        laptop: bool,
    },
    /// Get or set auto-rotation of the built-in panels
    AutoRotate {
        /// Live configuration file
        live: PathBuf,
        /// New value; prints the current one when omitted
        #[arg(action = clap::ArgAction::Set)]
        enabled: Option<bool>,
    },
}

fn init_logging() -> Result<()> {
    let log_level = match std::env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn show(store: &ConfigStore, live: Option<PathBuf>, topology: Option<String>) -> Result<()> {
    let live = live.map(|path| FileBackend::new(path).read()).transpose()?;
    let topology = match (&live, topology) {
        (Some(live), _) => live.topology_id(),
        (None, Some(topology)) => topology,
        (None, None) => bail!("Either --live or --topology is required"),
    };

    println!("Topology: {topology}");
    match store.load(&topology) {
        Some(snapshot) => {
            println!("Snapshot ({}):", snapshot.id);
            println!("{}", serde_json::to_string_pretty(&snapshot.records)?);
        }
        None => println!("No stored snapshot"),
    }

    if let Some(live) = live {
        for output in live.connected_outputs() {
            match store.globals().read_for(output) {
                Some(record) => {
                    println!("Global record of {} ({}):", output.name, output.hash);
                    println!("{}", serde_json::to_string_pretty(&record)?);
                }
                None => println!("No global record for {} ({})", output.name, output.hash),
            }
        }
    }
    Ok(())
}

fn reconcile(store: &ConfigStore, live: PathBuf, output: Option<PathBuf>, save: bool, device: DeviceState) -> Result<()> {
    let live = FileBackend::new(live).read()?;
    let config = match store.read_config(&live, device, LiveConfig::is_consistent) {
        Some(config) => config,
        None => {
            info!(topology = %live.topology_id(), "No applicable stored layout, using ideal config");
            ideal_config(&live, store.globals())
        }
    };
    if !config.is_consistent() {
        bail!("No consistent configuration for the connected outputs");
    }

    if save {
        store.save(&config)?;
    }
    match output {
        Some(path) => FileBackend::new(path).write(&config)?,
        None => println!("{}", serde_json::to_string_pretty(&config)?),
    }
    Ok(())
}

fn auto_rotate(store: &ConfigStore, live: PathBuf, enabled: Option<bool>) -> Result<()> {
    let live = FileBackend::new(live).read()?;
    let mut control = ControlConfig::load(store.control_path(&live.topology_id()));
    match enabled {
        Some(value) => control.set_panels_auto_rotate(&live, value)?,
        None => println!("{}", control.all_panels_auto_rotate(&live)),
    }
    Ok(())
}

fn parse_switch(value: Option<&str>, on: &str, off: &str) -> Result<bool> {
    match value {
        Some(v) if v == on => Ok(true),
        Some(v) if v == off => Ok(false),
        _ => bail!("Expected '{on}' or '{off}'"),
    }
}

/// One stdin line to a daemon event
fn parse_command(line: &str, backend: &FileBackend) -> Result<Option<Event>> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();

    let event = match command {
        "outputs-changed" => Event::OutputsChanged,
        "changed" => Event::ConfigurationChanged(backend.read()?),
        "orientation" => {
            let value = arg.context("Missing orientation")?;
            Event::Orientation(value.parse::<Orientation>().map_err(anyhow::Error::msg)?)
        }
        "sensor" => Event::OrientationAvailable(parse_switch(arg, "on", "off")?),
        "tablet" => Event::TabletMode(parse_switch(arg, "on", "off")?),
        "lid" => Event::LidChanged {
            closed: parse_switch(arg, "closed", "open")?,
        },
        "auto-rotate" => Event::SetAutoRotate(parse_switch(arg, "on", "off")?),
        "quit" => Event::Shutdown,
        other => bail!("Unknown command '{other}'"),
    };
    Ok(Some(event))
}

fn spawn_stdin_reader(backend: FileBackend, sender: mpsc::Sender<Event>) -> Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("stdin-commands".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        error!("Failed to read stdin: {}", e);
                        break;
                    }
                };
                match parse_command(&line, &backend) {
                    Ok(Some(event)) => {
                        if sender.blocking_send(event).is_err() {
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!(line = %line, error = %e, "Ignoring command"),
                }
            }
            // EOF
            let _ = sender.blocking_send(Event::Shutdown);
        })
        .context("Failed to spawn stdin reader")
}

async fn run_daemon(store: ConfigStore, live: PathBuf, laptop: bool) -> Result<()> {
    let backend = FileBackend::new(live);
    let device = DeviceState {
        is_laptop: laptop,
        lid_closed: false,
    };
    let daemon = Daemon::new(backend.clone(), store, device);
    let _stdin = spawn_stdin_reader(backend, daemon.sender())?;
    info!("Daemon started, reading commands from stdin");
    daemon.run().await
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_logging()?;
    let cli = Cli::parse();

    let store = match cli.store_dir {
        Some(dir) => ConfigStore::new(dir),
        None => ConfigStore::open_default(),
    };
    info!(store = %store.dir().display(), "Using store");

    match cli.command {
        Command::Show { live, topology } => show(&store, live, topology),
        Command::Reconcile {
            live,
            output,
            save,
            laptop,
            lid_closed,
        } => reconcile(
            &store,
            live,
            output,
            save,
            DeviceState {
                is_laptop: laptop,
                lid_closed,
            },
        ),
        Command::Daemon { live, laptop } => run_daemon(store, live, laptop).await,
        Command::AutoRotate { live, enabled } => auto_rotate(&store, live, enabled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        let backend = FileBackend::new("/nonexistent/live.json");
        assert!(matches!(
            parse_command("lid closed", &backend).unwrap(),
            Some(Event::LidChanged { closed: true })
        ));
        assert!(matches!(
            parse_command("orientation top-down", &backend).unwrap(),
            Some(Event::Orientation(Orientation::TopDown))
        ));
        assert!(matches!(parse_command("   ", &backend).unwrap(), None));
        assert!(parse_command("sensor maybe", &backend).is_err());
        assert!(parse_command("changed", &backend).is_err(), "live file is missing");
        assert!(parse_command("reboot", &backend).is_err());
    }
}
