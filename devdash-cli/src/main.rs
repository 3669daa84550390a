mod actions;
mod collectors;
mod commands;
mod inspect;
mod poller;
mod system;
mod ui;

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use devdash_core::config::{DevdashConfig, default_config_path, default_data_dir};
use devdash_core::pipeline::Pipeline;
use devdash_core::resolver::{ManifestReader, PackageJsonReader, ProjectResolver};
use devdash_core::source::{ContainerSource, ProcessSource};

use actions::{Actions, DemoActions, SystemActions};
use collectors::{
    DemoContainerSource, DemoManifestReader, DemoProcessSource, DemoWorld, SysinfoProcessSource,
};
use inspect::{DemoInspector, Inspector, SystemInspector};
use poller::Poller;
use ui::{App, Effects};

const LOG_FILE: &str = "devdash.log";

#[derive(Parser)]
#[command(name = "devdash")]
#[command(about = "Watch local dev servers and containers", long_about = None)]
struct Cli {
    /// Config file (default ~/.config/devdash/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use generated processes and containers instead of the real machine
    #[arg(long, global = true)]
    demo: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive dashboard (default)
    Tui,
    /// Collect once and write a JSON snapshot
    Snapshot {
        /// Directory to write into (default ~/.local/share/devdash)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check docker, socket access and the config file
    Doctor,
}

/// Where collection, actions and inspection come from: the real machine or
/// the demo world.
struct Backend {
    processes: Arc<dyn ProcessSource>,
    containers: Arc<dyn ContainerSource>,
    actions: Arc<dyn Actions>,
    inspector: Arc<dyn Inspector>,
    reader: Box<dyn ManifestReader>,
}

impl Backend {
    fn demo() -> Self {
        let world = DemoWorld::new();
        Self {
            processes: Arc::new(DemoProcessSource::new(Arc::clone(&world))),
            containers: Arc::new(DemoContainerSource::new(Arc::clone(&world))),
            actions: Arc::new(DemoActions::new(Arc::clone(&world))),
            inspector: Arc::new(DemoInspector::new(world)),
            reader: Box::new(DemoManifestReader),
        }
    }

    fn system(config: &DevdashConfig) -> Self {
        let processes = SysinfoProcessSource::new(config.runtime_matcher());
        let sockets = processes.socket_backend();
        log::info!("listening ports via {}", sockets.label());
        Self {
            processes: Arc::new(processes),
            containers: container_source(),
            actions: Arc::new(SystemActions),
            inspector: Arc::new(SystemInspector::new(sockets)),
            reader: Box::new(PackageJsonReader),
        }
    }

    fn into_parts(self, config: &DevdashConfig) -> (Poller, Pipeline, Effects) {
        let poller = Poller::new(
            self.processes,
            self.containers,
            config.refresh_interval(),
            config.cycle_timeout(),
        );
        let resolver =
            ProjectResolver::new(self.reader).with_boundary(config.project_boundary.clone());
        let pipeline = Pipeline::new(resolver, config.watched_ports.clone());
        let effects = Effects {
            actions: self.actions,
            inspector: self.inspector,
        };
        (poller, pipeline, effects)
    }
}

#[cfg(feature = "docker")]
fn container_source() -> Arc<dyn ContainerSource> {
    let api = collectors::DockerApiSource::new();
    if api.is_connected() {
        Arc::new(api)
    } else {
        log::warn!("no Docker API connection, falling back to the docker CLI");
        Arc::new(collectors::DockerCliSource::new())
    }
}

#[cfg(not(feature = "docker"))]
fn container_source() -> Arc<dyn ContainerSource> {
    Arc::new(collectors::DockerCliSource::new())
}

/// The dashboard owns the terminal, so its log goes to a file. Everything
/// else logs to stderr.
fn init_logging(tui: bool, data_dir: &Path) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

    if tui {
        let file = std::fs::create_dir_all(data_dir).and_then(|_| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(data_dir.join(LOG_FILE))
        });
        match file {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => {
                eprintln!("cannot open log file in {}: {}", data_dir.display(), e);
                builder.filter_level(log::LevelFilter::Off);
            }
        }
    }

    builder.init();
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = Cli::parse();

    let home = dirs::home_dir();
    let base = home.clone().unwrap_or_else(|| PathBuf::from("."));
    let data_dir = default_data_dir(&base);
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| default_config_path(&base));

    let tui = matches!(cli.command, None | Some(Commands::Tui));
    init_logging(tui, &data_dir);

    let (config, config_error) = DevdashConfig::load_or_default(&config_path);
    if let Some(e) = &config_error {
        eprintln!(
            "Error loading {}: {} (using defaults)",
            config_path.display(),
            e
        );
    }

    let backend = if cli.demo {
        Backend::demo()
    } else {
        Backend::system(&config)
    };

    match cli.command {
        Some(Commands::Doctor) => match commands::run_doctor(
            backend.containers.as_ref(),
            &config_path,
            &data_dir,
        )
        .await
        {
            Ok(()) => Ok(()),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
        Some(Commands::Snapshot { output }) => {
            let (poller, pipeline, _) = backend.into_parts(&config);
            let dir = output.unwrap_or_else(|| data_dir.clone());
            match commands::run_snapshot(&poller, pipeline, &dir).await {
                Ok(path) => {
                    println!("{}", path.display());
                    Ok(())
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Some(Commands::Tui) | None => {
            let (poller, pipeline, effects) = backend.into_parts(&config);
            let mut app = App::new(pipeline, &config, home, data_dir);
            app.demo = cli.demo;
            if let Some(e) = config_error {
                app.notifications.push(devdash_core::notify::Notification::error(format!(
                    "Config ignored: {}",
                    e
                )));
            }
            ui::run_tui(app, poller, effects).await
        }
    }
}
