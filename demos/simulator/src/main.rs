//! Integration simulator.
//!
//! Runs an installer and a scripted integration in one process, wired
//! through in-memory windows, with install state and config persisted to a
//! JSON file the way the web simulator uses local storage.
//!
//! Run:
//!   cargo run -p websdk-simulator -- run --apikey secret
//!   cargo run -p websdk-simulator -- status
//!   cargo run -p websdk-simulator -- remove
//!
//! A config file can override the integration, session and store:
//!   cargo run -p websdk-simulator -- --config simulator.toml run

mod config;
mod integration;
mod store;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use config::SimulatorConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use store::{SimulatorHost, Store};
use tracing_subscriber::EnvFilter;
use websdk_context::Context;
use websdk_core::channel;
use websdk_installer::{
    GraphqlBackend, Installer, InstallerProps, SimulatedEnvironment, has_redirect_marker,
    redirect_url,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML file with simulator settings
    #[arg(short, long, env = "WEBSDK_SIMULATOR_CONFIG")]
    config: Option<PathBuf>,

    /// Override the store file from the config
    #[arg(long, env = "WEBSDK_SIMULATOR_STORE")]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load the integration, configure it and install it
    Run {
        /// API key the scripted integration submits
        #[arg(long, default_value = "simulator-key")]
        apikey: String,
        /// Base URL recorded with the credential
        #[arg(long, default_value = "https://api.example.com")]
        api_url: String,
        /// Proxy a GET to this URL through the agent backend
        #[arg(long)]
        fetch: Option<String>,
        /// Simulate returning from an OAuth redirect
        #[arg(long)]
        redirected: bool,
    },
    /// Print the stored install flag and config
    Status,
    /// Remove the integration and its stored config
    Remove,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let args = Args::parse();
    let mut settings = SimulatorConfig::load(args.config.as_deref())
        .context("failed to load simulator config")?;
    if let Some(store) = args.store {
        settings.store = store;
    }
    let store = Store::open(&settings.store)
        .await
        .with_context(|| format!("failed to open store {}", settings.store.display()))?;
    let host = Arc::new(SimulatorHost::new(store, Duration::from_millis(settings.delay_ms)));
    let ref_type = settings.integration.ref_type.clone();

    match args.command {
        Commands::Run {
            apikey,
            api_url,
            fetch,
            redirected,
        } => {
            let script = integration::Script {
                apikey,
                api_url,
                fetch,
            };
            simulate(settings, host, script, redirected).await
        }
        Commands::Status => {
            println!("integration: {}", ref_type);
            println!("installed:   {}", host.installed(&ref_type).await);
            match host.stored_config(&ref_type).await? {
                Some(config) => println!("config:      {}", serde_json::to_string_pretty(&config)?),
                None => println!("config:      <none>"),
            }
            Ok(())
        }
        Commands::Remove => {
            host.forget(&ref_type).await?;
            tracing::info!(integration = %ref_type, "removed");
            Ok(())
        }
    }
}

async fn simulate(
    settings: SimulatorConfig,
    host: Arc<SimulatorHost>,
    script: integration::Script,
    redirected: bool,
) -> anyhow::Result<()> {
    let mut integration = settings.integration;
    integration.installed = host.installed(&integration.ref_type).await;
    let ref_type = integration.ref_type.clone();
    let publisher = integration.publisher.name.clone();

    let mut props = InstallerProps::new(settings.id, integration);
    props.authorization = host.authorization(&ref_type).await;
    props.session = Some(settings.session.clone());

    let host_url = if redirected && !has_redirect_marker(&settings.host_url) {
        redirect_url(&settings.host_url)
    } else {
        settings.host_url
    };
    let env = Arc::new(SimulatedEnvironment::new(host_url));
    let backend = Arc::new(GraphqlBackend::new(settings.session.graphql_url));
    let installer = Arc::new(Installer::new(props, host, backend, env));

    let (to_parent, parent_inbox) = channel();
    let (to_frame, frame_inbox) = channel();
    let context = Arc::new(Context::new(Arc::new(to_parent), publisher, ref_type));
    context.mount();
    installer.mount(Arc::new(to_frame));
    tokio::spawn(installer.clone().listen(parent_inbox));
    tokio::spawn(context.clone().listen(frame_inbox));
    installer.on_frame_load();

    integration::run(context.clone(), script).await?;

    let mut view = installer.subscribe();
    if !view.borrow().installed {
        tokio::time::timeout(Duration::from_secs(5), view.wait_for(|v| v.install_enabled))
            .await
            .context("integration never enabled install")??;
        installer.handle_install().await?;
    }
    tracing::info!(view = ?installer.view(), "simulation finished");

    context.exit();
    installer.unmount();
    Ok(())
}
