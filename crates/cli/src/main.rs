mod auth_commands;
mod callback_server;
mod config_commands;
mod host;

use std::path::PathBuf;

use {
    anyhow::Result,
    clap::{Parser, Subcommand},
    tracing::{debug, info},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
    wicket_config::WicketConfig,
};

#[derive(Parser)]
#[command(name = "wicket", about = "Wicket: OpenID Connect login from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery of ./wicket.toml and ~/.config/wicket/).
    #[arg(long, global = true, env = "WICKET_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and print the provider's discovery document.
    Discover,
    /// Log in through the browser using the authorization code flow.
    Login {
        /// Print the authorization URL instead of opening a browser.
        #[arg(long)]
        no_browser: bool,
        /// Keep renewing the access token until Ctrl-C, then log out.
        #[arg(long)]
        watch: bool,
        /// Print the access token to stdout once logged in.
        #[arg(long)]
        show_token: bool,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

/// Initialise tracing. `RUST_LOG` wins, then the config's `debug` flag, then
/// `--log-level`.
fn init_telemetry(cli: &Cli, debug: bool) {
    let fallback = if debug {
        "debug"
    } else {
        cli.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn load_config(cli: &Cli) -> Result<(PathBuf, WicketConfig)> {
    match &cli.config {
        Some(path) => Ok((path.clone(), wicket_config::load_config(path)?)),
        None => wicket_config::discover_and_load(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Commands::Config { action } = &cli.command {
        init_telemetry(&cli, false);
        return config_commands::handle_config(action, cli.config.as_deref());
    }

    let (path, config) = load_config(&cli)?;
    init_telemetry(&cli, config.debug);
    info!(version = env!("CARGO_PKG_VERSION"), "wicket starting");
    debug!(path = %path.display(), issuer = config.oidc_config().issuer(), "config loaded");

    match cli.command {
        Commands::Discover => auth_commands::discover(&config).await,
        Commands::Login {
            no_browser,
            watch,
            show_token,
        } => {
            auth_commands::login(&config, auth_commands::LoginOptions {
                no_browser,
                watch,
                show_token,
            })
            .await
        },
        Commands::Config { .. } => Ok(()),
    }
}
