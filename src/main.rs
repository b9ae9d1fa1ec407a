mod auth;
mod capture;
mod config;
mod device;
mod key;
mod player;
mod spotify;

use anyhow::{Context, Result};
use auth::{AuthSession, Authenticator};
use capture::Capture;
use clap::Parser;
use config::Configuration;
use device::{DeviceController, Outcome};
use player::Player;
use spotify::WebApiClient;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "spotify-keyfwd",
    about = "Forward keyboard media keys to a Spotify Connect device"
)]
struct Args {
    /// Path to config file
    #[arg(default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// List the Spotify devices visible to the account and exit
    #[arg(long)]
    devices: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new(Level::DEBUG.to_string())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let source_name = args.config.display().to_string();
    info!("loading config from {source_name}");

    let config = config::load(&args.config).and_then(|config| {
        // Listing mode is how the user finds the device id in the first place
        if !args.devices {
            config.require_device(&source_name)?;
        }
        Ok(config)
    });
    let config = match config {
        Ok(config) => config,
        Err(err) => {
            // Use miette's fancy error display
            eprintln!("{:?}", miette::Report::new(err));
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = run(config, args.devices).await {
        eprintln!("error: {err:?}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn run(config: Configuration, list_devices: bool) -> Result<()> {
    let mut controller = DeviceController::new(config.device_id.clone());

    let authenticator = Authenticator::new(&config.client_id, &config.client_secret)?;
    let session = AuthSession::new(authenticator, config.auth_http_port)
        .with_timeout(config.auth_timeout());
    let token = session
        .run(|url| {
            debug!("opening browser");
            open::that(url)
        })
        .await
        .context("Spotify authentication failed")?;
    controller.attach(WebApiClient::new(token)?);

    if list_devices {
        if let Outcome::Failed(err) = controller.list_devices(&mut std::io::stdout()).await {
            return Err(err).context("failed to list devices");
        }
        return Ok(());
    }

    let mut player = Player::new(Arc::new(Capture::new()), controller);
    player.start();

    let captured = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(err) = signal {
                warn!("failed to listen for Ctrl-C: {err}");
            }
            info!("shutting down");
            Ok(())
        }
        result = player.capture_finished() => {
            warn!("media key capture exited");
            result
        }
    };
    let stopped = player.stop().await;

    captured.context("media key capture failed")?;
    stopped.context("media key capture failed")?;
    Ok(())
}
