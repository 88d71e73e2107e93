use std::sync::Arc;

use anyhow::Context;
use filewatcher::cli::{Cli, Mode};
use filewatcher::manifest::{APP_VERSION, HostManifest};
use filewatcher::{NotifySource, RuntimeConfig, Session, Settings, SystemPicker, logging};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_lenient();

    // Load configuration
    let settings = Settings::load(cli.config.as_deref()).unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        Settings::default()
    });
    let runtime = RuntimeConfig::from_settings(&settings);

    match cli.mode() {
        Mode::PrintManifest => {
            match HostManifest::firefox(&runtime.executable_display()).to_json() {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            }
        }

        Mode::PrintVersion => {
            println!("{APP_VERSION}");
        }

        Mode::PrintConfig => match settings.to_toml() {
            Ok(toml) => print!("{toml}"),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        },

        Mode::Serve => {
            logging::init_with_config(&settings.logging);

            let code = match serve(&runtime).await {
                Ok(()) => 0,
                Err(e) => {
                    filewatcher::failure_event!(error, "session", "aborted", "{e:#}");
                    1
                }
            };
            // Do not wait on a blocked stdin reader during runtime shutdown
            std::process::exit(code);
        }
    }
}

async fn serve(runtime: &RuntimeConfig) -> anyhow::Result<()> {
    let session = Session::new(
        tokio::io::stdin(),
        tokio::io::stdout(),
        Arc::new(NotifySource::new()),
        Arc::new(SystemPicker::new()),
        runtime,
    );

    let end = session
        .run()
        .await
        .context("native messaging session failed")?;
    filewatcher::log_event!("session", "ended", "{end:?}");
    Ok(())
}
