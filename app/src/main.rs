//! Interactive todo list shell.
//!
//! Reads commands from stdin, one per line. Configuration comes from the
//! environment (and `.env`); logs go to stderr.

use anyhow::Context;
use localtodo::shell::{self, Command, Flow};
use localtodo::{AppConfig, TodoApp};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env().context("invalid configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!(storage = ?config.storage, layout = ?config.layout, "Starting localtodo");

    let mut app = TodoApp::from_config(&config);
    let report = app.start().await?;

    if let Some(notice) = app.take_notice() {
        println!("{notice}");
    }
    if !report.corrupted_keys.is_empty() {
        println!(
            "{} stored todo(s) could not be read and were skipped. Run `purge-corrupted` to delete them.",
            report.corrupted_keys.len()
        );
    }
    if let Flow::Continue(listing) = shell::execute(&mut app, Command::List).await? {
        println!("{listing}");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(error) => {
                println!("{error}");
                continue;
            },
        };

        match shell::execute(&mut app, command).await {
            Ok(Flow::Continue(output)) => println!("{output}"),
            Ok(Flow::Quit) => break,
            Err(error) => println!("{error}"),
        }
    }

    app.shutdown()
        .await
        .context("some changes may not have been saved")?;
    tracing::info!("Goodbye");
    Ok(())
}
