//! Upload run: select, enqueue, start, then follow events to the end.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use groupbin_transfer::validate_selection;
use groupbin_upload_client::{
    Capability, HttpTransport, UploadController, UploadEvent, select_paths,
};
use tokio::sync::mpsc;

use crate::cli::Cli;
use crate::config::Config;

/// Uploads the paths given on the command line.
pub async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    let mode = cli.mode();
    let transport = Arc::new(HttpTransport::new(
        &config.server,
        &mode,
        config.csrf_token.as_deref(),
    )?);
    tracing::debug!(endpoint = transport.endpoint(), "transport ready");

    let upload_config = config.upload_config(mode, cli.params(&config));
    let mut controller = match UploadController::probe(upload_config, transport.clone()) {
        Capability::Supported(controller) => controller,
        Capability::Unsupported(reason) => bail!("chunked upload unavailable: {reason}"),
    };
    let mut events = controller
        .take_events()
        .context("event receiver already taken")?;

    let selected = select_paths(&cli.paths)?;
    validate_selection(&selected)?;

    let mut queued = 0;
    for file in selected {
        let name = file.relative_path.clone();
        match controller.enqueue(file) {
            Ok(_) => queued += 1,
            Err(e) => tracing::warn!(file = %name, error = %e, "skipping file"),
        }
    }
    if queued == 0 {
        bail!("nothing to upload");
    }

    tracing::info!(files = queued, session = controller.session_id(), "starting upload");
    controller.start()?;

    tokio::select! {
        result = follow(&controller, &mut events, &transport, &config) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received, aborting uploads");
            bail!("interrupted");
        }
    }
}

/// Reacts to controller events until the session completes or gives up.
async fn follow(
    controller: &UploadController,
    events: &mut mpsc::UnboundedReceiver<UploadEvent>,
    transport: &HttpTransport,
    config: &Config,
) -> anyhow::Result<()> {
    let mut retries_left = config.retry_rounds;

    while let Some(event) = events.recv().await {
        match event {
            UploadEvent::Progress {
                progress,
                bytes_per_second,
                ..
            } => {
                tracing::info!(
                    percent = %format!("{:.1}", progress * 100.0),
                    kib_per_second = %format!("{:.0}", bytes_per_second / 1024.0),
                    "progress"
                );
            }
            UploadEvent::FileSuccess { file } => {
                println!("uploaded {} ({} bytes)", file.relative_path, file.size);
            }
            UploadEvent::FileError {
                file,
                chunk,
                reason,
            } => {
                tracing::warn!(
                    file = %file.relative_path,
                    chunk = ?chunk,
                    error = %reason,
                    "upload error"
                );
            }
            UploadEvent::Idle { waiting } => {
                if retries_left == 0 {
                    bail!("{waiting} file(s) could not be uploaded");
                }
                retries_left -= 1;
                tracing::info!(waiting, retries_left, "retrying failed chunks");
                tokio::time::sleep(Duration::from_millis(config.retry_delay_ms)).await;
                controller.start()?;
            }
            UploadEvent::Complete {
                action,
                completed,
                failed,
            } => {
                println!("{completed} file(s) uploaded, {failed} failed");
                println!("{}", transport.completion_url(&action));
                if failed > 0 {
                    bail!("{failed} file(s) failed");
                }
                return Ok(());
            }
            UploadEvent::FileAdded { .. } | UploadEvent::FileRemoved { .. } => {}
        }
    }

    bail!("event channel closed")
}
