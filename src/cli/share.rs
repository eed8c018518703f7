//! `quern share` - persist a source snapshot remotely, print its link.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::sync::mpsc;

use crate::compile::{BackendEvent, CompileBackend, CompileRequest, RequestKind};
use crate::config::PlayConfig;
use crate::remote::RemoteBackend;
use crate::session::ShareManager;

const SHARE_TIMEOUT: Duration = Duration::from_secs(10);

pub fn run(config: &PlayConfig, file: &Path) -> Result<()> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let shares = ShareManager::new(config.page_url()?);
    let url = config.remote_url()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;
    runtime.block_on(async move {
        let (backend_tx, mut backend_rx) = mpsc::unbounded_channel();
        let backend = RemoteBackend::spawn(url.clone(), None, backend_tx);

        // The channel connects in the background; a request sent before
        // that would be dropped
        let deadline = tokio::time::Instant::now() + SHARE_TIMEOUT;
        while !backend.connected() {
            if tokio::time::Instant::now() >= deadline {
                bail!("could not reach {}", url);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        backend.dispatch(CompileRequest::new(0, RequestKind::Share, source));

        loop {
            match tokio::time::timeout_at(deadline, backend_rx.recv()).await {
                Ok(Some(BackendEvent::ShareToken(token))) => {
                    println!("{}", shares.link_for(&token));
                    return Ok(());
                }
                Ok(Some(BackendEvent::Failed { error, .. })) => {
                    bail!("share failed: {}", error.message);
                }
                Ok(Some(_)) => continue,
                Ok(None) => bail!("session channel closed"),
                Err(_) => bail!("no response from {}", url),
            }
        }
    })
}
