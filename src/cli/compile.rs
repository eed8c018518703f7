//! `quern compile` - compile a file once and print the result.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::sync::mpsc;

use crate::compile::{
    BackendEvent, CompileBackend, CompileRequest, JsonnetCli, LocalBackend, RequestKind,
};
use crate::config::PlayConfig;
use crate::error::CompileError;

/// Generous limit for a one-shot compile, first call pays engine startup
const COMPILE_TIMEOUT: Duration = Duration::from_secs(60);

pub fn run(config: &PlayConfig, file: &Path) -> Result<()> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;
    runtime.block_on(async move {
        let (backend_tx, mut backend_rx) = mpsc::unbounded_channel();
        let backend = LocalBackend::new(
            Arc::new(JsonnetCli::new(
                config.local.command.clone(),
                config.local.prelude.clone(),
            )),
            backend_tx,
        );
        backend.dispatch(CompileRequest::new(0, RequestKind::Submit, source));

        match tokio::time::timeout(COMPILE_TIMEOUT, backend_rx.recv()).await {
            Ok(Some(BackendEvent::Compiled { sql, .. })) => {
                println!("{sql}");
                Ok(())
            }
            Ok(Some(BackendEvent::Failed { error, .. })) => {
                report(&error);
                bail!("compilation failed");
            }
            Ok(_) => bail!("unexpected response from the compiler"),
            Err(_) => bail!("compiler produced no response"),
        }
    })
}

fn report(error: &CompileError) {
    crate::log!("error"; "{}", error.message);
    if let Some(code) = error.dedented_code() {
        eprintln!("{code}");
    }
    if let Some(location) = error.location {
        eprintln!("at {location}");
    }
}
