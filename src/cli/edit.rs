//! `quern edit` - the live playground loop.
//!
//! The editing surface is the user's own editor: quern watches the source
//! file, feeds changes into the controller, and renders the session state
//! in the terminal. Explicit actions are read from stdin lines
//! (r=run, s=share, q=quit).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::compile::{CompileBackend, JsonnetCli, LocalBackend};
use crate::config::{BackendKind, PlayConfig};
use crate::logger;
use crate::remote::RemoteBackend;
use crate::session::{
    Controller, EditorEvent, SessionState, ShareManager, SurfaceEvent, extract_token,
};
use crate::{debug, log};

pub fn run(
    config: Arc<PlayConfig>,
    file: &Path,
    backend_override: Option<BackendKind>,
    share: Option<String>,
) -> Result<()> {
    let backend_kind = backend_override.unwrap_or(config.playground.backend);
    let token = share.as_deref().map(extract_token);
    if token.is_some() && backend_kind == BackendKind::Local {
        bail!("session replay requires the remote backend (try --backend remote)");
    }

    let initial = match fs::read_to_string(file) {
        Ok(content) => content,
        // The file will be created from the restored session
        Err(_) if token.is_some() => String::new(),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read {}", file.display()));
        }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;
    runtime.block_on(run_session(config, file, backend_kind, token, initial))
}

async fn run_session(
    config: Arc<PlayConfig>,
    file: &Path,
    backend_kind: BackendKind,
    token: Option<String>,
    initial: String,
) -> Result<()> {
    let (backend_tx, backend_rx) = mpsc::unbounded_channel();
    let shares = ShareManager::new(config.page_url()?);
    let backend: Arc<dyn CompileBackend> = match backend_kind {
        BackendKind::Local => Arc::new(LocalBackend::new(
            Arc::new(JsonnetCli::new(
                config.local.command.clone(),
                config.local.prelude.clone(),
            )),
            backend_tx,
        )),
        BackendKind::Remote => Arc::new(RemoteBackend::spawn(
            config.remote_url()?,
            token,
            backend_tx,
        )),
    };
    log!("play"; "backend: {}", backend.name());

    let (controller, mut handles) =
        Controller::new(backend, backend_rx, shares, config.quiet_period());
    let controller_task = tokio::spawn(controller.run());

    // The watcher must stay alive for the whole session
    let _watcher = spawn_watcher(file, handles.events.clone())?;
    spawn_action_reader(handles.events.clone());
    log!("play"; "editing {} - r=run, s=share, q=quit (then Enter)", file.display());

    if !initial.is_empty() {
        let _ = handles.events.send(EditorEvent::Changed(initial));
    }

    let out_path = config
        .edit
        .output
        .clone()
        .unwrap_or_else(|| file.with_extension("sql"));
    let shutdown = crate::core::shutdown_signal();
    let mut last = SessionState::default();
    loop {
        tokio::select! {
            changed = handles.state.changed() => {
                if changed.is_err() {
                    // Controller ended (q action)
                    break;
                }
                let state = handles.state.borrow_and_update().clone();
                render(&state, &mut last, file, &out_path);
            }
            surface = handles.surface.recv() => match surface {
                Some(SurfaceEvent::ReplaceSource(source)) => {
                    fs::write(file, &source)
                        .with_context(|| format!("failed to restore {}", file.display()))?;
                    log!("play"; "restored shared session into {}", file.display());
                }
                None => break,
            },
            _ = shutdown.notified() => {
                let _ = handles.events.send(EditorEvent::Shutdown);
                break;
            }
        }
        if crate::core::is_shutdown() {
            let _ = handles.events.send(EditorEvent::Shutdown);
            break;
        }
    }

    let _ = tokio::time::timeout(std::time::Duration::from_millis(500), controller_task).await;
    Ok(())
}

/// Push session state changes to the terminal and the output file.
fn render(state: &SessionState, last: &mut SessionState, file: &Path, out_path: &Path) {
    if state.output != last.output && !state.output.is_empty() {
        match fs::write(out_path, format!("{}\n", state.output)) {
            Ok(()) => logger::status_success(&format!("compiled -> {}", out_path.display())),
            Err(e) => log!("error"; "failed to write {}: {}", out_path.display(), e),
        }
    }

    if state.alert != last.alert
        && let Some(alert) = &state.alert
    {
        let mut detail = alert.dedented_code().unwrap_or_default();
        if let Some(location) = state.location {
            // Out-of-range positions are clamped onto a real character
            let source = fs::read_to_string(file).unwrap_or_default();
            let marker = location.clamped_to(&source);
            if !detail.is_empty() {
                detail.push('\n');
            }
            detail.push_str(&format!("at {marker}"));
        }
        logger::status_error(&alert.message, &detail);
    }

    if state.side_data != last.side_data && !state.side_data.is_empty() {
        log!("data"; "\n{}", state.side_data.trim_end());
    }

    if state.share_link != last.share_link && !state.share_link.is_empty() {
        log!("share"; "{}", state.share_link);
    }

    *last = state.clone();
}

/// Watch the source file's directory (editors replace files on save) and
/// forward content changes as editor events. Raw bursts are fine here: the
/// controller's debouncer collapses them.
fn spawn_watcher(
    file: &Path,
    events: mpsc::UnboundedSender<EditorEvent>,
) -> Result<notify::RecommendedWatcher> {
    let file = file.canonicalize().unwrap_or_else(|_| file.to_path_buf());
    let dir = file
        .parent()
        .map(Path::to_path_buf)
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = file.file_name().map(|n| n.to_os_string()).unwrap_or_default();

    // Sync channel for notify (it doesn't support async)
    let (notify_tx, notify_rx) = std::sync::mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = notify_tx.send(res);
    })
    .map_err(|e| anyhow::anyhow!("watcher failed: {}", e))?;
    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .map_err(|e| anyhow::anyhow!("watcher failed on {}: {}", dir.display(), e))?;

    std::thread::spawn(move || {
        while let Ok(result) = notify_rx.recv() {
            let event = match result {
                Ok(event) => event,
                Err(e) => {
                    log!("watch"; "notify error: {}", e);
                    continue;
                }
            };
            // Ignore metadata-only changes (mtime/atime/chmod noise)
            if matches!(
                event.kind,
                notify::EventKind::Modify(notify::event::ModifyKind::Metadata(_))
            ) {
                continue;
            }
            if !event
                .paths
                .iter()
                .any(|p| p.file_name() == Some(file_name.as_os_str()))
            {
                continue;
            }
            // Deleted or mid-rename: the next event will have content
            let Ok(source) = std::fs::read_to_string(&file) else {
                continue;
            };
            debug!("watch"; "change: {}", file.display());
            if events.send(EditorEvent::Changed(source)).is_err() {
                break;
            }
        }
    });

    Ok(watcher)
}

/// Read explicit actions from stdin, one per line.
fn spawn_action_reader(events: mpsc::UnboundedSender<EditorEvent>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            // EOF (piped stdin): keep watching, actions are just unavailable
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let action = match line.trim() {
                "r" | "run" => EditorEvent::Submit,
                "s" | "share" => EditorEvent::Share,
                "q" | "quit" => EditorEvent::Shutdown,
                "" => continue,
                other => {
                    log!("play"; "unknown action `{}` (r=run, s=share, q=quit)", other);
                    continue;
                }
            };
            let quit = action == EditorEvent::Shutdown;
            if events.send(action).is_err() || quit {
                break;
            }
        }
    });
}
