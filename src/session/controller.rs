//! Playground Controller - wires the session together.
//!
//! ```text
//! surface --EditorEvent--> Controller --CompileRequest--> CompileBackend
//!                              ^                               |
//!                              +---------BackendEvent----------+
//! ```
//!
//! A single task owns the debouncer, the reconciler and the backend handle;
//! every event is processed to completion before the next, so state
//! transitions never interleave. The rendered state is published through a
//! watch channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::compile::{BackendEvent, CompileBackend, CompileRequest, RequestKind};

use super::debounce::Debouncer;
use super::share::ShareManager;
use super::state::{Reconciler, SessionState};

/// Events from the editing surface and the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorEvent {
    /// The edited content changed (debounced into a compile request)
    Changed(String),
    /// Explicit run action: compile and execute immediately
    Submit,
    /// Persist the current source and mint a share link
    Share,
    /// End the session loop
    Shutdown,
}

/// Notifications pushed back to the editing surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// A stored session was replayed: replace the visible source
    ReplaceSource(String),
}

/// What the embedding surface holds on to.
pub struct SessionHandles {
    pub events: mpsc::UnboundedSender<EditorEvent>,
    pub state: watch::Receiver<SessionState>,
    pub surface: mpsc::UnboundedReceiver<SurfaceEvent>,
}

pub struct Controller {
    backend: Arc<dyn CompileBackend>,
    backend_rx: mpsc::UnboundedReceiver<BackendEvent>,
    backend_open: bool,
    events_rx: mpsc::UnboundedReceiver<EditorEvent>,
    state_tx: watch::Sender<SessionState>,
    surface_tx: mpsc::UnboundedSender<SurfaceEvent>,
    reconciler: Reconciler,
    debouncer: Debouncer,
    shares: ShareManager,
    /// Latest content seen from the editing surface
    source: String,
    next_seq: u64,
}

impl Controller {
    pub fn new(
        backend: Arc<dyn CompileBackend>,
        backend_rx: mpsc::UnboundedReceiver<BackendEvent>,
        shares: ShareManager,
        quiet: Duration,
    ) -> (Self, SessionHandles) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (surface_tx, surface_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::default());
        let controller = Self {
            backend,
            backend_rx,
            backend_open: true,
            events_rx,
            state_tx,
            surface_tx,
            reconciler: Reconciler::new(),
            debouncer: Debouncer::new(quiet),
            shares,
            source: String::new(),
            next_seq: 0,
        };
        let handles = SessionHandles {
            events: events_tx,
            state: state_rx,
            surface: surface_rx,
        };
        (controller, handles)
    }

    /// Run the session loop. Ends on [`EditorEvent::Shutdown`] or when the
    /// surface drops its event sender.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                event = self.events_rx.recv() => match event {
                    Some(EditorEvent::Shutdown) | None => break,
                    Some(event) => self.on_editor_event(event),
                },
                event = self.backend_rx.recv(), if self.backend_open => match event {
                    Some(event) => self.on_backend_event(event),
                    None => self.backend_open = false,
                },
                _ = tokio::time::sleep(self.debouncer.sleep_duration()) => {
                    self.flush_pending_edit();
                }
            }
            self.publish();
        }
    }

    fn on_editor_event(&mut self, event: EditorEvent) {
        match event {
            EditorEvent::Changed(source) => {
                // Watcher echoes of content we already hold (e.g. after a
                // replay write-back) do not schedule a compile
                if source == self.source {
                    return;
                }
                self.source = source.clone();
                self.debouncer.record(source);
            }
            EditorEvent::Submit => {
                let request = self.request(RequestKind::Submit, self.source.clone());
                self.backend.dispatch(request);
            }
            EditorEvent::Share => {
                if !self.backend.supports_share() {
                    crate::log!("share"; "sharing requires the remote backend");
                    return;
                }
                let request = self.request(RequestKind::Share, self.source.clone());
                self.backend.dispatch(request);
            }
            EditorEvent::Shutdown => {}
        }
    }

    fn on_backend_event(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::Compiled { seq, sql } => {
                if !self.reconciler.apply_output(seq, sql) {
                    crate::debug!("play"; "discarding stale compile response");
                }
            }
            BackendEvent::Failed { seq, error } => {
                if !self.reconciler.apply_error(seq, error) {
                    crate::debug!("play"; "discarding stale compile error");
                }
            }
            BackendEvent::SideData(data) => self.reconciler.apply_side_data(data),
            BackendEvent::ShareToken(token) => {
                let link = self.shares.link_for(&token);
                crate::debug!("share"; "minted {}", link);
                self.reconciler.apply_share_link(link);
            }
            BackendEvent::Replay(source) => {
                // Replace the visible source, then populate output and side
                // data for the restored session right away
                self.source = source.clone();
                let _ = self
                    .surface_tx
                    .send(SurfaceEvent::ReplaceSource(source.clone()));
                let request = self.request(RequestKind::Submit, source);
                self.backend.dispatch(request);
            }
        }
    }

    /// Issue the next request: bump the sequence and run the reconciler's
    /// clear-before-apply transition.
    fn request(&mut self, kind: RequestKind, source: String) -> CompileRequest {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.reconciler.begin_request(seq, kind);
        CompileRequest::new(seq, kind, source)
    }

    fn flush_pending_edit(&mut self) {
        if let Some(source) = self.debouncer.take_if_ready() {
            let request = self.request(RequestKind::Edit, source);
            self.backend.dispatch(request);
        }
    }

    fn publish(&self) {
        self.state_tx.send_if_modified(|state| {
            if *state == *self.reconciler.state() {
                false
            } else {
                *state = self.reconciler.state().clone();
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CompileError, Location};
    use parking_lot::Mutex;
    use url::Url;

    struct RecordingBackend {
        dispatched: Arc<Mutex<Vec<CompileRequest>>>,
        share: bool,
    }

    impl CompileBackend for RecordingBackend {
        fn dispatch(&self, request: CompileRequest) {
            self.dispatched.lock().push(request);
        }

        fn supports_share(&self) -> bool {
            self.share
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    struct Harness {
        dispatched: Arc<Mutex<Vec<CompileRequest>>>,
        backend_tx: mpsc::UnboundedSender<BackendEvent>,
        handles: SessionHandles,
    }

    fn spawn_controller(share: bool) -> Harness {
        let dispatched = Arc::new(Mutex::new(Vec::new()));
        let backend = Arc::new(RecordingBackend {
            dispatched: Arc::clone(&dispatched),
            share,
        });
        let (backend_tx, backend_rx) = mpsc::unbounded_channel();
        let shares = ShareManager::new(Url::parse("https://play.example.com/play").unwrap());
        let (controller, handles) = Controller::new(
            backend,
            backend_rx,
            shares,
            Duration::from_millis(crate::session::DEFAULT_QUIET_MS),
        );
        tokio::spawn(controller.run());
        Harness {
            dispatched,
            backend_tx,
            handles,
        }
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_edit_burst_yields_one_request_with_last_content() {
        let harness = spawn_controller(false);
        for source in ["a", "ab", "abc"] {
            harness
                .handles
                .events
                .send(EditorEvent::Changed(source.to_string()))
                .unwrap();
        }

        wait_until(|| !harness.dispatched.lock().is_empty()).await;
        tokio::time::sleep(Duration::from_millis(300)).await;

        let dispatched = harness.dispatched.lock();
        assert_eq!(dispatched.len(), 1);
        assert_eq!(dispatched[0].kind, RequestKind::Edit);
        assert_eq!(dispatched[0].source, "abc");
    }

    #[tokio::test]
    async fn test_separated_edits_yield_independent_requests() {
        let harness = spawn_controller(false);
        harness
            .handles
            .events
            .send(EditorEvent::Changed("first".to_string()))
            .unwrap();
        wait_until(|| harness.dispatched.lock().len() == 1).await;

        harness
            .handles
            .events
            .send(EditorEvent::Changed("second".to_string()))
            .unwrap();
        wait_until(|| harness.dispatched.lock().len() == 2).await;

        let dispatched = harness.dispatched.lock();
        assert_eq!(dispatched[0].source, "first");
        assert_eq!(dispatched[1].source, "second");
        assert!(dispatched[0].seq < dispatched[1].seq);
    }

    #[tokio::test]
    async fn test_submit_bypasses_debounce() {
        let harness = spawn_controller(false);
        harness
            .handles
            .events
            .send(EditorEvent::Changed("x".to_string()))
            .unwrap();
        harness.handles.events.send(EditorEvent::Submit).unwrap();

        wait_until(|| !harness.dispatched.lock().is_empty()).await;
        let first = harness.dispatched.lock()[0].clone();
        assert_eq!(first.kind, RequestKind::Submit);
        assert_eq!(first.source, "x");
    }

    #[tokio::test]
    async fn test_share_requires_remote_capability() {
        let harness = spawn_controller(false);
        harness
            .handles
            .events
            .send(EditorEvent::Changed("x".to_string()))
            .unwrap();
        harness.handles.events.send(EditorEvent::Share).unwrap();

        // The debounced edit still fires; the share is swallowed
        wait_until(|| !harness.dispatched.lock().is_empty()).await;
        assert!(
            harness
                .dispatched
                .lock()
                .iter()
                .all(|r| r.kind != RequestKind::Share)
        );
    }

    #[tokio::test]
    async fn test_clear_before_apply() {
        let mut harness = spawn_controller(false);
        harness
            .backend_tx
            .send(BackendEvent::Failed {
                seq: None,
                error: CompileError::message("syntax error").with_location(Location::new(2, 5)),
            })
            .unwrap();
        harness.backend_tx.send(BackendEvent::SideData("rows".to_string())).unwrap();

        {
            let state = harness.handles.state.clone();
            wait_until(move || state.borrow().alert.is_some()).await;
        }
        assert_eq!(
            harness.handles.state.borrow().location,
            Some(Location::new(2, 5))
        );

        // A new edit clears alert, marker and side data the moment the
        // request is issued, before any response arrives
        harness
            .handles
            .events
            .send(EditorEvent::Changed("fixed".to_string()))
            .unwrap();
        wait_until(|| !harness.dispatched.lock().is_empty()).await;

        let state = harness.handles.state.borrow().clone();
        assert_eq!(state.alert, None);
        assert_eq!(state.location, None);
        assert_eq!(state.side_data, "");
    }

    #[tokio::test]
    async fn test_stale_local_response_is_discarded() {
        let mut harness = spawn_controller(false);
        harness
            .handles
            .events
            .send(EditorEvent::Changed("a".to_string()))
            .unwrap();
        wait_until(|| harness.dispatched.lock().len() == 1).await;
        harness
            .handles
            .events
            .send(EditorEvent::Changed("b".to_string()))
            .unwrap();
        wait_until(|| harness.dispatched.lock().len() == 2).await;

        let (old, new) = {
            let dispatched = harness.dispatched.lock();
            (dispatched[0].seq, dispatched[1].seq)
        };

        // The older request resolves late - it must not be applied
        harness
            .backend_tx
            .send(BackendEvent::Compiled {
                seq: Some(old),
                sql: "stale".to_string(),
            })
            .unwrap();
        harness
            .backend_tx
            .send(BackendEvent::Compiled {
                seq: Some(new),
                sql: "fresh".to_string(),
            })
            .unwrap();

        {
            let state = harness.handles.state.clone();
            wait_until(move || !state.borrow().output.is_empty()).await;
        }
        assert_eq!(harness.handles.state.borrow().output, "fresh");
    }

    #[tokio::test]
    async fn test_replay_replaces_source_and_requests_execution() {
        let mut harness = spawn_controller(true);
        harness
            .backend_tx
            .send(BackendEvent::Replay("{ a: 1 }".to_string()))
            .unwrap();

        wait_until(|| !harness.dispatched.lock().is_empty()).await;
        let request = harness.dispatched.lock()[0].clone();
        assert_eq!(request.source, "{ a: 1 }");
        assert!(request.wants_execution());

        assert_eq!(
            harness.handles.surface.recv().await,
            Some(SurfaceEvent::ReplaceSource("{ a: 1 }".to_string()))
        );

        // The watcher echoing the replayed content back is not a new edit
        harness
            .handles
            .events
            .send(EditorEvent::Changed("{ a: 1 }".to_string()))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(harness.dispatched.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_share_token_becomes_link() {
        let mut harness = spawn_controller(true);
        harness
            .backend_tx
            .send(BackendEvent::ShareToken("tok123".to_string()))
            .unwrap();

        {
            let state = harness.handles.state.clone();
            wait_until(move || !state.borrow().share_link.is_empty()).await;
        }
        assert!(
            harness
                .handles
                .state
                .borrow()
                .share_link
                .ends_with("?share=tok123")
        );
    }
}
