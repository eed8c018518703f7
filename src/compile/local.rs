//! Local backend: an in-process engine behind a lazy, memoized init.
//!
//! The engine's startup cost is paid at most once per process lifetime and
//! shared by all callers, including concurrent ones. A failed initialization
//! is not cached: the next request retries it. The engine itself is
//! synchronous, so both init and compile run on the blocking pool.

use std::sync::Arc;

use tokio::sync::{OnceCell, mpsc};

use super::{BackendEvent, CompileBackend, CompileEngine, CompileRequest};
use crate::error::CompileError;

pub struct LocalBackend {
    engine: Arc<dyn CompileEngine>,
    init: Arc<OnceCell<()>>,
    events: mpsc::UnboundedSender<BackendEvent>,
}

impl LocalBackend {
    /// Must be constructed (and dispatched to) inside a tokio runtime.
    pub fn new(
        engine: Arc<dyn CompileEngine>,
        events: mpsc::UnboundedSender<BackendEvent>,
    ) -> Self {
        Self {
            engine,
            init: Arc::new(OnceCell::new()),
            events,
        }
    }
}

impl CompileBackend for LocalBackend {
    fn dispatch(&self, request: CompileRequest) {
        if request.wants_share() {
            // The controller checks supports_share before sending these
            crate::debug!("compile"; "share request on the local backend, compiling only");
        }
        let engine = Arc::clone(&self.engine);
        let init = Arc::clone(&self.init);
        let events = self.events.clone();
        tokio::spawn(async move {
            let ready = init
                .get_or_try_init(|| {
                    let engine = Arc::clone(&engine);
                    async move {
                        tokio::task::spawn_blocking(move || engine.initialize())
                            .await
                            .unwrap_or_else(|_| {
                                Err(CompileError::message("compiler initialization panicked"))
                            })
                    }
                })
                .await;
            if let Err(error) = ready {
                let _ = events.send(BackendEvent::Failed {
                    seq: Some(request.seq),
                    error,
                });
                return;
            }

            let seq = request.seq;
            let source = request.source;
            let result = tokio::task::spawn_blocking(move || engine.compile(&source)).await;
            let event = match result {
                Ok(Ok(sql)) => BackendEvent::Compiled {
                    seq: Some(seq),
                    sql,
                },
                Ok(Err(error)) => BackendEvent::Failed {
                    seq: Some(seq),
                    error,
                },
                Err(_) => BackendEvent::Failed {
                    seq: Some(seq),
                    error: CompileError::message("compiler task panicked"),
                },
            };
            let _ = events.send(event);
        });
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
