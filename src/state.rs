//! Application state: in-memory session store, prompt flows and the code runner.
//!
//! This module owns:
//!   - sessions by id, each behind its own async mutex
//!   - the flow executor (optional OpenAI client + prompts)
//!   - the code execution backend
//!   - the background tasks attached to a session (countdown, speech)
//!
//! A transition holds its session's lock for the whole remote call, so two
//! transitions of one session never interleave.

use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{load_agent_config_from_env, ExecutionCfg};
use crate::execution::{backend_from_config, ExecutionBackend};
use crate::flows::{CompletionService, FlowExecutor};
use crate::openai::OpenAI;
use crate::session::Session;

pub type SessionHandle = Arc<Mutex<Session>>;

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
    pub flows: FlowExecutor,
    pub runner: Arc<dyn ExecutionBackend>,
}

impl AppState {
    /// Build state from env: load config, init OpenAI, pick the execution backend.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_agent_config_from_env().unwrap_or_default();

        let openai = OpenAI::from_env();
        let llm: Option<Arc<dyn CompletionService>> = match openai {
            Some(oa) => {
                info!(target: "codesprint_backend", base_url = %oa.base_url, model = %oa.model, tts_model = %oa.tts_model, "OpenAI enabled.");
                Some(Arc::new(oa))
            }
            None => {
                warn!(target: "codesprint_backend", "OpenAI disabled (no OPENAI_API_KEY). Interview flows will report errors.");
                None
            }
        };

        let exec_cfg: ExecutionCfg = cfg.execution.with_env_overrides();
        let runner: Arc<dyn ExecutionBackend> = Arc::from(backend_from_config(&exec_cfg));

        Self::with_parts(FlowExecutor::new(llm, cfg.prompts), runner)
    }

    pub fn with_parts(flows: FlowExecutor, runner: Arc<dyn ExecutionBackend>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            flows,
            runner,
        }
    }

    /// Register a session and return its id.
    #[instrument(level = "debug", skip(self, session))]
    pub async fn insert_session(&self, session: Session) -> (String, SessionHandle) {
        let id = Uuid::new_v4().to_string();
        let handle = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(id.clone(), handle.clone());
        info!(target: "session", %id, "Session created");
        (id, handle)
    }

    #[instrument(level = "debug", skip(self), fields(%id))]
    pub async fn get_session(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(id).cloned()
    }

    #[instrument(level = "debug", skip(self), fields(%id))]
    pub async fn remove_session(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            info!(target: "session", %id, "Session removed");
        }
        removed
    }

    /// Drive the coding countdown once per second until it expires or the
    /// coding run it was started for ends.
    pub fn spawn_countdown(&self, id: String, handle: &SessionHandle, epoch: u64) {
        let weak = Arc::downgrade(handle);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(handle) = weak.upgrade() else { break };
                let left = handle.lock().await.tick_epoch(epoch);
                match left {
                    Some(0) => {
                        info!(target: "session", %id, "Countdown finished");
                        break;
                    }
                    Some(_) => {}
                    None => {
                        debug!(target: "session", %id, "Countdown stopped; session left coding");
                        break;
                    }
                }
            }
        });
    }

    /// Synthesize speech for an already-stored turn and attach it when ready.
    /// `generation` is the session's generation when the turn was recorded.
    pub fn spawn_speech(&self, id: String, handle: &SessionHandle, generation: u64, turn: usize, text: String) {
        let flows = self.flows.clone();
        let weak = Arc::downgrade(handle);
        tokio::spawn(async move {
            let Some(media) = flows.speak(&text).await else { return };
            let Some(handle) = weak.upgrade() else { return };
            let attached = handle.lock().await.attach_audio(generation, turn, media);
            if let Err(e) = attached {
                debug!(target: "session", %id, turn, error = %e, "Dropping synthesized audio");
            }
        });
    }
}
