use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::classify::RelevanceGate;
use super::completion::interpret_generation;
use super::context::format_passages;
use super::conversation::ConversationSession;
use super::prompt::{
    augment_prompt, CONVERSATION_CLEARED_NOTICE, RETRIEVAL_UNAVAILABLE_WARNING, THINKING_STATUS,
    WELCOME_MESSAGE,
};
use super::retrieval::KnowledgeBridge;
use super::types::{GenerationSettings, Readiness, RunOutcome, RunState, Turn};
use super::RagError;
use crate::channel::{ChannelError, ChannelRequest, HttpChannel};
use crate::config::{self, BridgeConfig, ConfigError, SessionConfig};
use crate::display::{DisplayLine, DisplaySink, LineHandle};
use crate::settings::SettingsSource;

/// Host-supplied wiring for a controller.
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub completions_url: String,
    /// Retrieval driver, the bundled one by default. `None` disables
    /// documentation context.
    pub bridge: Option<BridgeConfig>,
    pub request_timeout: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            completions_url: config::completions_url(),
            bridge: Some(BridgeConfig::from_env()),
            request_timeout: Duration::from_secs(config::DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl ControllerOptions {
    pub fn with_completions_url(mut self, url: impl Into<String>) -> Self {
        self.completions_url = url.into();
        self
    }

    pub fn with_bridge(mut self, bridge: BridgeConfig) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn without_bridge(mut self) -> Self {
        self.bridge = None;
        self
    }
}

/// Assistant pipeline for one chat panel.
///
/// Coordinates: classify → retrieve → augment → generate → deliver.
/// One run at a time; a second submission during a run is rejected.
pub struct PipelineController {
    display: Arc<dyn DisplaySink>,
    generation: HttpChannel,
    gate: RelevanceGate,
    bridge: Option<KnowledgeBridge>,
    session: Mutex<ConversationSession>,
    completions_url: String,
    /// Why generation is unavailable, when session configuration failed.
    config_error: Option<String>,
    state: Mutex<RunState>,
    next_run: AtomicU64,
}

impl PipelineController {
    /// Resolve session configuration from the environment and `settings`,
    /// then bring up channels and the retrieval bridge.
    pub async fn initialize(
        options: ControllerOptions,
        display: Arc<dyn DisplaySink>,
        settings: &dyn SettingsSource,
    ) -> Self {
        let config = SessionConfig::load(settings);
        Self::with_session_config(options, display, config).await
    }

    /// Initialise with an already resolved configuration.
    pub async fn with_session_config(
        options: ControllerOptions,
        display: Arc<dyn DisplaySink>,
        config: Result<SessionConfig, ConfigError>,
    ) -> Self {
        display.append_line(DisplayLine::notice(WELCOME_MESSAGE));

        let (credential, settings, config_error) = match config {
            Ok(config) => (
                Some(config.credential.clone()),
                GenerationSettings::from(&config),
                None,
            ),
            Err(e) => {
                warn!(error = %e, "Session configuration failed, generation disabled");
                display.append_line(DisplayLine::error(e.to_string()));
                (None, GenerationSettings::default(), Some(e.to_string()))
            }
        };

        let mut generation =
            HttpChannel::new("generation", credential.clone(), options.request_timeout);
        let mut relevance = HttpChannel::new("relevance", credential, options.request_timeout);
        for channel in [&mut generation, &mut relevance] {
            if let Err(e) = channel.attach_current() {
                warn!(channel = %channel.name(), error = %e, "Channel not attached");
            }
        }
        let gate = RelevanceGate::new(
            relevance,
            settings.model.clone(),
            options.completions_url.clone(),
        );

        let bridge = match options.bridge {
            Some(bridge_config) => {
                let bridge = KnowledgeBridge::new(bridge_config);
                match bridge.initialize().await {
                    Ok(_) => Some(bridge),
                    Err(e) => {
                        warn!(error = %e, "Retrieval disabled");
                        display.append_line(DisplayLine::notice(RETRIEVAL_UNAVAILABLE_WARNING));
                        None
                    }
                }
            }
            None => {
                info!("No retrieval driver configured");
                None
            }
        };

        let controller = Self {
            display,
            generation,
            gate,
            bridge,
            session: Mutex::new(ConversationSession::new(settings)),
            completions_url: options.completions_url,
            config_error,
            state: Mutex::new(RunState::Idle),
            next_run: AtomicU64::new(1),
        };
        let readiness = controller.readiness();
        info!(
            generation = readiness.generation,
            retrieval = readiness.retrieval,
            "Assistant pipeline initialised"
        );
        controller
    }

    /// Run one submission to completion.
    pub async fn submit(&self, message: &str) -> RunOutcome {
        let message = message.trim();
        if message.is_empty() {
            return RunOutcome::Ignored;
        }

        let Some(mut run) = RunGuard::begin(self) else {
            debug!("Submission rejected, a run is active");
            return RunOutcome::Rejected;
        };

        self.display.append_line(DisplayLine::user(message));

        if let Some(reason) = self.unready_reason() {
            warn!(run_id = run.id, reason = %reason, "Generation unavailable");
            self.display.append_line(DisplayLine::error(reason.clone()));
            return RunOutcome::Unconfigured(reason);
        }

        run.show_status(THINKING_STATUS);

        // 1. Classify
        let relevant = self.gate.classify(message).await;

        // 2. Retrieve
        let context = match &self.bridge {
            Some(bridge) if relevant => {
                run.advance(RunState::Retrieving);
                format_passages(&bridge.search(message).await)
            }
            _ => String::new(),
        };

        // 3. Augment
        run.advance(RunState::Augmenting);
        let prompt = augment_prompt(message, &context);
        debug!(run_id = run.id, relevant, augmented = !context.is_empty(), "Prompt assembled");
        let payload = {
            let mut session = self.lock_session();
            session.append_user_turn(prompt);
            debug!(run_id = run.id, conversation_id = %session.id(), turns = session.turns().len(), "User turn recorded");
            session.build_generation_payload()
        };

        // 4. Generate
        run.advance(RunState::Generating);
        let result = match payload {
            Ok(body) => self.generate(body).await,
            Err(e) => Err(e),
        };

        // 5. Deliver
        run.retract_status();
        match result {
            Ok(Some(answer)) => {
                self.lock_session().append_assistant_turn(answer.clone());
                self.display.append_line(DisplayLine::assistant(answer.clone()));
                run.advance(RunState::Delivered);
                info!(run_id = run.id, chars = answer.len(), "Answer delivered");
                RunOutcome::Delivered(answer)
            }
            Ok(None) => {
                warn!(run_id = run.id, "Completion service returned no choices");
                RunOutcome::EmptyResponse
            }
            Err(e) => {
                let surfaced = surfaced_message(&e);
                error!(run_id = run.id, error = %e, "Generation failed");
                self.display.append_line(DisplayLine::error(surfaced.clone()));
                RunOutcome::Failed(surfaced)
            }
        }
    }

    async fn generate(&self, body: String) -> Result<Option<String>, RagError> {
        let pending = self
            .generation
            .send(ChannelRequest::post_json(&self.completions_url, body))?;
        let reply = pending.await?;
        interpret_generation(&reply)
    }

    fn unready_reason(&self) -> Option<String> {
        if let Some(reason) = &self.config_error {
            return Some(RagError::Configuration(reason.clone()).to_string());
        }
        if !self.generation.is_attached() {
            return Some(
                RagError::Channel(ChannelError::NotAttached {
                    channel: self.generation.name().to_string(),
                })
                .to_string(),
            );
        }
        None
    }

    /// Clear the transcript. Refused while a run is active.
    pub fn new_conversation(&self) -> bool {
        let state = self.lock_state();
        if state.is_active() {
            return false;
        }
        let conversation_id = {
            let mut session = self.lock_session();
            session.clear();
            session.id()
        };
        drop(state);
        self.display.append_line(DisplayLine::notice(CONVERSATION_CLEARED_NOTICE));
        info!(conversation_id = %conversation_id, "Conversation cleared");
        true
    }

    pub fn state(&self) -> RunState {
        *self.lock_state()
    }

    pub fn transcript(&self) -> Vec<Turn> {
        self.lock_session().turns().to_vec()
    }

    pub fn readiness(&self) -> Readiness {
        Readiness {
            generation: self.config_error.is_none() && self.generation.is_attached(),
            retrieval: self.bridge.is_some(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_session(&self) -> MutexGuard<'_, ConversationSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Text shown to the user for a generation failure.
fn surfaced_message(error: &RagError) -> String {
    match error {
        RagError::Api { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

// ═══════════════════════════════════════════════════════════
// RunGuard: RAII run token
// ═══════════════════════════════════════════════════════════

/// Occupies the controller for one run.
///
/// Dropping the guard retracts a still-visible status line and returns the
/// controller to `Idle`, including when the submit future is abandoned.
struct RunGuard<'a> {
    controller: &'a PipelineController,
    id: u64,
    status: Option<LineHandle>,
}

impl<'a> RunGuard<'a> {
    fn begin(controller: &'a PipelineController) -> Option<Self> {
        let mut state = controller.lock_state();
        if state.is_active() {
            return None;
        }
        *state = RunState::Classifying;
        drop(state);

        let id = controller.next_run.fetch_add(1, Ordering::Relaxed);
        debug!(run_id = id, "Run started");
        Some(Self {
            controller,
            id,
            status: None,
        })
    }

    fn advance(&self, next: RunState) {
        let mut state = self.controller.lock_state();
        let from = *state;
        debug!(run_id = self.id, from = %from, to = %next, "Run state");
        *state = next;
    }

    fn show_status(&mut self, text: &str) {
        self.status = Some(self.controller.display.append_line(DisplayLine::status(text)));
    }

    fn retract_status(&mut self) {
        if let Some(handle) = self.status.take() {
            self.controller.display.retract(handle);
        }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.retract_status();
        *self.controller.lock_state() = RunState::Idle;
    }
}
