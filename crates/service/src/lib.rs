//! # Kokua Service
//!
//! The session lifecycle and fallback-resilient response pipeline that
//! mediates between an unreliable remote model endpoint and the in-process
//! conversation log.
//!
//! The single entry point is [`ChatService::get_response`]: it resolves (or
//! creates) a session, builds a bounded context window, invokes the remote
//! model, and returns a reply — degrading to a local fallback generator when
//! the remote model is unavailable. It absorbs every failure internally and
//! always returns a well-formed `(session_id, reply)` pair; a conversational
//! endpoint must never hard-fail a user-facing turn.

pub mod fallback;
pub mod sessions;

pub use fallback::{CANNED_REPLIES, FallbackResponder, IDENTITY_REPLY};
pub use sessions::SessionStore;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, warn};

use kokua_core::{GenerateRequest, GenerationConfig, ModelProvider, SessionMode, Turn};

/// Maximum number of prior turns included in the context window alongside a
/// new user message. Fixed design choice: caps token cost and latency.
pub const CONTEXT_TURNS: usize = 5;

/// Greeting each new session is seeded with.
pub const GREETING: &str = "Aloha! I'm KiloK\u{14d}kua, your Hawai\u{2bb}i Climate AI \
Concierge. How can I help you with information about Hawai\u{2bb}i's climate today?";

/// Returned for whitespace-only input, without touching any session.
pub const EMPTY_PROMPT_REPLY: &str =
    "Aloha! Please ask me a question about Hawai\u{2bb}i's climate.";

/// Returned with an empty session id when a remote call fails.
pub const APOLOGY_REPLY: &str = "Mahalo for your patience. I'm having trouble connecting to \
my knowledge base right now. Please try again in a moment.";

/// Static system instruction sent with every live model call.
pub const SYSTEM_PROMPT: &str = "You are KiloK\u{14d}kua, the Hawai\u{2bb}i Climate AI \
Concierge. You provide information about Hawai\u{2bb}i's climate, weather patterns, climate \
change impacts, and sustainability efforts. Be helpful, accurate, and focus on providing \
information relevant to the Hawaiian Islands. If asked about topics unrelated to Hawai\u{2bb}i \
or climate, politely redirect the conversation to your area of expertise.";

/// The initialization/degradation state machine.
///
/// `Uninitialized -> {Ready, Degraded}`. Degraded is sticky until the next
/// explicit (re-)initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServiceStatus {
    Uninitialized,
    Ready,
    Degraded,
}

/// The pair every exchange resolves to.
///
/// An empty `session_id` is the sole error signal to upstream layers: it
/// means session continuity was broken and a fresh id must be negotiated on
/// the next call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub session_id: String,
    pub reply: String,
}

/// The conversational core: session store + response pipeline + fallback.
///
/// Constructed once by the process entry point and shared by handle; no
/// process-wide singletons.
pub struct ChatService {
    provider: Option<Arc<dyn ModelProvider>>,
    generation: GenerationConfig,
    request_timeout: Duration,
    sessions: SessionStore,
    fallback: FallbackResponder,
    /// Authoritative state, also the single-flight guard for lazy init.
    status: Mutex<ServiceStatus>,
    /// Read-mostly mirrors of `status` for the request fast path.
    ready: AtomicBool,
    degraded: AtomicBool,
}

impl ChatService {
    /// Create a service in the `Uninitialized` state.
    ///
    /// `provider` is `None` when the remote model could not be configured;
    /// initialization will route such a service straight to degraded mode.
    pub fn new(
        provider: Option<Arc<dyn ModelProvider>>,
        generation: GenerationConfig,
        request_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            generation,
            request_timeout,
            sessions: SessionStore::new(),
            fallback: FallbackResponder::new(),
            status: Mutex::new(ServiceStatus::Uninitialized),
            ready: AtomicBool::new(false),
            degraded: AtomicBool::new(false),
        }
    }

    /// Whether the remote model connection was established.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    /// Whether all calls are served by the fallback generator.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Number of live in-process sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.len().await
    }

    /// Attempt to establish the remote model connection.
    ///
    /// Total: every failure (missing configuration, smoke-test error,
    /// timeout) lands in degraded mode instead of surfacing to the caller.
    pub async fn initialize(&self) {
        let mut status = self.status.lock().await;
        self.run_initialization(&mut status).await;
    }

    /// Explicit re-initialization — the only way out of degraded mode.
    pub async fn reinitialize(&self) {
        self.initialize().await;
    }

    async fn run_initialization(&self, status: &mut ServiceStatus) {
        let next = match self.provider.as_ref() {
            None => {
                warn!("Remote model not configured, entering degraded mode");
                ServiceStatus::Degraded
            }
            Some(provider) => {
                match tokio::time::timeout(self.request_timeout, provider.smoke_test()).await {
                    Ok(Ok(())) => {
                        info!(provider = provider.name(), "Remote model connection established");
                        ServiceStatus::Ready
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "Remote model smoke test failed, entering degraded mode");
                        ServiceStatus::Degraded
                    }
                    Err(_) => {
                        warn!(
                            timeout_secs = self.request_timeout.as_secs(),
                            "Remote model smoke test timed out, entering degraded mode"
                        );
                        ServiceStatus::Degraded
                    }
                }
            }
        };

        *status = next;
        self.ready
            .store(next == ServiceStatus::Ready, Ordering::Relaxed);
        self.degraded
            .store(next == ServiceStatus::Degraded, Ordering::Relaxed);
    }

    /// Lazily initialize when a request arrives against an uninitialized
    /// service. Single-flight: concurrent first requests initialize once.
    async fn ensure_initialized(&self) {
        if self.is_ready() || self.is_degraded() {
            return;
        }
        let mut status = self.status.lock().await;
        if *status == ServiceStatus::Uninitialized {
            self.run_initialization(&mut status).await;
        }
    }

    /// The single entry point: resolve a session, produce a reply.
    ///
    /// Never fails. On a remote-call failure the offending session is
    /// discarded and the reply carries an empty session id.
    pub async fn get_response(&self, message: &str, session_id: Option<&str>) -> ChatReply {
        if message.trim().is_empty() {
            return ChatReply {
                session_id: session_id.unwrap_or_default().to_string(),
                reply: EMPTY_PROMPT_REPLY.to_string(),
            };
        }

        self.ensure_initialized().await;

        if self.is_degraded() {
            return self.fallback_exchange(message, session_id).await;
        }

        let session = self
            .sessions
            .resolve(session_id, SessionMode::Live, GREETING)
            .await;
        let session_id = session.id.to_string();

        let user_turn = Turn::user(message);
        let mut turns = session.context_window(CONTEXT_TURNS).to_vec();
        turns.push(user_turn.clone());

        let request = GenerateRequest {
            system: Some(SYSTEM_PROMPT.to_string()),
            turns,
            config: self.generation.clone(),
        };

        let outcome = match self.provider.as_ref() {
            Some(provider) => {
                tokio::time::timeout(self.request_timeout, provider.generate(request)).await
            }
            // Ready without a provider cannot happen; treat as a failed call.
            None => Ok(Err(kokua_core::ModelError::NotConfigured(
                "no provider".into(),
            ))),
        };

        match outcome {
            Ok(Ok(reply)) => {
                self.sessions
                    .append_exchange(&session_id, user_turn, Turn::model(&reply))
                    .await;
                info!(session_id = %session_id, "AI response generated successfully");
                ChatReply { session_id, reply }
            }
            Ok(Err(e)) => {
                warn!(session_id = %session_id, error = %e, "Error getting AI response");
                self.failed_exchange(&session_id).await
            }
            Err(_) => {
                warn!(
                    session_id = %session_id,
                    timeout_secs = self.request_timeout.as_secs(),
                    "Remote model call timed out"
                );
                self.failed_exchange(&session_id).await
            }
        }
    }

    /// Serve an exchange from the fallback generator, still handing the
    /// caller a usable session id.
    async fn fallback_exchange(&self, message: &str, session_id: Option<&str>) -> ChatReply {
        let session = self
            .sessions
            .resolve(session_id, SessionMode::Fallback, GREETING)
            .await;
        let session_id = session.id.to_string();

        let reply = self.fallback.reply(message);
        self.sessions
            .append_exchange(&session_id, Turn::user(message), Turn::model(&reply))
            .await;

        ChatReply { session_id, reply }
    }

    /// Discard the poisoned session and signal the break with an empty id.
    async fn failed_exchange(&self, session_id: &str) -> ChatReply {
        self.sessions.discard(session_id).await;
        ChatReply {
            session_id: String::new(),
            reply: APOLOGY_REPLY.to_string(),
        }
    }
}
