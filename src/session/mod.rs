//! Session activation proxy
//!
//! A `SessionProxy` always exists so callers never branch on "is there a
//! session?". It delegates to a `FileSession` only once it is bound to an
//! execution context and a real session name is active; otherwise every
//! message operation is a silent no-op.

mod context;
mod store;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use serde::Serialize;

use crate::error::Result;

pub use context::{ExecutionContext, InMemoryContext, Message, MessageContent, Role};
pub use store::{
    FileSession, MESSAGES_FILE, METADATA_FILE, SESSION_DIR_PREFIX, SessionMetadata, SessionRecord, delete_session,
    list_sessions, session_dir,
};

/// Sentinel id meaning "no persistence"
pub const INACTIVE_SESSION: &str = "inactive";

/// Sessions home used when none is configured
pub const DEFAULT_SESSIONS_HOME: &str = ".toolhost-sessions";

/// Where the proxy is in its lifecycle
#[derive(Debug)]
pub enum SessionState {
    /// No execution context yet
    Uninitialized,
    /// Context known, nothing persisted
    Bound { context: Weak<dyn ExecutionContext> },
    /// Context known and a session is persisting it
    Active {
        context: Weak<dyn ExecutionContext>,
        session: FileSession,
    },
}

impl SessionState {
    fn context(&self) -> Option<&Weak<dyn ExecutionContext>> {
        match self {
            SessionState::Uninitialized => None,
            SessionState::Bound { context } | SessionState::Active { context, .. } => Some(context),
        }
    }
}

/// Snapshot of the proxy for status output
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub is_active: bool,
    pub context_bound: bool,
    pub sessions_home: PathBuf,
    pub available_sessions: Vec<String>,
}

#[derive(Debug)]
pub struct SessionProxy {
    session_id: String,
    sessions_home: PathBuf,
    state: SessionState,
}

impl SessionProxy {
    /// Create an uninitialized proxy. An empty or absent name means inactive.
    pub fn new(session_name: Option<&str>, sessions_home: Option<PathBuf>) -> Self {
        let session_id = session_name
            .filter(|name| !name.is_empty())
            .unwrap_or(INACTIVE_SESSION)
            .to_string();
        let sessions_home = sessions_home.unwrap_or_else(|| PathBuf::from(DEFAULT_SESSIONS_HOME));

        if let Err(e) = std::fs::create_dir_all(&sessions_home) {
            log::warn!("Could not create sessions home {}: {}", sessions_home.display(), e);
        }

        log::debug!("Session proxy created: id={} home={}", session_id, sessions_home.display());
        Self {
            session_id,
            sessions_home,
            state: SessionState::Uninitialized,
        }
    }

    /// Bind the execution context; activates the requested session if one was named.
    pub fn initialize(&mut self, context: &Arc<dyn ExecutionContext>) {
        let weak = Arc::downgrade(context);
        self.state = match std::mem::replace(&mut self.state, SessionState::Uninitialized) {
            SessionState::Active { session, .. } => SessionState::Active { context: weak, session },
            _ => SessionState::Bound { context: weak },
        };

        if self.session_id != INACTIVE_SESSION && !self.is_active() {
            let name = self.session_id.clone();
            self.set_active_session(&name);
        }
    }

    /// Switch persistence to session `name`. On failure the proxy is left as it was.
    pub fn set_active_session(&mut self, name: &str) {
        if name == INACTIVE_SESSION {
            log::warn!("Refusing to activate the '{}' sentinel; use deactivate_session", INACTIVE_SESSION);
            return;
        }

        let Some(weak) = self.state.context().cloned() else {
            log::error!("Cannot activate session '{}' before a context is bound", name);
            return;
        };
        let Some(context) = weak.upgrade() else {
            log::error!("Cannot activate session '{}': execution context was dropped", name);
            return;
        };

        let session = FileSession::open(&self.sessions_home, name).and_then(|mut session| {
            session.initialize(context.as_ref())?;
            Ok(session)
        });

        match session {
            Ok(session) => {
                log::info!("Activated session '{}' ({} messages)", name, session.len());
                self.session_id = name.to_string();
                self.state = SessionState::Active { context: weak, session };
            }
            Err(e) => {
                log::error!("Failed to activate session '{}': {}. Continuing without persistence", name, e);
            }
        }
    }

    /// Stop persisting while keeping the context bound
    pub fn deactivate_session(&mut self) {
        match std::mem::replace(&mut self.state, SessionState::Uninitialized) {
            SessionState::Active { context, session } => {
                log::info!("Deactivated session '{}'", session.session_id());
                self.state = SessionState::Bound { context };
                self.session_id = INACTIVE_SESSION.to_string();
            }
            other => {
                log::debug!("No active session to deactivate");
                self.state = other;
            }
        }
    }

    /// Run `op` against the active session, logging instead of failing.
    fn with_active(&mut self, action: &str, op: impl FnOnce(&mut FileSession) -> Result<()>) {
        if let SessionState::Active { session, .. } = &mut self.state {
            if let Err(e) = op(session) {
                log::warn!("Failed to {} session '{}': {}", action, session.session_id(), e);
            }
        }
    }

    pub fn append_message(&mut self, message: &Message) {
        self.with_active("append to", |session| session.append(message));
    }

    pub fn redact_latest_message(&mut self, replacement: &Message) {
        self.with_active("redact in", |session| session.redact_latest(replacement));
    }

    /// Persist whatever the context holds that the log does not
    pub fn sync_agent(&mut self) {
        let SessionState::Active { context, session } = &mut self.state else {
            return;
        };
        let Some(context) = context.upgrade() else {
            log::warn!("Execution context dropped; nothing to sync");
            return;
        };
        if let Err(e) = session.sync(context.as_ref()) {
            log::warn!("Failed to sync session '{}': {}", session.session_id(), e);
        }
    }

    /// Clear the context's messages, and the persisted log when active.
    pub fn clear(&mut self) {
        if let Some(context) = self.state.context().and_then(Weak::upgrade) {
            context.clear_messages();
        }
        self.with_active("clear", FileSession::clear);
    }

    /// Flush metadata of the active session
    pub fn save(&mut self) {
        self.with_active("save", FileSession::save);
    }

    /// Activate an existing session. Returns false if it is not stored or activation fails.
    pub fn load(&mut self, id: &str) -> bool {
        if !self.list_sessions().iter().any(|name| name == id) {
            log::warn!("Session '{}' not found under {}", id, self.sessions_home.display());
            return false;
        }
        self.set_active_session(id);
        self.current_session_id() == Some(id)
    }

    /// Delete a stored session, deactivating it first if it is the active one.
    pub fn delete_session(&mut self, id: &str) -> bool {
        if self.current_session_id() == Some(id) {
            self.deactivate_session();
        }
        match delete_session(&self.sessions_home, id) {
            Ok(deleted) => deleted,
            Err(e) => {
                log::warn!("Failed to delete session '{}': {}", id, e);
                false
            }
        }
    }

    pub fn list_sessions(&self) -> Vec<String> {
        list_sessions(&self.sessions_home).unwrap_or_else(|e| {
            log::warn!("Failed to list sessions in {}: {}", self.sessions_home.display(), e);
            Vec::new()
        })
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active { .. })
    }

    /// Requested or active id; `INACTIVE_SESSION` when none
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn current_session_id(&self) -> Option<&str> {
        match &self.state {
            SessionState::Active { session, .. } => Some(session.session_id()),
            _ => None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn sessions_home(&self) -> &Path {
        &self.sessions_home
    }

    pub fn session_info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.session_id.clone(),
            is_active: self.is_active(),
            context_bound: self.state.context().and_then(Weak::upgrade).is_some(),
            sessions_home: self.sessions_home.clone(),
            available_sessions: self.list_sessions(),
        }
    }
}
