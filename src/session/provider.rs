use anyhow::Result;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::{Session, SessionConf};

/// Hands out sessions and takes them back.
pub trait SessionProvider: Send + Sync {
    /// Return the active session, starting one from `conf` if there is none.
    ///
    /// An active session is returned as-is even when `conf` differs from the one it
    /// was started with.
    fn get_or_create(&self, conf: &SessionConf) -> Result<Arc<Session>>;

    fn active(&self) -> Option<Arc<Session>>;

    /// Stop `session`. Stopping a session that is not the active one only marks it stopped.
    fn stop(&self, session: &Session);
}

/// Keeps at most one session alive and shares it between every caller.
#[derive(Default)]
pub struct SharedSessionProvider {
    active: Mutex<Option<Arc<Session>>>,
}

impl SharedSessionProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionProvider for SharedSessionProvider {
    fn get_or_create(&self, conf: &SessionConf) -> Result<Arc<Session>> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(session) = active.as_ref() {
            if session.conf() != conf {
                warn!(
                    session_id = session.id(),
                    "reusing active session; requested options are ignored"
                );
            }
            debug!(session_id = session.id(), "reusing active session");
            return Ok(Arc::clone(session));
        }

        let session = Arc::new(Session::start(conf.clone())?);
        *active = Some(Arc::clone(&session));
        Ok(session)
    }

    fn active(&self) -> Option<Arc<Session>> {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn stop(&self, session: &Session) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if active.as_ref().is_some_and(|s| s.id() == session.id()) {
            *active = None;
        }
        session.mark_stopped();
    }
}

/// Scoped hold on a session: stops it through its provider when dropped.
pub struct SessionGuard<'a> {
    provider: &'a dyn SessionProvider,
    session: Arc<Session>,
}

impl<'a> SessionGuard<'a> {
    pub fn new(provider: &'a dyn SessionProvider, session: Arc<Session>) -> Self {
        Self { provider, session }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

impl std::ops::Deref for SessionGuard<'_> {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.provider.stop(&self.session);
    }
}
