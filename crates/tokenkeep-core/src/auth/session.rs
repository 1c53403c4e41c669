use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::api::{AuthApi, AuthError};
use crate::config::Config;
use crate::models::User;

use super::expiry::{self, Clock, SystemClock};
use super::store::SessionStore;
use super::token::{self, Claims};

/// A live token together with what was decoded from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    token: String,
    claims: Claims,
    user: User,
}

impl Session {
    /// Decode `token` into a session. `None` if the token is malformed.
    pub fn from_token(token: &str) -> Option<Self> {
        let claims = token::decode(token)?;
        let user = User::from(&claims);
        Some(Self {
            token: token.trim().to_string(),
            claims,
            user,
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn is_valid_at(&self, now: i64) -> bool {
        expiry::is_valid(Some(&self.claims), now)
    }
}

/// What consumers observe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// Startup: the persisted slot has not been read yet
    Hydrating,
    Anonymous,
    Authenticated(Session),
}

impl AuthState {
    pub fn is_loading(&self) -> bool {
        matches!(self, AuthState::Hydrating)
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthState::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.session().map(Session::user)
    }

    pub fn token(&self) -> Option<&str> {
        self.session().map(Session::token)
    }
}

/// Owner of the single live session.
///
/// All transitions go through `hydrate`, `login`, `logout`, `force_logout`
/// and `force_logout_if_current`. Each one holds the transition lock while it writes the
/// persisted slot and publishes the new [`AuthState`], so the token and the
/// user derived from it always change together.
///
/// Expiry is checked whenever state is read rather than on a timer: a session
/// past its `exp` stays published until the next read (or the next tick of
/// [`spawn_expiry_watch`](Self::spawn_expiry_watch), if one is running).
///
/// Overlapping logins resolve last-writer-wins. Any logout bumps the logout
/// epoch; a login that was dispatched before that bump is discarded with
/// [`AuthError::Superseded`] instead of resurrecting the session.
pub struct AuthSessionManager {
    api: AuthApi,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    /// Serializes transitions; guards the logout epoch.
    transitions: Mutex<u64>,
    state_tx: watch::Sender<AuthState>,
}

impl AuthSessionManager {
    pub fn new(api: AuthApi, store: Arc<dyn SessionStore>) -> Self {
        let (state_tx, _) = watch::channel(AuthState::Hydrating);
        Self {
            api,
            store,
            clock: Arc::new(SystemClock),
            transitions: Mutex::new(0),
            state_tx,
        }
    }

    /// Build a manager from configuration: login endpoint and storage backend
    pub fn from_config(config: &Config) -> Result<Self> {
        let api = AuthApi::new(config.auth_base_url.clone(), config.request_timeout())?;
        let store = config.open_store()?;
        Ok(Self::new(api, store))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn api(&self) -> &AuthApi {
        &self.api
    }

    fn lock_transitions(&self) -> MutexGuard<'_, u64> {
        self.transitions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, next: AuthState) {
        self.state_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn clear_store(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear persisted session");
        }
    }

    // ===== Transitions =====

    /// Restore the session persisted by a previous run.
    ///
    /// Runs once; later calls return the current state untouched. Anything
    /// other than a decodable, unexpired token leaves the manager anonymous
    /// with the slot cleared.
    ///
    /// Reading the slot is blocking I/O (a file or the OS keychain). It runs
    /// outside the transition lock, but async callers on a busy runtime may
    /// still want to call this from `tokio::task::spawn_blocking`. A login or
    /// logout that lands while the slot is being read wins over what was read.
    ///
    /// Must be called once at startup. Protected requests wait for it, up to
    /// the client's hydration wait, and then fail as not authenticated.
    pub fn hydrate(&self) -> AuthState {
        if !self.is_loading() {
            debug!("Session already hydrated");
            return self.state_tx.borrow().clone();
        }

        let stored = match self.store.load() {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted session");
                None
            }
        };

        let _guard = self.lock_transitions();
        if !self.is_loading() {
            debug!("Session changed while reading the persisted slot, discarding what was read");
            return self.state_tx.borrow().clone();
        }

        let now = self.clock.now();
        let next = match stored.as_deref().map(Session::from_token) {
            Some(Some(session)) if session.is_valid_at(now) => {
                info!(username = %session.user.username, "Restored persisted session");
                AuthState::Authenticated(session)
            }
            Some(Some(_)) => {
                info!("Persisted session has expired");
                self.clear_store();
                AuthState::Anonymous
            }
            Some(None) => {
                info!("Persisted token could not be decoded");
                self.clear_store();
                AuthState::Anonymous
            }
            None => {
                debug!("No persisted session");
                self.clear_store();
                AuthState::Anonymous
            }
        };

        self.publish(next.clone());
        next
    }

    /// Sign in with `username` and `password`.
    ///
    /// The returned user is derived from the token's claims, the same way
    /// [`hydrate`](Self::hydrate) derives it on the next start.
    pub async fn login(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let epoch = *self.lock_transitions();

        let response = match self.api.authenticate(username, password).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, username, "Login failed");
                return Err(e);
            }
        };

        let session = Session::from_token(&response.token).ok_or_else(|| {
            warn!("Login returned a token that could not be decoded");
            AuthError::MalformedToken
        })?;
        if !session.is_valid_at(self.clock.now()) {
            warn!(exp = session.claims.exp, "Login returned an expired token");
            return Err(AuthError::Expired);
        }
        if session.user != response.user {
            warn!(
                token_user = %session.user.username,
                response_user = %response.user.username,
                "Login response user differs from token claims, using token claims"
            );
        }

        let guard = self.lock_transitions();
        if *guard != epoch {
            warn!(username, "Discarding login that resolved after a logout");
            return Err(AuthError::Superseded);
        }

        if let Err(e) = self.store.save(session.token()) {
            warn!(error = %e, "Failed to persist session");
        }

        let user = session.user.clone();
        info!(username = %user.username, role = %user.role, "Login successful");
        self.publish(AuthState::Authenticated(session));
        drop(guard);

        Ok(user)
    }

    /// End the session. Safe to call when already signed out.
    pub fn logout(&self) {
        self.end_session("Logged out");
    }

    /// End the session because the server rejected its token.
    pub fn force_logout(&self) {
        self.end_session("Server rejected the session token");
    }

    /// End the session only if `token` is still the live one.
    ///
    /// A rejection for a token that has since been replaced (logout, then a
    /// new login) says nothing about the new session and is ignored.
    /// Returns true if a session was ended.
    pub fn force_logout_if_current(&self, token: &str) -> bool {
        let mut epoch = self.lock_transitions();
        let is_current = self.state_tx.borrow().token() == Some(token);
        if !is_current {
            debug!("Ignoring rejection of a token that is no longer live");
            return false;
        }
        self.end_session_locked(&mut epoch, "Server rejected the session token");
        true
    }

    fn end_session(&self, reason: &'static str) {
        let mut epoch = self.lock_transitions();
        self.end_session_locked(&mut epoch, reason);
    }

    fn end_session_locked(&self, epoch: &mut u64, reason: &'static str) {
        *epoch += 1;
        self.clear_store();
        if let Some(user) = self.state_tx.borrow().user() {
            info!(username = %user.username, reason, "Session ended");
        }
        self.publish(AuthState::Anonymous);
    }

    /// Log out if the held session has passed its expiry.
    /// Returns true if a session was ended.
    pub fn check_expiry(&self) -> bool {
        if !self.held_session_expired() {
            return false;
        }

        let mut epoch = self.lock_transitions();
        // Another transition may have run while we waited for the lock
        if !self.held_session_expired() {
            return false;
        }
        self.end_session_locked(&mut epoch, "Session expired");
        true
    }

    fn held_session_expired(&self) -> bool {
        let now = self.clock.now();
        self.state_tx
            .borrow()
            .session()
            .map(|session| !session.is_valid_at(now))
            .unwrap_or(false)
    }

    // ===== Reads =====

    /// Current state, after the expiry check
    pub fn state(&self) -> AuthState {
        self.check_expiry();
        self.state_tx.borrow().clone()
    }

    /// The bearer token for protected calls, if the session is still valid
    pub fn current_token(&self) -> Option<String> {
        self.state().token().map(str::to_string)
    }

    pub fn current_user(&self) -> Option<User> {
        self.state().user().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().session().is_some()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.state().user().map(|u| u.has_role(role)).unwrap_or(false)
    }

    /// True only until [`hydrate`](Self::hydrate) has run
    pub fn is_loading(&self) -> bool {
        self.state_tx.borrow().is_loading()
    }

    /// Resolves once hydration has finished
    pub async fn wait_until_hydrated(&self) {
        let mut rx = self.state_tx.subscribe();
        while rx.borrow_and_update().is_loading() {
            // The sender lives in `self`, so this only fails if we are being torn down
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    /// Observe every state transition.
    ///
    /// Values pushed through the receiver are not expiry-checked; call
    /// [`state`](Self::state) when the answer has to be current.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state_tx.subscribe()
    }

    /// Poll [`check_expiry`](Self::check_expiry) every `period`.
    ///
    /// The task stops once the manager is dropped.
    pub fn spawn_expiry_watch(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(manager) = weak.upgrade() else {
                    debug!("Session manager dropped, stopping expiry watch");
                    break;
                };
                if manager.check_expiry() {
                    info!("Expiry watch ended the session");
                }
            }
        })
    }
}
