//! Authentication state
//!
//! The library never performs authentication itself; the embedding
//! application supplies an `IdentityProvider` and the session reacts to
//! sign-in and sign-out by starting and stopping cloud sync.

use tokio::sync::watch;

/// Source of the current user identity.
///
/// `None` means signed out. Implementations must emit a change on the
/// watch channel whenever the user changes.
pub trait IdentityProvider: Send + Sync {
    /// The currently signed-in user, if any
    fn current_user(&self) -> Option<String>;

    /// Subscribe to identity changes
    fn watch(&self) -> watch::Receiver<Option<String>>;
}

/// Watch-channel backed identity provider.
///
/// Suits applications that drive sign-in themselves and only need to
/// hand the resulting user id to the session.
pub struct SessionIdentity {
    state: watch::Sender<Option<String>>,
}

impl SessionIdentity {
    /// Start signed out
    pub fn new() -> Self {
        let (state, _) = watch::channel(None);
        Self { state }
    }

    /// Start with a user already signed in
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        let (state, _) = watch::channel(Some(user_id.into()));
        Self { state }
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        tracing::info!("User signed in: {}", user_id);
        self.state.send_replace(Some(user_id));
    }

    pub fn sign_out(&self) {
        tracing::info!("User signed out");
        self.state.send_replace(None);
    }
}

impl Default for SessionIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider for SessionIdentity {
    fn current_user(&self) -> Option<String> {
        self.state.borrow().clone()
    }

    fn watch(&self) -> watch::Receiver<Option<String>> {
        self.state.subscribe()
    }
}
