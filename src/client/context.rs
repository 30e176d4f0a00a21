// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-tab session context.
//!
//! Holds what the UI shows about the signed-in user. The server's cookies are
//! the source of truth: after every action or pushed event the context asks
//! the server again instead of guessing.

use crate::backend::OtpKind;
use crate::client::events::lock;
use crate::client::{ApiClient, AuthEvent, AuthEvents, ClientError, LinkOutcome, Subscription};
use crate::models::{
    AuthStatus, NewPasswordForm, PasswordResetForm, Profile, SessionUser, SignInForm, SignUpForm,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use validator::Validate;

/// What the UI renders from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub user: Option<SessionUser>,
    pub profile: Option<Profile>,
    pub loading: bool,
}

/// Outcome of the latest event-driven re-sync.
#[derive(Debug, Clone, Default)]
struct SyncProgress {
    /// Highest event sequence number the re-sync covered
    seq: u64,
    error: Option<ClientError>,
}

/// Session state for one tab, passed explicitly to whatever needs it.
pub struct SessionContext {
    api: ApiClient,
    events: AuthEvents,
    state: Arc<Mutex<SessionSnapshot>>,
    subscription: Mutex<Option<Subscription>>,
    /// Sequence number of the last event this context received
    received: Arc<AtomicU64>,
    synced: watch::Receiver<SyncProgress>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SessionContext {
    /// Load the current session and profile and start listening for auth
    /// events.
    ///
    /// Every event on `events`, whoever emits it, is followed by a re-sync
    /// with the server. A sign-out clears the user immediately.
    ///
    /// A server error leaves the context signed out and is returned alongside
    /// it, so the caller can show a banner and still render.
    pub async fn init(api: ApiClient, events: AuthEvents) -> (Self, Result<(), ClientError>) {
        let state = Arc::new(Mutex::new(SessionSnapshot {
            loading: true,
            ..Default::default()
        }));

        let (tx, rx) = mpsc::unbounded_channel();
        let (progress, synced) = watch::channel(SyncProgress::default());
        let received = Arc::new(AtomicU64::new(0));

        let handler_state = state.clone();
        let handler_received = received.clone();
        let subscription = events.subscribe(move |event| {
            if *event == AuthEvent::SignedOut {
                let mut state = lock(&handler_state);
                state.user = None;
                state.profile = None;
            }
            let seq = handler_received.fetch_add(1, Ordering::SeqCst) + 1;
            // Closed once the context is disposed
            let _ = tx.send((seq, *event));
        });
        let worker = tokio::spawn(resync_on_events(
            api.clone(),
            state.clone(),
            rx,
            progress,
        ));

        let context = Self {
            api,
            events,
            state,
            subscription: Mutex::new(Some(subscription)),
            received,
            synced,
            worker: Mutex::new(Some(worker)),
        };
        let synced = context.sync().await;
        lock(&context.state).loading = false;
        (context, synced)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        lock(&self.state).clone()
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn events(&self) -> &AuthEvents {
        &self.events
    }

    /// Create an account. Returns whether the user is signed in or must
    /// confirm their email first.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<AuthStatus, ClientError> {
        let form = SignUpForm {
            email: email.trim().to_string(),
            password: password.to_string(),
            display_name: display_name.map(str::to_string),
        };
        form.validate()?;

        let status = self.api.sign_up(&form).await?;
        if status == AuthStatus::SignedIn {
            self.notify(AuthEvent::SignedIn).await?;
        }
        Ok(status)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), ClientError> {
        let form = SignInForm {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        form.validate()?;

        self.api.sign_in(&form).await?;
        self.notify(AuthEvent::SignedIn).await
    }

    /// Sign out on the server, then locally. Local state is cleared even if
    /// the server call fails.
    pub async fn sign_out(&self) -> Result<(), ClientError> {
        let result = self.api.sign_out().await;
        self.events.emit(&AuthEvent::SignedOut);
        {
            let mut state = lock(&self.state);
            state.user = None;
            state.profile = None;
        }
        result
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<(), ClientError> {
        let form = PasswordResetForm {
            email: email.trim().to_string(),
        };
        form.validate()?;
        self.api.request_password_reset(&form).await
    }

    pub async fn set_new_password(&self, password: &str) -> Result<(), ClientError> {
        let form = NewPasswordForm {
            password: password.to_string(),
        };
        form.validate()?;

        self.api.update_password(&form).await?;
        self.notify(AuthEvent::UserUpdated).await
    }

    /// Open an emailed link in this tab. A recovery link signs the user in
    /// and announces [`AuthEvent::PasswordRecovery`] so the UI can ask for a
    /// new password; any other link announces a sign-in.
    pub async fn open_link(&self, link: &str) -> Result<LinkOutcome, ClientError> {
        let outcome = self.api.open_link(link).await?;
        let event = match outcome.kind {
            OtpKind::Recovery => AuthEvent::PasswordRecovery,
            OtpKind::Email => AuthEvent::SignedIn,
        };
        self.notify(event).await?;
        Ok(outcome)
    }

    /// Deliver an event from outside (another tab, an email link) and wait
    /// for the re-sync it triggers.
    pub async fn notify(&self, event: AuthEvent) -> Result<(), ClientError> {
        self.events.emit(&event);
        self.settled().await
    }

    /// Wait until every event this context has received so far has been
    /// followed by a re-sync, and return how the latest one went.
    ///
    /// Returns at once after [`dispose`](Self::dispose).
    pub async fn settled(&self) -> Result<(), ClientError> {
        let target = self.received.load(Ordering::SeqCst);
        let mut synced = self.synced.clone();
        let error = match synced.wait_for(|p| p.seq >= target).await {
            Ok(progress) => progress.error.clone(),
            Err(_) => None,
        };
        error.map_or(Ok(()), Err)
    }

    /// Stop listening for events and forget the user. Safe to call twice.
    pub fn dispose(&self) {
        if let Some(subscription) = lock(&self.subscription).take() {
            self.events.unsubscribe(subscription);
        }
        if let Some(worker) = lock(&self.worker).take() {
            worker.abort();
        }
        *lock(&self.state) = SessionSnapshot::default();
    }

    async fn sync(&self) -> Result<(), ClientError> {
        sync_into(&self.api, &self.state).await
    }
}

async fn sync_into(api: &ApiClient, state: &Mutex<SessionSnapshot>) -> Result<(), ClientError> {
    let info = api.session().await?;
    let profile = match info.user {
        Some(_) => api.profile().await?,
        None => None,
    };

    let mut state = lock(state);
    state.user = info.user;
    state.profile = profile;
    Ok(())
}

/// Re-sync once per burst of events until the bus side is dropped.
async fn resync_on_events(
    api: ApiClient,
    state: Arc<Mutex<SessionSnapshot>>,
    mut rx: mpsc::UnboundedReceiver<(u64, AuthEvent)>,
    progress: watch::Sender<SyncProgress>,
) {
    while let Some((mut seq, event)) = rx.recv().await {
        while let Ok((later, _)) = rx.try_recv() {
            seq = seq.max(later);
        }
        let result = sync_into(&api, &state).await;
        if let Err(e) = &result {
            tracing::warn!(?event, error = %e, "Session re-sync after auth event failed");
        }
        progress.send_replace(SyncProgress {
            seq,
            error: result.err(),
        });
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        self.dispose();
    }
}
