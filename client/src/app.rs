//! Composition root.
//!
//! [`QueueClient`] wires the session store, the REST gateway and one realtime
//! channel per authenticated session. UI layers drive it through the flow
//! methods and observe it through the `on_*` callbacks.

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::gateway::{
    Gateway, GetCodeRequest, GetCodeResponse, RequestResetRequest, ResetPasswordRequest,
    SignInRequest, SignUpRequest, SignUpResponse, VerifyCodeRequest,
};
use crate::realtime::{
    ChannelError, ChannelSettings, ConnectionState, Observers, RealtimeChannel, Subscription,
    Transport,
};
use crate::session::{SessionAction, SessionHandle, SessionStorage, Ticket, TicketUpdate, UserPatch};
use crate::validation::{self, Registration};
use crate::view_model::TicketViewModel;
use queuepass_core::{Clock, SystemClock};
use queuepass_runtime::retry::{RetryPolicy, retry_with_predicate};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Attempts and spacing for the ticket refresh.
const SYNC_RETRIES: usize = 3;
const SYNC_RETRY_DELAY: Duration = Duration::from_secs(1);

/// The queue client.
pub struct QueueClient<T: Transport + Clone> {
    session: SessionHandle,
    gateway: Gateway<SessionHandle>,
    transport: T,
    settings: ChannelSettings,
    clock: Arc<dyn Clock>,
    live: Arc<Mutex<Option<LiveSession<T>>>>,
    events: Events,
    expiry_watcher: JoinHandle<()>,
}

/// Consumer callbacks; they outlive individual channels.
#[derive(Clone, Default)]
struct Events {
    ticket_updates: Observers<TicketUpdate>,
    connection_changes: Observers<bool>,
    errors: Observers<ChannelError>,
}

/// Channel and plumbing of one authenticated session.
struct LiveSession<T: Transport> {
    channel: RealtimeChannel<T>,
    forwards: Vec<Subscription>,
    merge: JoinHandle<()>,
}

impl<T: Transport> LiveSession<T> {
    fn dispose(self) {
        self.channel.disconnect();
        for forward in &self.forwards {
            forward.unsubscribe();
        }
        self.merge.abort();
    }
}

impl<T: Transport + Clone> QueueClient<T> {
    /// Restore the stored session and, when it is authenticated, go live.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Network`] if the HTTP client cannot be built,
    /// or [`ClientError::Store`] if the session cannot be initialized.
    #[tracing::instrument(skip_all, fields(api = %config.api.base_url))]
    pub async fn start(
        config: ClientConfig,
        storage: Arc<dyn SessionStorage>,
        transport: T,
    ) -> Result<Self> {
        let session = SessionHandle::restore(storage).await?;
        let gateway = Gateway::new(&config.api, session.clone())?;
        let live = Arc::new(Mutex::new(None));

        let expiry_watcher = tokio::spawn(watch_expiry(session.subscribe(), Arc::clone(&live)));

        let client = Self {
            session,
            gateway,
            transport,
            settings: ChannelSettings::from(&config.realtime),
            clock: Arc::new(SystemClock),
            live,
            events: Events::default(),
            expiry_watcher,
        };

        if client.session.is_authenticated().await {
            if let Some(token) = client.session.token().await {
                tracing::info!("Restored authenticated session");
                client.go_live(&token);
            }
        }

        Ok(client)
    }

    /// Use `clock` for validation and view models.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The session store.
    #[must_use]
    pub const fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// The REST gateway.
    #[must_use]
    pub const fn gateway(&self) -> &Gateway<SessionHandle> {
        &self.gateway
    }

    /// Realtime connection state of the current session.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.live()
            .as_ref()
            .map_or(ConnectionState::Disconnected, |live| live.channel.state())
    }

    /// Called after each realtime update has been merged into the session.
    pub fn on_ticket_update<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&TicketUpdate) + Send + Sync + 'static,
    {
        self.events.ticket_updates.register(callback)
    }

    /// Called when the realtime subscription goes live or is lost.
    pub fn on_connection_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&bool) + Send + Sync + 'static,
    {
        self.events.connection_changes.register(callback)
    }

    /// Called with realtime transport and broker errors.
    pub fn on_error<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ChannelError) + Send + Sync + 'static,
    {
        self.events.errors.register(callback)
    }

    // ═══════════════════════════════════════════════════════════
    // Authentication
    // ═══════════════════════════════════════════════════════════

    /// Sign in with phone and password, then go live.
    ///
    /// # Errors
    ///
    /// Validation, network, server or rejection failures.
    #[tracing::instrument(skip(self, password))]
    pub async fn sign_in(&self, phone: &str, password: &str) -> Result<()> {
        validation::validate_sign_in(phone, password)?;

        let token = self
            .gateway
            .sign_in(&SignInRequest {
                phone_number: phone.trim().to_string(),
                password: password.to_string(),
            })
            .await?;

        self.session.login(token.clone(), UserPatch::phone(phone.trim())).await?;
        tracing::info!("Signed in");
        self.go_live(&token);
        Ok(())
    }

    /// Create an account. The server texts a verification code.
    ///
    /// # Errors
    ///
    /// Validation, network or server failures.
    #[tracing::instrument(skip(self, form), fields(phone = %form.phone))]
    pub async fn register(&self, form: &Registration) -> Result<SignUpResponse> {
        form.validate(self.clock.now())?;

        self.gateway
            .sign_up(&SignUpRequest {
                name: form.name.trim().to_string(),
                birth_date: form.birth_date.trim().to_string(),
                phone_number: form.phone.trim().to_string(),
                password: form.password.clone(),
            })
            .await
    }

    /// Text a verification code to `phone`.
    ///
    /// # Errors
    ///
    /// Validation, network, server or rejection failures.
    #[tracing::instrument(skip(self))]
    pub async fn request_code(&self, phone: &str) -> Result<GetCodeResponse> {
        validation::validate_phone(phone)?;
        self.gateway
            .get_code(&GetCodeRequest {
                phone_number: phone.trim().to_string(),
            })
            .await
    }

    /// Verify the texted code, sign in as a verified user and go live.
    ///
    /// # Errors
    ///
    /// Validation, network, server or rejection failures.
    #[tracing::instrument(skip(self, code))]
    pub async fn verify_code(&self, phone: &str, code: &str, birth_date: Option<&str>) -> Result<()> {
        validation::validate_code(code)?;

        let token = self
            .gateway
            .verify_code(&VerifyCodeRequest {
                phone_number: phone.trim().to_string(),
                code: code.trim().to_string(),
            })
            .await?;

        let mut patch = UserPatch::phone(phone.trim()).with_phone_verified(true);
        if let Some(birth_date) = birth_date {
            patch = patch.with_birth_date(birth_date);
        }
        self.session.login(token.clone(), patch).await?;
        tracing::info!("Phone verified, signed in");
        self.go_live(&token);
        Ok(())
    }

    /// Send a password reset link to `number`.
    ///
    /// # Errors
    ///
    /// Validation, network or server failures.
    #[tracing::instrument(skip(self))]
    pub async fn request_password_reset(&self, number: &str) -> Result<()> {
        if number.trim().is_empty() {
            return Err(validation::ValidationError::Required("Phone number").into());
        }
        self.gateway
            .request_reset(&RequestResetRequest {
                number: number.trim().to_string(),
            })
            .await
    }

    /// Set a new password with the token from the reset link.
    ///
    /// # Errors
    ///
    /// Validation, network or server failures.
    #[tracing::instrument(skip_all)]
    pub async fn reset_password(&self, token: &str, new_password: &str, confirmation: &str) -> Result<()> {
        validation::validate_password_reset(token, new_password, confirmation)?;
        self.gateway
            .reset_password(&ResetPasswordRequest {
                token: token.trim().to_string(),
                new_password: new_password.to_string(),
            })
            .await
    }

    /// End the session.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Store`] if the session store is shutting down.
    #[tracing::instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        self.go_offline();
        self.session.logout().await?;
        tracing::info!("Signed out");
        Ok(())
    }

    /// Close the realtime channel and let pending session writes finish.
    ///
    /// Every later mutation fails with [`ClientError::Store`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Store`] if writes are still running after
    /// `timeout`.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self, timeout: Duration) -> Result<()> {
        self.expiry_watcher.abort();
        self.go_offline();
        self.session.shutdown(timeout).await
    }

    // ═══════════════════════════════════════════════════════════
    // Ticket
    // ═══════════════════════════════════════════════════════════

    /// Take a place in the queue.
    ///
    /// # Errors
    ///
    /// Network, server or decode failures.
    #[tracing::instrument(skip(self))]
    pub async fn take_place(&self) -> Result<Ticket> {
        let ticket = self.gateway.create_ticket().await?;
        self.session.set_ticket(Some(ticket.clone())).await?;
        tracing::info!(status = ?ticket.status, "Ticket created");
        Ok(ticket)
    }

    /// Refresh the ticket from the server, retrying network failures.
    ///
    /// A missing ticket on the server leaves the local one alone.
    ///
    /// # Errors
    ///
    /// Network (after retries), server or decode failures.
    #[tracing::instrument(skip(self))]
    pub async fn sync_ticket(&self) -> Result<Option<Ticket>> {
        let policy = RetryPolicy::fixed(SYNC_RETRIES, SYNC_RETRY_DELAY);
        let ticket =
            retry_with_predicate(policy, || self.gateway.get_ticket(), ClientError::is_network).await?;

        if let Some(ticket) = &ticket {
            self.session.set_ticket(Some(ticket.clone())).await?;
        }
        Ok(ticket)
    }

    /// Mark the ticket completed and drop it locally.
    ///
    /// # Errors
    ///
    /// Network or server failures; the local ticket is kept on failure.
    #[tracing::instrument(skip(self))]
    pub async fn complete_ticket(&self) -> Result<()> {
        self.gateway.complete_ticket().await?;
        self.session.clear_ticket().await?;
        tracing::info!("Ticket completed");
        Ok(())
    }

    /// Give up the ticket and drop it locally.
    ///
    /// # Errors
    ///
    /// Network or server failures; the local ticket is kept on failure.
    #[tracing::instrument(skip(self))]
    pub async fn delete_ticket(&self) -> Result<()> {
        self.gateway.delete_ticket().await?;
        self.session.clear_ticket().await?;
        tracing::info!("Ticket deleted");
        Ok(())
    }

    /// Countdown view for the current ticket, mounted now.
    pub async fn ticket_view(&self) -> Option<TicketViewModel> {
        let ticket = self.session.ticket().await?;
        Some(TicketViewModel::mount(ticket, Arc::clone(&self.clock)))
    }

    // ═══════════════════════════════════════════════════════════
    // Realtime plumbing
    // ═══════════════════════════════════════════════════════════

    fn live(&self) -> MutexGuard<'_, Option<LiveSession<T>>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the realtime channel for `token`, replacing any channel opened
    /// with an earlier token.
    fn go_live(&self, token: &str) {
        self.go_offline();

        let channel = RealtimeChannel::new(self.transport.clone(), self.settings.clone());
        let (updates, mut inbox) = mpsc::unbounded_channel::<TicketUpdate>();

        let forwards = vec![
            channel.on_ticket_update(move |update| {
                let _ = updates.send(update.clone());
            }),
            {
                let changes = self.events.connection_changes.clone();
                channel.on_connection_change(move |connected| changes.notify(connected))
            },
            {
                let errors = self.events.errors.clone();
                channel.on_error(move |error| errors.notify(error))
            },
        ];

        let session = self.session.clone();
        let merged = self.events.ticket_updates.clone();
        let merge = tokio::spawn(async move {
            while let Some(update) = inbox.recv().await {
                match session.apply_ticket_update(update.clone()).await {
                    Ok(Some(_)) => merged.notify(&update),
                    Ok(None) => tracing::debug!("Push arrived without a ticket, not forwarded"),
                    Err(error) => tracing::warn!(%error, "Could not merge ticket update"),
                }
            }
        });

        channel.connect(token);
        *self.live() = Some(LiveSession {
            channel,
            forwards,
            merge,
        });
    }

    fn go_offline(&self) {
        let taken = self.live().take();
        if let Some(live) = taken {
            live.dispose();
        }
    }
}

impl<T: Transport + Clone> Drop for QueueClient<T> {
    fn drop(&mut self) {
        self.expiry_watcher.abort();
        self.go_offline();
    }
}

impl<T: Transport + Clone> std::fmt::Debug for QueueClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueClient")
            .field("gateway", &self.gateway)
            .field("connection", &self.connection_state())
            .finish_non_exhaustive()
    }
}

/// Dispose the channel whenever the session expires.
async fn watch_expiry<T: Transport>(
    mut actions: broadcast::Receiver<SessionAction>,
    live: Arc<Mutex<Option<LiveSession<T>>>>,
) {
    loop {
        match actions.recv().await {
            Ok(SessionAction::SessionExpired) => {
                tracing::warn!("Session expired, closing realtime channel");
                let taken = live.lock().unwrap_or_else(PoisonError::into_inner).take();
                if let Some(session) = taken {
                    session.dispose();
                }
            },
            Ok(_) => {},
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Expiry watcher lagged");
            },
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}
