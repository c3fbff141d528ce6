//! Payment Poller Service
//!
//! Creates deposit intents and watches each one on its own task until it
//! settles. The watch loop multiplexes four events:
//!
//! - **Cancellation**: the user closed the intent; timers stop and any
//!   outstanding request is dropped.
//! - **Poll completion**: the single in-flight status request resolved.
//! - **Poll tick**: fixed-interval status polling; skipped while a request is
//!   outstanding.
//! - **Clock tick**: the local expiry clock.
//!
//! The session is owned by the watch task alone, so no locking is needed.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::Reconciler;
use crate::clock::Clock;
use crate::config::PollingConfig;
use crate::error::PollerError;
use crate::intent::{PaymentIntent, PaymentMethod, PaymentStatus, StatusUpdate};
use crate::normalize::{normalize_intent, normalize_status_update};
use crate::notify::Notifier;
use crate::service::session::{Effect, PaymentSession, PollSkip, PollTicket};
use crate::wallet_client::{CreateIntentRequest, PaymentGateway};

// ============================================================================
// SETTINGS
// ============================================================================

/// Timing and limits used by the poller.
#[derive(Debug, Clone)]
pub struct PollerSettings {
    /// Interval between status polls
    pub poll_interval: Duration,
    /// Tick of the local expiry clock
    pub clock_tick: Duration,
    /// Smallest accepted deposit amount
    pub min_amount: Decimal,
    /// Expiry window when the backend omits one
    pub default_expiry: Duration,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            clock_tick: Duration::from_secs(1),
            min_amount: Decimal::new(1, 2),
            default_expiry: Duration::from_secs(30 * 60),
        }
    }
}

impl PollerSettings {
    /// Builds settings from the polling section of the configuration.
    pub fn from_config(config: &PollingConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.interval_ms),
            clock_tick: Duration::from_millis(config.clock_tick_ms),
            min_amount: config.min_amount,
            default_expiry: Duration::from_secs(config.default_expiry_secs),
        }
    }
}

// ============================================================================
// SNAPSHOTS AND HANDLES
// ============================================================================

/// Observable state of a watched intent.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentSnapshot {
    pub intent: PaymentIntent,
    /// Time left before local expiry
    pub remaining: Duration,
    /// Closed by the user or after approval
    pub closed: bool,
    /// The watch task is still running; false on the final snapshot
    pub watching: bool,
}

impl IntentSnapshot {
    fn of(session: &PaymentSession, now: DateTime<Utc>, watching: bool) -> Self {
        Self {
            intent: session.intent().clone(),
            remaining: session.remaining(now),
            closed: session.is_closed(),
            watching,
        }
    }
}

/// Owner handle for a watched intent.
///
/// Dropping the handle does not stop the watch; call [`IntentHandle::close`].
pub struct IntentHandle {
    snapshots: watch::Receiver<IntentSnapshot>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl IntentHandle {
    /// Latest published state.
    pub fn snapshot(&self) -> IntentSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver that is notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<IntentSnapshot> {
        self.snapshots.clone()
    }

    pub fn payment_id(&self) -> String {
        self.snapshots.borrow().intent.payment_id.clone()
    }

    /// Waits until the intent reaches a terminal status or is closed, and all
    /// terminal handling (reconciliation, notification) has run.
    ///
    /// # Returns
    ///
    /// * `Ok(PaymentIntent)` - Payment approved
    /// * `Err(PollerError::TerminalRejection)` - Backend reported failure
    /// * `Err(PollerError::LocalExpiry)` - Local clock passed `expires_at`
    /// * `Err(PollerError::Cancelled)` - Closed before a terminal status
    pub async fn wait_terminal(&self) -> Result<PaymentIntent, PollerError> {
        let mut rx = self.snapshots.clone();
        loop {
            let snapshot = rx.borrow_and_update().clone();
            if !snapshot.watching {
                return outcome_of(snapshot.intent);
            }
            if rx.changed().await.is_err() {
                // Watch task is gone; report whatever it last published
                let last = rx.borrow().clone();
                return outcome_of(last.intent);
            }
        }
    }

    /// Closes the intent: cancels timers and any in-flight poll, then waits
    /// for the watch task to finish.
    pub async fn close(self) -> IntentSnapshot {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("Intent watch task ended abnormally: {}", e);
        }
        let snapshot = self.snapshots.borrow().clone();
        snapshot
    }
}

fn outcome_of(intent: PaymentIntent) -> Result<PaymentIntent, PollerError> {
    match intent.status {
        PaymentStatus::Approved => Ok(intent),
        PaymentStatus::Rejected => Err(PollerError::TerminalRejection {
            payment_id: intent.payment_id,
            status: intent.status.to_string(),
            detail: intent.status_detail,
        }),
        PaymentStatus::Expired => Err(PollerError::LocalExpiry {
            payment_id: intent.payment_id,
        }),
        PaymentStatus::Pending | PaymentStatus::Other(_) => Err(PollerError::Cancelled {
            payment_id: intent.payment_id,
        }),
    }
}

// ============================================================================
// POLLER
// ============================================================================

/// Creates payment intents and watches them to resolution.
#[derive(Clone)]
pub struct PaymentPoller {
    gateway: Arc<dyn PaymentGateway>,
    reconciler: Arc<dyn Reconciler>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    settings: PollerSettings,
}

impl PaymentPoller {
    /// Creates a new poller.
    ///
    /// # Arguments
    ///
    /// * `gateway` - Backend used to create intents and read their status
    /// * `reconciler` - Account views refreshed on approval
    /// * `notifier` - Receives terminal outcomes
    /// * `clock` - Wall clock for local expiry
    /// * `settings` - Cadence and limits
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        reconciler: Arc<dyn Reconciler>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        settings: PollerSettings,
    ) -> Self {
        Self {
            gateway,
            reconciler,
            notifier,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &PollerSettings {
        &self.settings
    }

    /// Creates a deposit intent.
    ///
    /// Not retried: on failure the user resubmits.
    ///
    /// # Returns
    ///
    /// * `Ok(PaymentIntent)` - Intent with a payable QR payload and/or image
    /// * `Err(PollerError::InvalidAmount)` - Amount below the configured minimum; no request sent
    /// * `Err(PollerError::IntentCreation)` - Backend did not return a usable intent
    pub async fn create_intent(
        &self,
        amount: Decimal,
        method: PaymentMethod,
    ) -> Result<PaymentIntent, PollerError> {
        if amount < self.settings.min_amount {
            return Err(PollerError::InvalidAmount {
                amount,
                minimum: self.settings.min_amount,
            });
        }

        let request = CreateIntentRequest { amount, method };
        let body = self.gateway.create_intent(&request).await.map_err(|e| match e {
            PollerError::IntentCreation(_) => e,
            other => PollerError::IntentCreation(other.to_string()),
        })?;

        let default_ttl = chrono::Duration::from_std(self.settings.default_expiry)
            .unwrap_or_else(|_| chrono::Duration::minutes(30));
        let intent = normalize_intent(&body, amount, method, self.clock.now(), default_ttl)?;

        info!(
            "Created {} intent {} for {} (expires at {})",
            method.as_str(),
            intent.payment_id,
            amount,
            intent.expires_at
        );
        Ok(intent)
    }

    /// Fetches and normalizes the status of a payment.
    ///
    /// A failed request is retried once immediately; a second failure is
    /// reported as [`PollerError::TransientPoll`].
    pub async fn poll_status(&self, payment_id: &str) -> Result<StatusUpdate, PollerError> {
        fetch_status(self.gateway.as_ref(), payment_id).await
    }

    /// Creates an intent and starts watching it.
    pub async fn start(
        &self,
        amount: Decimal,
        method: PaymentMethod,
    ) -> Result<IntentHandle, PollerError> {
        let intent = self.create_intent(amount, method).await?;
        Ok(self.watch(intent))
    }

    /// Spawns the watch loop for an already created intent.
    ///
    /// Must be called from within a tokio runtime.
    pub fn watch(&self, intent: PaymentIntent) -> IntentHandle {
        let session = PaymentSession::new(intent);
        let (tx, rx) = watch::channel(IntentSnapshot::of(&session, self.clock.now(), true));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(self.clone().run_watch(session, tx, cancel.clone()));

        IntentHandle {
            snapshots: rx,
            cancel,
            task,
        }
    }

    async fn run_watch(
        self,
        mut session: PaymentSession,
        tx: watch::Sender<IntentSnapshot>,
        cancel: CancellationToken,
    ) {
        let payment_id = session.intent().payment_id.clone();
        info!(
            "Watching payment {} (poll every {:?})",
            payment_id, self.settings.poll_interval
        );

        let mut poll_tick = interval_at(
            Instant::now() + self.settings.poll_interval,
            self.settings.poll_interval,
        );
        poll_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut clock_tick = interval(self.settings.clock_tick);
        clock_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut in_flight: Option<(PollTicket, BoxFuture<'static, Result<StatusUpdate, PollerError>>)> =
            None;

        let effects = session.start();
        self.apply(effects).await;

        while !session.is_settled() {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Payment {} closed by user", payment_id);
                    session.close();
                }

                outcome = async {
                    match in_flight.as_mut() {
                        Some((_, request)) => request.await,
                        None => std::future::pending().await,
                    }
                }, if in_flight.is_some() => {
                    if let Some((ticket, _)) = in_flight.take() {
                        let effects = session.complete_poll(ticket, outcome, self.clock.now());
                        self.apply(effects).await;
                    }
                }

                _ = clock_tick.tick() => {
                    let effects = session.tick_clock(self.clock.now());
                    self.apply(effects).await;
                }

                _ = poll_tick.tick() => {
                    let now = self.clock.now();
                    let effects = session.tick_clock(now);
                    self.apply(effects).await;

                    match session.begin_poll(now) {
                        Ok(ticket) => {
                            let gateway = Arc::clone(&self.gateway);
                            let id = ticket.payment_id.clone();
                            let request: BoxFuture<'static, _> =
                                Box::pin(async move { fetch_status(gateway.as_ref(), &id).await });
                            in_flight = Some((ticket, request));
                        }
                        Err(PollSkip::InFlight) => {
                            debug!("Poll for payment {} still in flight, skipping tick", payment_id);
                        }
                        Err(skip) => {
                            debug!("Not polling payment {}: {:?}", payment_id, skip);
                        }
                    }
                }
            }

            tx.send_replace(IntentSnapshot::of(&session, self.clock.now(), true));
        }

        // Anything still outstanding is dropped here and can no longer touch the session
        drop(in_flight);
        tx.send_replace(IntentSnapshot::of(&session, self.clock.now(), false));
        info!("Stopped watching payment {} ({})", payment_id, session.intent().status);
    }

    async fn apply(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Reconcile { payment_id, keys } => {
                    self.reconciler.invalidate(&payment_id, &keys).await;
                }
                Effect::Notify(notification) => self.notifier.notify(&notification),
            }
        }
    }
}

/// One status request with a single immediate retry on failure.
async fn fetch_status(
    gateway: &dyn PaymentGateway,
    payment_id: &str,
) -> Result<StatusUpdate, PollerError> {
    let body = match gateway.payment_status(payment_id).await {
        Ok(body) => body,
        Err(first) => {
            debug!("Status request for {} failed, retrying once: {}", payment_id, first);
            gateway
                .payment_status(payment_id)
                .await
                .map_err(|e| PollerError::TransientPoll(e.to_string()))?
        }
    };
    normalize_status_update(&body)
}
