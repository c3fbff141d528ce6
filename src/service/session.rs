//! Payment Session State Machine
//!
//! Tracks one payment intent from creation to terminal resolution.
//!
//! Flow:
//! 1. **Pending**: the intent was created; the poller asks for status at a fixed
//!    cadence while the local clock counts down to `expires_at`.
//! 2. **Approved**: the backend confirmed payment. Account views are invalidated
//!    once, the user is notified once, and the session closes.
//! 3. **Rejected / Expired**: the backend reported failure, or the local clock
//!    passed `expires_at`. The QR payload is cleared and the state stays visible
//!    until the user closes it.
//!
//! The local clock is authoritative for expiry; the backend is authoritative
//! for approval and rejection. The session performs no I/O: every mutation
//! returns the [`Effect`]s the caller must run.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, APPROVAL_INVALIDATIONS};
use crate::error::PollerError;
use crate::intent::{PaymentIntent, PaymentStatus, StatusUpdate};
use crate::notify::Notification;

/// Side effect requested by a state transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Invalidate cached account views for this payment
    Reconcile {
        payment_id: String,
        keys: Vec<CacheKey>,
    },
    /// Tell the user about a terminal outcome
    Notify(Notification),
}

/// Why a poll was not issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollSkip {
    /// The user closed the intent
    Closed,
    /// Status is already terminal
    Terminal,
    /// Local clock is at or past `expires_at`
    Expired,
    /// A previous poll is still outstanding
    InFlight,
}

/// Permission to run one status request, returned by [`PaymentSession::begin_poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTicket {
    pub payment_id: String,
}

/// State of a single payment intent.
#[derive(Debug, Clone)]
pub struct PaymentSession {
    intent: PaymentIntent,
    /// A status request is outstanding
    in_flight: bool,
    /// The user closed the intent, or it was approved and handled
    closed: bool,
    /// `payment_id:status:detail` of the last terminal outcome handled
    last_handled_key: Option<String>,
}

impl PaymentSession {
    pub fn new(intent: PaymentIntent) -> Self {
        Self {
            intent,
            in_flight: false,
            closed: false,
            last_handled_key: None,
        }
    }

    pub fn intent(&self) -> &PaymentIntent {
        &self.intent
    }

    pub fn is_terminal(&self) -> bool {
        self.intent.status.is_terminal()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Whether the poller has anything left to do for this session.
    pub fn is_settled(&self) -> bool {
        self.closed || self.is_terminal()
    }

    /// Time left before `expires_at`, clamped at zero.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.intent.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Runs terminal handling for an intent that was already terminal when created.
    ///
    /// Card payments can settle synchronously, so the creation response may
    /// already be approved or rejected. Must be called once before polling.
    pub fn start(&mut self) -> Vec<Effect> {
        if self.closed || !self.is_terminal() {
            return Vec::new();
        }

        info!(
            "Payment {} was {} at creation",
            self.intent.payment_id, self.intent.status
        );
        self.on_terminal(None)
    }

    /// Advances the local expiry clock.
    ///
    /// Marks the intent expired once `now >= expires_at`, without waiting for
    /// the backend.
    pub fn tick_clock(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        if self.closed || self.is_terminal() || now < self.intent.expires_at {
            return Vec::new();
        }

        info!("Payment {} expired locally", self.intent.payment_id);
        self.intent.status = PaymentStatus::Expired;
        self.on_terminal(None)
    }

    /// Reserves the single in-flight slot for a status request.
    ///
    /// # Returns
    ///
    /// * `Ok(PollTicket)` - Caller may issue exactly one request
    /// * `Err(PollSkip)` - No request must be issued on this tick
    pub fn begin_poll(&mut self, now: DateTime<Utc>) -> Result<PollTicket, PollSkip> {
        if self.closed {
            return Err(PollSkip::Closed);
        }
        if self.is_terminal() {
            return Err(PollSkip::Terminal);
        }
        if now >= self.intent.expires_at {
            return Err(PollSkip::Expired);
        }
        if self.in_flight {
            return Err(PollSkip::InFlight);
        }

        self.in_flight = true;
        Ok(PollTicket {
            payment_id: self.intent.payment_id.clone(),
        })
    }

    /// Applies the outcome of a status request issued under `ticket`.
    ///
    /// Responses arriving after the session closed or became terminal are
    /// discarded, so a terminal status never regresses. A response arriving
    /// at or after `expires_at` expires the intent instead of being applied.
    /// Request failures are logged and otherwise ignored until the next tick.
    pub fn complete_poll(
        &mut self,
        ticket: PollTicket,
        outcome: Result<StatusUpdate, PollerError>,
        now: DateTime<Utc>,
    ) -> Vec<Effect> {
        self.in_flight = false;

        if ticket.payment_id != self.intent.payment_id {
            warn!(
                "Discarding status for {} on session {}",
                ticket.payment_id, self.intent.payment_id
            );
            return Vec::new();
        }

        if self.closed {
            debug!("Discarding late status for closed payment {}", ticket.payment_id);
            return Vec::new();
        }

        if !self.is_terminal() && now >= self.intent.expires_at {
            debug!(
                "Discarding status for payment {} received after expiry",
                ticket.payment_id
            );
            return self.tick_clock(now);
        }

        let update = match outcome {
            Ok(update) => update,
            Err(e) => {
                warn!("Status poll for payment {} failed: {}", ticket.payment_id, e);
                return Vec::new();
            }
        };

        if self.is_terminal() {
            debug!(
                "Ignoring status '{}' for payment {} already {}",
                update.raw_status, ticket.payment_id, self.intent.status
            );
            return Vec::new();
        }

        self.intent.status_detail = update.status_detail.clone();

        if !update.is_terminal() {
            let status = update.resolved_status();
            if let PaymentStatus::Other(raw) = &status {
                debug!("Payment {} reported unmapped status '{}'", ticket.payment_id, raw);
            }
            self.intent.status = status;
            return Vec::new();
        }

        self.intent.status = update.resolved_status();
        info!(
            "Payment {} reached {} (raw: {}, detail: {:?})",
            ticket.payment_id, self.intent.status, update.raw_status, update.status_detail
        );
        self.on_terminal(Some(&update.raw_status))
    }

    /// Closes the session on user request.
    ///
    /// Clears the payload and releases the in-flight slot; any response that
    /// arrives afterwards is discarded.
    pub fn close(&mut self) {
        self.closed = true;
        self.in_flight = false;
        self.intent.clear_payload();
    }

    /// Runs terminal handling at most once per distinct terminal outcome.
    ///
    /// `raw_status` is the backend's own wording, reported to the user on rejection.
    fn on_terminal(&mut self, raw_status: Option<&str>) -> Vec<Effect> {
        let key = format!(
            "{}:{}:{}",
            self.intent.payment_id,
            self.intent.status,
            self.intent.status_detail.as_deref().unwrap_or("")
        );
        if self.last_handled_key.as_deref() == Some(key.as_str()) {
            return Vec::new();
        }
        self.last_handled_key = Some(key);

        let payment_id = self.intent.payment_id.clone();
        match self.intent.status.clone() {
            PaymentStatus::Approved => {
                let effects = vec![
                    Effect::Reconcile {
                        payment_id: payment_id.clone(),
                        keys: APPROVAL_INVALIDATIONS.to_vec(),
                    },
                    Effect::Notify(Notification::Approved {
                        payment_id,
                        amount: self.intent.amount,
                    }),
                ];
                self.close();
                effects
            }
            PaymentStatus::Rejected => {
                self.intent.clear_payload();
                vec![Effect::Notify(Notification::Rejected {
                    payment_id,
                    status: raw_status
                        .map(str::to_string)
                        .unwrap_or_else(|| self.intent.status.to_string()),
                    detail: self.intent.status_detail.clone(),
                })]
            }
            PaymentStatus::Expired => {
                self.intent.clear_payload();
                vec![Effect::Notify(Notification::Expired { payment_id })]
            }
            PaymentStatus::Pending | PaymentStatus::Other(_) => Vec::new(),
        }
    }
}
