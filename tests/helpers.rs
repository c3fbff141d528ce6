//! Shared test helpers for poller tests
//!
//! This module provides constants, a scripted fake gateway and a recording
//! notifier used by the poller tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use pix_poller::{
    AccountCache, AnchoredClock, Clock, CreateIntentRequest, Notification, Notifier,
    PaymentGateway, PaymentIntent, PaymentMethod, PaymentPoller, PaymentStatus, PollerError,
    PollerSettings,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Dummy payment ID (Mercado Pago style numeric id)
pub const DUMMY_PAYMENT_ID: &str = "1319283741";

/// Dummy PIX copy-paste payload
pub const DUMMY_QR_PAYLOAD: &str =
    "00020126580014br.gov.bcb.pix0136123e4567-e12b-12d1-a456-4266554400005204000053039865802BR5913Fulano de Tal6008BRASILIA62070503***63041D3D";

/// Dummy base64 QR image ("PNG" magic bytes followed by padding)
pub const DUMMY_QR_IMAGE: &str = "iVBORw0KGgo=";

/// Default deposit amount used in tests
pub const DUMMY_AMOUNT: &str = "150.00";

/// Fixed wall-clock anchor for tests (2024-05-01T12:00:00Z)
pub fn test_epoch() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn amount(value: &str) -> Decimal {
    Decimal::from_str(value).unwrap()
}

// ============================================================================
// FAKE GATEWAY
// ============================================================================

/// One scripted reply to a status request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Respond immediately with this body
    Body(Value),
    /// Respond with this body after a delay
    Delayed(Duration, Value),
    /// Fail with a transport-style error
    Fail,
    /// Never respond
    Hang,
}

/// Gateway that plays back scripted status replies.
///
/// When the script runs out every request answers `{"status": "pending"}`.
pub struct FakeGateway {
    create_reply: Mutex<Result<Value, String>>,
    status_script: Mutex<VecDeque<Reply>>,
    pub create_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeGateway {
    pub fn new(status_script: Vec<Reply>) -> Self {
        Self {
            create_reply: Mutex::new(Ok(json!({
                "paymentId": DUMMY_PAYMENT_ID,
                "qrCode": DUMMY_QR_PAYLOAD,
                "status": "pending"
            }))),
            status_script: Mutex::new(status_script.into()),
            create_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Replaces the body returned by intent creation.
    pub fn with_create_reply(self, reply: Result<Value, String>) -> Self {
        *self.create_reply.lock().unwrap() = reply;
        self
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight counter even when the request future is dropped.
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_intent(&self, _request: &CreateIntentRequest) -> Result<Value, PollerError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.create_reply
            .lock()
            .unwrap()
            .clone()
            .map_err(|message| PollerError::Api {
                status: 502,
                message,
            })
    }

    async fn payment_status(&self, _payment_id: &str) -> Result<Value, PollerError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        let reply = self
            .status_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Reply::Body(json!({"status": "pending"})));

        match reply {
            Reply::Body(body) => Ok(body),
            Reply::Delayed(delay, body) => {
                tokio::time::sleep(delay).await;
                Ok(body)
            }
            Reply::Fail => Err(PollerError::Api {
                status: 503,
                message: "service unavailable".to_string(),
            }),
            Reply::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

// ============================================================================
// RECORDING NOTIFIER
// ============================================================================

/// Notifier that records every notification it receives.
#[derive(Default)]
pub struct RecordingNotifier {
    pub received: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn notifications(&self) -> Vec<Notification> {
        self.received.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) {
        self.received.lock().unwrap().push(notification.clone());
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

/// Everything a poller test needs to inspect after the fact.
pub struct Harness {
    pub poller: PaymentPoller,
    pub gateway: Arc<FakeGateway>,
    pub cache: Arc<AccountCache>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<AnchoredClock>,
}

/// Builds a poller with default settings (10s polls, 1s clock tick).
///
/// Must be called inside a tokio runtime with paused time so the anchored
/// clock follows the virtual timeline.
pub fn create_harness(gateway: FakeGateway) -> Harness {
    let gateway = Arc::new(gateway);
    let cache = Arc::new(AccountCache::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let clock = Arc::new(AnchoredClock::new(test_epoch()));

    let poller = PaymentPoller::new(
        gateway.clone(),
        cache.clone(),
        notifier.clone(),
        clock.clone(),
        PollerSettings::default(),
    );

    Harness {
        poller,
        gateway,
        cache,
        notifier,
        clock,
    }
}

/// Creates a pending intent expiring `ttl_secs` after the clock's current time.
pub fn create_pending_intent(clock: &dyn Clock, ttl_secs: i64) -> PaymentIntent {
    let now = clock.now();
    PaymentIntent {
        payment_id: DUMMY_PAYMENT_ID.to_string(),
        qr_payload: Some(DUMMY_QR_PAYLOAD.to_string()),
        qr_image: Some(DUMMY_QR_IMAGE.to_string()),
        expires_at: now + ChronoDuration::seconds(ttl_secs),
        status: PaymentStatus::Pending,
        status_detail: None,
        amount: amount(DUMMY_AMOUNT),
        method: PaymentMethod::Pix,
        created_at: now,
    }
}

/// Builds a status body in the backend's camelCase shape.
pub fn status_body(status: &str) -> Value {
    json!({ "status": status })
}
