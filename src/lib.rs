//! Deposit intent poller
//!
//! Creates PIX/card payment intents against the wallet backend, tracks their
//! status until approval, rejection or expiry, and reconciles approvals into
//! cached account views.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod intent;
pub mod normalize;
pub mod notify;
pub mod service;
pub mod wallet_client;

// Re-export public types for convenience
pub use cache::{AccountCache, CacheKey, Reconciler, APPROVAL_INVALIDATIONS};
pub use clock::{AnchoredClock, Clock, SystemClock};
pub use config::{PollerConfig, PollingConfig, ServiceConfig};
pub use error::PollerError;
pub use intent::{PaymentIntent, PaymentMethod, PaymentStatus, StatusUpdate};
pub use normalize::{normalize_intent, normalize_status, normalize_status_update};
pub use notify::{Notification, Notifier, TracingNotifier};
pub use service::poller::{IntentHandle, IntentSnapshot, PaymentPoller, PollerSettings};
pub use service::session::{Effect, PaymentSession, PollSkip, PollTicket};
pub use wallet_client::{CreateIntentRequest, PaymentGateway, WalletClient};
