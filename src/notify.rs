//! User-facing notifications for terminal payment outcomes

use rust_decimal::Decimal;
use tracing::{info, warn};

/// A terminal outcome the user should be told about, at most once per intent.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Approved {
        payment_id: String,
        amount: Decimal,
    },
    Rejected {
        payment_id: String,
        status: String,
        detail: Option<String>,
    },
    Expired {
        payment_id: String,
    },
}

impl Notification {
    pub fn payment_id(&self) -> &str {
        match self {
            Notification::Approved { payment_id, .. }
            | Notification::Rejected { payment_id, .. }
            | Notification::Expired { payment_id } => payment_id,
        }
    }
}

/// Delivers notifications to the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: &Notification) {
        match notification {
            Notification::Approved { payment_id, amount } => {
                info!("Deposit of {} confirmed (payment {})", amount, payment_id);
            }
            Notification::Rejected {
                payment_id,
                status,
                detail,
            } => {
                warn!(
                    "Payment {} was not completed: {} ({})",
                    payment_id,
                    status,
                    detail.as_deref().unwrap_or("no detail")
                );
            }
            Notification::Expired { payment_id } => {
                warn!("Payment {} expired, generate a new code to retry", payment_id);
            }
        }
    }
}
