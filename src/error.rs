//! Error types

use rust_decimal::Decimal;
use thiserror::Error;

/// Failures surfaced by the poller and the wallet backend client.
///
/// All of these are scoped to a single intent. None is retried by creating a
/// new intent automatically; the user always re-initiates.
#[derive(Error, Debug)]
pub enum PollerError {
    #[error("Amount {amount} is below the minimum of {minimum}")]
    InvalidAmount { amount: Decimal, minimum: Decimal },

    #[error("Intent creation failed: {0}")]
    IntentCreation(String),

    #[error("Status poll failed: {0}")]
    TransientPoll(String),

    #[error("Payment {payment_id} was rejected (status: {status}{})", detail_suffix(.detail))]
    TerminalRejection {
        payment_id: String,
        status: String,
        detail: Option<String>,
    },

    #[error("Payment {payment_id} expired before confirmation")]
    LocalExpiry { payment_id: String },

    #[error("Payment {payment_id} was closed before reaching a terminal status")]
    Cancelled { payment_id: String },

    #[error("Wallet backend returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed backend response: {0}")]
    Malformed(String),
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(d) => format!(", detail: {}", d),
        None => String::new(),
    }
}
