//! Payment intent data model
//!
//! Client-side projection of a deposit the backend is processing. The poller
//! only ever sees these canonical shapes; backend payloads are converted in
//! [`crate::normalize`].

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payment method requested for a deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Pix,
    Card,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Pix => "pix",
            PaymentMethod::Card => "card",
        }
    }
}

/// Normalized payment status.
///
/// Unknown provider vocabulary is kept verbatim in `Other` and treated as
/// non-terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
    Other(String),
}

impl PaymentStatus {
    /// Returns true for approved, rejected and expired
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Approved | PaymentStatus::Rejected | PaymentStatus::Expired
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Rejected => "rejected",
            PaymentStatus::Expired => "expired",
            PaymentStatus::Other(raw) => raw,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A deposit intent as tracked by the poller.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentIntent {
    /// Opaque provider identifier
    pub payment_id: String,
    /// PIX copy-paste code
    pub qr_payload: Option<String>,
    /// Pre-rendered QR code (base64 PNG, without any data URI prefix)
    pub qr_image: Option<String>,
    /// Absolute expiry; never changes after creation
    pub expires_at: DateTime<Utc>,
    /// Current normalized status
    pub status: PaymentStatus,
    /// Last provider status detail seen
    pub status_detail: Option<String>,
    /// Amount requested at creation time
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub created_at: DateTime<Utc>,
}

impl PaymentIntent {
    /// Whether the intent still carries something the user can pay with.
    pub fn is_payable(&self) -> bool {
        self.qr_payload.is_some() || self.qr_image.is_some()
    }

    /// Decodes the pre-rendered QR image into PNG bytes.
    ///
    /// Returns `None` when no image was supplied or it has been cleared.
    pub fn qr_image_png(&self) -> Option<Result<Vec<u8>, base64::DecodeError>> {
        self.qr_image.as_ref().map(|img| STANDARD.decode(img))
    }

    /// Drops the QR payload and image so a dead code cannot be paid.
    pub(crate) fn clear_payload(&mut self) {
        self.qr_payload = None;
        self.qr_image = None;
    }
}

/// Result of a single status poll, already normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    /// Normalized status
    pub status: PaymentStatus,
    /// Status string exactly as the backend sent it
    pub raw_status: String,
    /// Provider status detail, e.g. "cc_rejected_insufficient_amount"
    pub status_detail: Option<String>,
    /// Explicit finality flag, when the backend provides one
    pub is_final: Option<bool>,
}

impl StatusUpdate {
    /// Whether this response ends the intent.
    ///
    /// Some providers report detail codes ahead of the primary status, so the
    /// detail is checked independently of `status` and `is_final`.
    pub fn is_terminal(&self) -> bool {
        self.is_final == Some(true)
            || self.status.is_terminal()
            || detail_signals_expiry(self.status_detail.as_deref())
            || detail_signals_rejection(self.status_detail.as_deref())
    }

    /// Status the session should adopt for this response.
    pub fn resolved_status(&self) -> PaymentStatus {
        if self.status.is_terminal() {
            return self.status.clone();
        }
        let detail = self.status_detail.as_deref();
        if detail_signals_expiry(detail) {
            PaymentStatus::Expired
        } else if detail_signals_rejection(detail) {
            PaymentStatus::Rejected
        } else if self.is_final == Some(true) {
            // Final without an approval
            PaymentStatus::Rejected
        } else {
            self.status.clone()
        }
    }
}

fn detail_signals_expiry(detail: Option<&str>) -> bool {
    detail
        .map(|d| d.to_ascii_lowercase().contains("expired"))
        .unwrap_or(false)
}

fn detail_signals_rejection(detail: Option<&str>) -> bool {
    detail
        .map(|d| {
            let d = d.to_ascii_lowercase();
            d.starts_with("cc_rejected") || d.starts_with("rejected") || d.contains("cancel")
        })
        .unwrap_or(false)
}
