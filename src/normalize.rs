//! Backend Response Normalization
//!
//! The wallet backend (and the provider behind it) is not consistent about
//! field names: the same logical field may arrive as `paymentId`,
//! `PaymentId` or `payment_id`, responses may or may not be wrapped in a
//! `{success, data, error}` envelope, and Mercado Pago nests the QR data
//! under `point_of_interaction.transaction_data`. Everything here converts
//! those payloads into [`PaymentIntent`] and [`StatusUpdate`].

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::error::PollerError;
use crate::intent::{PaymentIntent, PaymentMethod, PaymentStatus, StatusUpdate};

// ============================================================================
// FIELD ALIASES
// ============================================================================

const PAYMENT_ID_KEYS: &[&str] = &["paymentId", "PaymentId", "payment_id", "id", "Id"];
const QR_PAYLOAD_KEYS: &[&str] = &[
    "qrPayload",
    "QrPayload",
    "qr_payload",
    "qrCode",
    "QrCode",
    "qr_code",
    "pixCopyPaste",
    "copyPaste",
    "copy_paste",
];
const QR_IMAGE_KEYS: &[&str] = &[
    "qrImage",
    "QrImage",
    "qr_image",
    "qrCodeBase64",
    "QrCodeBase64",
    "qr_code_base64",
];
const EXPIRES_AT_KEYS: &[&str] = &[
    "expiresAt",
    "ExpiresAt",
    "expires_at",
    "expiration",
    "dateOfExpiration",
    "date_of_expiration",
];
const STATUS_KEYS: &[&str] = &["status", "Status"];
const STATUS_DETAIL_KEYS: &[&str] = &["statusDetail", "StatusDetail", "status_detail"];
const IS_FINAL_KEYS: &[&str] = &["isFinal", "IsFinal", "is_final", "final"];

// ============================================================================
// STATUS VOCABULARY
// ============================================================================

/// Maps provider status vocabulary onto the closed status set.
///
/// Matching ignores case and surrounding whitespace. Unmapped values are
/// passed through unchanged as [`PaymentStatus::Other`].
pub fn normalize_status(raw: &str) -> PaymentStatus {
    match raw.trim().to_ascii_lowercase().as_str() {
        "approved" | "authorized" | "paid" | "completed" => PaymentStatus::Approved,
        "pending" | "in_process" => PaymentStatus::Pending,
        "rejected" | "refunded" | "cancelled" | "cancelled_by_user" | "failed" => {
            PaymentStatus::Rejected
        }
        "expired" => PaymentStatus::Expired,
        _ => PaymentStatus::Other(raw.to_string()),
    }
}

// ============================================================================
// INTENT CREATION
// ============================================================================

/// Builds a [`PaymentIntent`] from a create-intent response.
///
/// # Arguments
///
/// * `body` - Raw JSON returned by the backend
/// * `amount` - Amount the user requested (kept for display, never re-read from the backend)
/// * `method` - Requested payment method
/// * `now` - Creation time
/// * `default_ttl` - Expiry window applied when the backend omits `expiresAt`
///
/// # Returns
///
/// * `Ok(PaymentIntent)` - Intent with a payable QR payload and/or image
/// * `Err(PollerError::IntentCreation)` - Envelope error, missing id, or nothing payable
pub fn normalize_intent(
    body: &Value,
    amount: Decimal,
    method: PaymentMethod,
    now: DateTime<Utc>,
    default_ttl: Duration,
) -> Result<PaymentIntent, PollerError> {
    let body = unwrap_envelope(body).map_err(PollerError::IntentCreation)?;

    let payment_id = pick_string(body, PAYMENT_ID_KEYS)
        .ok_or_else(|| PollerError::IntentCreation("response has no payment id".to_string()))?;

    let transaction_data = body
        .get("point_of_interaction")
        .and_then(|p| p.get("transaction_data"));

    let qr_payload = pick_string(body, QR_PAYLOAD_KEYS)
        .or_else(|| transaction_data.and_then(|t| pick_string(t, QR_PAYLOAD_KEYS)))
        .filter(|s| !s.trim().is_empty());

    let qr_image = pick_string(body, QR_IMAGE_KEYS)
        .or_else(|| transaction_data.and_then(|t| pick_string(t, QR_IMAGE_KEYS)))
        .map(|img| strip_data_uri(&img).to_string())
        .filter(|img| !img.is_empty() && STANDARD.decode(img).is_ok());

    if qr_payload.is_none() && qr_image.is_none() {
        return Err(PollerError::IntentCreation(format!(
            "payment {} has no usable QR payload or image",
            payment_id
        )));
    }

    let expires_at = pick(body, EXPIRES_AT_KEYS)
        .or_else(|| transaction_data.and_then(|t| pick(t, EXPIRES_AT_KEYS)))
        .and_then(parse_timestamp)
        .unwrap_or(now + default_ttl);

    let status = pick_string(body, STATUS_KEYS)
        .map(|s| normalize_status(&s))
        .unwrap_or(PaymentStatus::Pending);

    Ok(PaymentIntent {
        payment_id,
        qr_payload,
        qr_image,
        expires_at,
        status,
        status_detail: pick_string(body, STATUS_DETAIL_KEYS),
        amount,
        method,
        created_at: now,
    })
}

// ============================================================================
// STATUS POLLING
// ============================================================================

/// Builds a [`StatusUpdate`] from a status endpoint response.
///
/// `isFinal` is optional; terminality can always be derived from the status
/// and detail alone.
pub fn normalize_status_update(body: &Value) -> Result<StatusUpdate, PollerError> {
    let body = unwrap_envelope(body).map_err(PollerError::Malformed)?;

    let raw_status = pick_string(body, STATUS_KEYS)
        .ok_or_else(|| PollerError::Malformed("status response has no status field".to_string()))?;

    let is_final = pick(body, IS_FINAL_KEYS).and_then(|v| match v {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.parse::<bool>().ok(),
        _ => None,
    });

    Ok(StatusUpdate {
        status: normalize_status(&raw_status),
        raw_status,
        status_detail: pick_string(body, STATUS_DETAIL_KEYS),
        is_final,
    })
}

// ============================================================================
// HELPERS
// ============================================================================

/// Unwraps a `{success, data, error}` envelope if present.
fn unwrap_envelope(body: &Value) -> Result<&Value, String> {
    let Some(success) = body.get("success").and_then(Value::as_bool) else {
        return Ok(body);
    };
    if !success {
        return Err(body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error")
            .to_string());
    }
    match body.get("data") {
        Some(data) if data.is_object() => Ok(data),
        _ => Err("successful response without data".to_string()),
    }
}

fn pick<'a>(body: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| body.get(*k))
        .find(|v| !v.is_null())
}

/// Like [`pick`], but also accepts numbers (payment ids are often numeric).
fn pick_string(body: &Value, keys: &[&str]) -> Option<String> {
    pick(body, keys).and_then(|v| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn strip_data_uri(image: &str) -> &str {
    match image.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => image.trim(),
    }
}

/// Accepts RFC 3339 strings or unix timestamps in seconds or milliseconds.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok(),
        Value::Number(n) => {
            let raw = n.as_i64()?;
            // Anything past year 2286 in seconds is really milliseconds
            if raw > 9_999_999_999 {
                Utc.timestamp_millis_opt(raw).single()
            } else {
                Utc.timestamp_opt(raw, 0).single()
            }
        }
        _ => None,
    }
}
