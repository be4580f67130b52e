use crate::{errors::ServiceError, services::payments::PaymentEvent, AppState};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Payment provider webhook receiver.
///
/// Returns 200 for every verified delivery, including events the service
/// does not act on, so the provider never retries signals that reached us.
/// Only signature failures and transient infrastructure errors produce
/// non-2xx responses.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Event received"),
        (status = 401, description = "Signature verification failed"),
        (status = 400, description = "Malformed payload")
    ),
    tag = "payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ServiceError> {
    if let Some(secret) = state.config.payment_webhook_secret.as_deref() {
        verify_signature(secret, &headers, &body, state.config.webhook_tolerance_secs())?;
    } else {
        warn!("payment webhook secret not configured, accepting unsigned delivery");
    }

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::BadRequest(format!("Invalid webhook body: {}", e)))?;

    // Best-effort replay dedup. Processing is idempotent anyway, so a
    // missing or unreachable redis only costs duplicate work.
    if let Some(event_id) = payload.get("id").and_then(Value::as_str) {
        if let Some(redis) = state.redis.clone() {
            if already_seen(redis, event_id).await {
                info!(event_id = %event_id, "duplicate webhook delivery, acknowledging");
                return Ok((StatusCode::OK, Json(json!({ "received": true }))));
            }
        }
    }

    let event = PaymentEvent::from_provider_payload(&payload);
    metrics::counter!("payment_webhooks_received_total", 1);
    state.services.payment_events.process(event).await?;

    Ok((StatusCode::OK, Json(json!({ "received": true }))))
}

/// Verifies the delivery signature.
///
/// Two header schemes are accepted: `x-timestamp` + `x-signature` (hex HMAC
/// over `"{timestamp}.{body}"`), and a `Stripe-Signature` style header
/// carrying `t=<ts>,v1=<hex>` pairs. Timestamps outside the tolerance
/// window are rejected to bound replay.
fn verify_signature(
    secret: &str,
    headers: &HeaderMap,
    body: &[u8],
    tolerance_secs: i64,
) -> Result<(), ServiceError> {
    let (timestamp, signature) = extract_signature(headers)
        .ok_or_else(|| ServiceError::Unauthorized("Missing webhook signature".to_string()))?;

    let ts: i64 = timestamp
        .parse()
        .map_err(|_| ServiceError::Unauthorized("Invalid webhook timestamp".to_string()))?;
    if (Utc::now().timestamp() - ts).abs() > tolerance_secs {
        return Err(ServiceError::Unauthorized(
            "Webhook timestamp outside tolerance".to_string(),
        ));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| ServiceError::InternalError("Invalid webhook secret".to_string()))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    if !constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
        metrics::counter!("payment_webhooks_rejected_total", 1);
        return Err(ServiceError::Unauthorized(
            "Webhook signature mismatch".to_string(),
        ));
    }
    Ok(())
}

/// Pulls `(timestamp, hex_signature)` from whichever header scheme the
/// sender used.
fn extract_signature(headers: &HeaderMap) -> Option<(String, String)> {
    if let (Some(ts), Some(sig)) = (headers.get("x-timestamp"), headers.get("x-signature")) {
        return Some((ts.to_str().ok()?.to_string(), sig.to_str().ok()?.to_string()));
    }

    let header = headers.get("stripe-signature")?.to_str().ok()?;
    let mut timestamp = None;
    let mut signature = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = Some(v.to_string()),
            Some(("v1", v)) => signature = Some(v.to_string()),
            _ => {}
        }
    }
    Some((timestamp?, signature?))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Records the event id in redis with a 24h TTL; returns true when the id
/// was already present.
async fn already_seen(mut redis: redis::aio::ConnectionManager, event_id: &str) -> bool {
    let key = format!("webhook:seen:{}", event_id);
    let result: Result<bool, redis::RedisError> = redis::cmd("SET")
        .arg(&key)
        .arg(1)
        .arg("NX")
        .arg("EX")
        .arg(86_400)
        .query_async(&mut redis)
        .await;

    match result {
        Ok(newly_set) => !newly_set,
        Err(e) => {
            warn!(error = %e, "webhook dedup check failed, processing anyway");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn signed_headers(secret: &str, timestamp: i64, body: &[u8]) -> HeaderMap {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        let sig = hex::encode(mac.finalize().into_bytes());

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-timestamp",
            HeaderValue::from_str(&timestamp.to_string()).unwrap(),
        );
        headers.insert("x-signature", HeaderValue::from_str(&sig).unwrap());
        headers
    }

    #[test]
    fn accepts_valid_signature() {
        let body = br#"{"type":"checkout.session.completed"}"#;
        let headers = signed_headers("whsec_test", Utc::now().timestamp(), body);
        assert!(verify_signature("whsec_test", &headers, body, 300).is_ok());
    }

    #[test]
    fn rejects_wrong_secret() {
        let body = b"{}";
        let headers = signed_headers("whsec_test", Utc::now().timestamp(), body);
        assert!(verify_signature("whsec_other", &headers, body, 300).is_err());
    }

    #[test]
    fn rejects_tampered_body() {
        let headers = signed_headers("whsec_test", Utc::now().timestamp(), b"{}");
        assert!(verify_signature("whsec_test", &headers, b"{\"x\":1}", 300).is_err());
    }

    #[test]
    fn rejects_stale_timestamp() {
        let body = b"{}";
        let stale = Utc::now().timestamp() - 3600;
        let headers = signed_headers("whsec_test", stale, body);
        assert!(verify_signature("whsec_test", &headers, body, 300).is_err());
    }

    #[test]
    fn rejects_missing_headers() {
        assert!(verify_signature("whsec_test", &HeaderMap::new(), b"{}", 300).is_err());
    }

    #[test]
    fn accepts_stripe_style_header() {
        let body = b"{}";
        let ts = Utc::now().timestamp();
        let mut mac = HmacSha256::new_from_slice(b"whsec_test").unwrap();
        mac.update(ts.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        let sig = hex::encode(mac.finalize().into_bytes());

        let mut headers = HeaderMap::new();
        headers.insert(
            "stripe-signature",
            HeaderValue::from_str(&format!("t={},v1={}", ts, sig)).unwrap(),
        );
        assert!(verify_signature("whsec_test", &headers, body, 300).is_ok());
    }

    #[test]
    fn constant_time_eq_basics() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
