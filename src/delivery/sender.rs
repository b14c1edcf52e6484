use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Outbound chat channel.
#[async_trait]
pub trait ChatSender: Send + Sync {
    async fn send_text(&self, recipient_id: i64, text: &str) -> Result<(), SendError>;

    async fn send_photo(&self, recipient_id: i64, image: &str, caption: &str) -> Result<(), SendError>;
}

/// Delivery failure, classified by what the queue should do next.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// Network error, upstream 5xx or rate limit. Retry with backoff.
    #[error("transient delivery failure: {detail}")]
    Transient {
        detail: String,
        retry_after: Option<Duration>,
    },
    /// The attached image could not be fetched or used. Resend as text.
    #[error("image rejected: {0}")]
    Asset(String),
    /// Recipient can never be reached (blocked the bot, deleted account).
    #[error("recipient unreachable: {0}")]
    Permanent(String),
    /// The message itself was refused; resending it would fail the same way.
    #[error("message rejected: {0}")]
    Rejected(String),
}

const PERMANENT_MARKERS: &[&str] = &[
    "bot was blocked by the user",
    "user is deactivated",
    "bot was kicked",
    "chat not found",
    "bot can't initiate conversation",
    "have no rights to send",
];

const ASSET_MARKERS: &[&str] = &[
    "wrong file identifier",
    "failed to get http url content",
    "wrong type of the web page content",
    "image_process_failed",
    "photo_invalid_dimensions",
    "wrong remote file",
    "file is too big",
];

/// Classify a Bot API error response from its error code and description.
pub fn classify_failure(code: u16, description: &str, retry_after_secs: Option<u64>) -> SendError {
    let lower = description.to_ascii_lowercase();
    let detail = if description.is_empty() {
        format!("HTTP {code}")
    } else {
        format!("{code}: {description}")
    };

    if code == 429 {
        return SendError::Transient {
            detail,
            retry_after: retry_after_secs.map(Duration::from_secs),
        };
    }
    if code >= 500 {
        return SendError::Transient { detail, retry_after: None };
    }
    if code == 403 || PERMANENT_MARKERS.iter().any(|m| lower.contains(m)) {
        return SendError::Permanent(detail);
    }
    if ASSET_MARKERS.iter().any(|m| lower.contains(m)) {
        return SendError::Asset(detail);
    }
    if (400..500).contains(&code) {
        return SendError::Rejected(detail);
    }
    SendError::Transient { detail, retry_after: None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_is_transient_with_retry_after() {
        let err = classify_failure(429, "Too Many Requests: retry after 7", Some(7));
        assert_eq!(
            err,
            SendError::Transient {
                detail: "429: Too Many Requests: retry after 7".to_string(),
                retry_after: Some(Duration::from_secs(7)),
            }
        );
    }

    #[test]
    fn server_errors_are_transient() {
        assert!(matches!(classify_failure(502, "Bad Gateway", None), SendError::Transient { .. }));
        assert!(matches!(classify_failure(0, "", None), SendError::Transient { .. }));
    }

    #[test]
    fn blocked_recipients_are_permanent() {
        assert!(matches!(
            classify_failure(403, "Forbidden: bot was blocked by the user", None),
            SendError::Permanent(_)
        ));
        assert!(matches!(
            classify_failure(400, "Bad Request: chat not found", None),
            SendError::Permanent(_)
        ));
    }

    #[test]
    fn photo_errors_are_asset_failures() {
        assert!(matches!(
            classify_failure(400, "Bad Request: failed to get HTTP URL content", None),
            SendError::Asset(_)
        ));
        assert!(matches!(
            classify_failure(400, "Bad Request: wrong type of the web page content", None),
            SendError::Asset(_)
        ));
    }

    #[test]
    fn other_client_errors_are_rejected() {
        assert!(matches!(
            classify_failure(400, "Bad Request: can't parse entities", None),
            SendError::Rejected(_)
        ));
    }
}
