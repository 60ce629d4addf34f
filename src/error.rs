//! Error classification for every call into the completion service.
//!
//! Any failure (an HTTP error envelope, a transport error, or a bare message)
//! is normalized into a [`FailureSignal`] and mapped onto a fixed
//! [`ErrorKind`] taxonomy. Retry and display decisions key off the kind
//! only, never off the raw upstream error shape.
//!
//! # Classification order
//!
//! 1. HTTP status: `401` → authentication, `429` → rate limit,
//!    `402` → quota, `5xx` → server error.
//! 2. Keywords in the lower-cased message, code, and type fields.
//! 3. Remaining client statuses (`400`, `404`, `422`) → invalid request.
//! 4. Anything else → unknown.
//!
//! # Retry and fallback tables
//!
//! | Kind | Retryable | Fallback |
//! |------|-----------|----------|
//! | `authentication` | no | no |
//! | `rate_limit` | yes | yes |
//! | `quota` | no | no |
//! | `invalid_request` | no | no |
//! | `context_length_exceeded` | no | yes |
//! | `server_error` | yes | yes |
//! | `timeout` | yes | yes |
//! | `network` | yes | no |
//! | `unknown` | no | no |

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Normalized category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authentication,
    RateLimit,
    Quota,
    InvalidRequest,
    ContextLengthExceeded,
    ServerError,
    Timeout,
    Network,
    Unknown,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 9] = [
        ErrorKind::Authentication,
        ErrorKind::RateLimit,
        ErrorKind::Quota,
        ErrorKind::InvalidRequest,
        ErrorKind::ContextLengthExceeded,
        ErrorKind::ServerError,
        ErrorKind::Timeout,
        ErrorKind::Network,
        ErrorKind::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Authentication => "authentication",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Quota => "quota",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::ContextLengthExceeded => "context_length_exceeded",
            ErrorKind::ServerError => "server_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Network => "network",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Whether another attempt can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimit | ErrorKind::ServerError | ErrorKind::Timeout | ErrorKind::Network
        )
    }

    /// Whether the caller may degrade to an alternative (another model,
    /// a truncated prompt) instead of failing outright.
    pub fn has_fallback(&self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimit
                | ErrorKind::ContextLengthExceeded
                | ErrorKind::ServerError
                | ErrorKind::Timeout
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Language used for user-facing error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Es,
}

/// Localized message shown to end users for a given kind.
pub fn user_message(kind: ErrorKind, locale: Locale) -> &'static str {
    match (locale, kind) {
        (Locale::En, ErrorKind::Authentication) => {
            "The AI service rejected our credentials. Please contact support."
        }
        (Locale::En, ErrorKind::RateLimit) => {
            "The AI service is busy right now. Please try again in a moment."
        }
        (Locale::En, ErrorKind::Quota) => {
            "The AI usage quota has been reached. Please try again later or upgrade your plan."
        }
        (Locale::En, ErrorKind::InvalidRequest) => {
            "The request could not be processed. Please check the document and try again."
        }
        (Locale::En, ErrorKind::ContextLengthExceeded) => {
            "This content is too long to process at once. Try a shorter document or section."
        }
        (Locale::En, ErrorKind::ServerError) => {
            "The AI service is having problems. Please try again shortly."
        }
        (Locale::En, ErrorKind::Timeout) => "The request took too long. Please try again.",
        (Locale::En, ErrorKind::Network) => {
            "We could not reach the service. Check your connection and try again."
        }
        (Locale::En, ErrorKind::Unknown) => "Something went wrong. Please try again.",
        (Locale::Es, ErrorKind::Authentication) => {
            "El servicio de IA rechazó nuestras credenciales. Contacta con soporte."
        }
        (Locale::Es, ErrorKind::RateLimit) => {
            "El servicio de IA está saturado. Inténtalo de nuevo en unos instantes."
        }
        (Locale::Es, ErrorKind::Quota) => {
            "Se alcanzó el límite de uso de IA. Inténtalo más tarde o mejora tu plan."
        }
        (Locale::Es, ErrorKind::InvalidRequest) => {
            "No se pudo procesar la solicitud. Revisa el documento e inténtalo de nuevo."
        }
        (Locale::Es, ErrorKind::ContextLengthExceeded) => {
            "El contenido es demasiado largo para procesarlo de una vez. Prueba con un documento o sección más corto."
        }
        (Locale::Es, ErrorKind::ServerError) => {
            "El servicio de IA tiene problemas. Inténtalo de nuevo en breve."
        }
        (Locale::Es, ErrorKind::Timeout) => {
            "La solicitud tardó demasiado. Inténtalo de nuevo."
        }
        (Locale::Es, ErrorKind::Network) => {
            "No pudimos conectar con el servicio. Revisa tu conexión e inténtalo de nuevo."
        }
        (Locale::Es, ErrorKind::Unknown) => "Algo salió mal. Inténtalo de nuevo.",
    }
}

/// Non-2xx response from an HTTP API, parsed from its error envelope.
///
/// Returned (inside `anyhow::Error`) by the completion and notification
/// clients so the classifier can see the status code and the upstream
/// `code`/`type` fields.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{service} API error {status}: {message}")]
pub struct ApiError {
    pub service: String,
    pub status: u16,
    pub message: String,
    pub code: Option<String>,
    pub error_type: Option<String>,
}

impl ApiError {
    /// Build from a response body, reading an OpenAI-style
    /// `{"error": {"message", "type", "code"}}` envelope when present.
    pub fn from_body(service: &str, status: u16, body: &str) -> Self {
        let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
        let envelope = parsed.as_ref().and_then(|v| v.get("error"));

        let field = |name: &str| -> Option<String> {
            envelope
                .and_then(|e| e.get(name))
                .and_then(|v| match v {
                    serde_json::Value::String(s) => Some(s.clone()),
                    serde_json::Value::Null => None,
                    other => Some(other.to_string()),
                })
        };

        let message = field("message")
            .or_else(|| envelope.and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or_else(|| body.chars().take(500).collect());

        Self {
            service: service.to_string(),
            status,
            message,
            code: field("code"),
            error_type: field("type"),
        }
    }
}

/// Normalized, shape-independent view of a failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureSignal {
    pub status: Option<u16>,
    pub message: String,
    pub code: Option<String>,
    pub error_type: Option<String>,
}

impl FailureSignal {
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Inspect an error chain for the richest available signal.
    ///
    /// Only the root cause's message is kept. Outer context layers carry
    /// caller data such as filenames and never influence the kind.
    pub fn from_error(err: &anyhow::Error) -> Self {
        let mut signal = FailureSignal::from_message(err.root_cause().to_string());

        for cause in err.chain() {
            if let Some(api) = cause.downcast_ref::<ApiError>() {
                signal.message = api.message.clone();
                signal.status = Some(api.status);
                signal.code = api.code.clone();
                signal.error_type = api.error_type.clone();
                return signal;
            }
            if let Some(http) = cause.downcast_ref::<reqwest::Error>() {
                if let Some(status) = http.status() {
                    signal.status = Some(status.as_u16());
                }
                if http.is_timeout() {
                    signal.error_type = Some("timeout".to_string());
                } else if http.is_connect() || http.is_request() {
                    signal.error_type = Some("network".to_string());
                }
                return signal;
            }
        }

        signal
    }

    fn haystack(&self) -> String {
        let mut s = self.message.to_lowercase();
        for extra in [&self.code, &self.error_type].into_iter().flatten() {
            s.push(' ');
            s.push_str(&extra.to_lowercase());
        }
        s
    }
}

const AUTH_KEYWORDS: &[&str] = &[
    "unauthorized",
    "authentication",
    "invalid api key",
    "invalid_api_key",
    "incorrect api key",
    "api key not valid",
    "permission denied",
];
const RATE_LIMIT_KEYWORDS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "ratelimit",
    "too many requests",
    "resource_exhausted",
];
const QUOTA_KEYWORDS: &[&str] = &[
    "quota",
    "insufficient_quota",
    "billing",
    "credit balance",
    "payment required",
];
const CONTEXT_LENGTH_KEYWORDS: &[&str] = &[
    "context_length_exceeded",
    "context length",
    "maximum context",
    "context window",
    "too many tokens",
    "token limit",
];
const SERVER_KEYWORDS: &[&str] = &[
    "internal server error",
    "server_error",
    "server error",
    "bad gateway",
    "service unavailable",
    "overloaded",
];
const TIMEOUT_KEYWORDS: &[&str] = &["timeout", "timed out", "deadline exceeded"];
const NETWORK_KEYWORDS: &[&str] = &[
    "network",
    "connection refused",
    "connection reset",
    "connection closed",
    "dns error",
    "failed to lookup address",
    "econnreset",
    "econnrefused",
    "fetch failed",
];

/// Map a failure onto exactly one [`ErrorKind`]. Pure and total.
pub fn classify(signal: &FailureSignal) -> ErrorKind {
    match signal.status {
        Some(401) => return ErrorKind::Authentication,
        Some(429) => return ErrorKind::RateLimit,
        Some(402) => return ErrorKind::Quota,
        Some(s) if (500..600).contains(&s) => return ErrorKind::ServerError,
        _ => {}
    }

    let haystack = signal.haystack();
    let has = |keywords: &[&str]| keywords.iter().any(|k| haystack.contains(k));

    if has(AUTH_KEYWORDS) {
        ErrorKind::Authentication
    } else if has(RATE_LIMIT_KEYWORDS) {
        ErrorKind::RateLimit
    } else if has(QUOTA_KEYWORDS) {
        ErrorKind::Quota
    } else if has(CONTEXT_LENGTH_KEYWORDS) {
        ErrorKind::ContextLengthExceeded
    } else if has(SERVER_KEYWORDS) {
        ErrorKind::ServerError
    } else if has(TIMEOUT_KEYWORDS) {
        ErrorKind::Timeout
    } else if has(NETWORK_KEYWORDS) {
        ErrorKind::Network
    } else if matches!(signal.status, Some(400 | 404 | 422)) {
        ErrorKind::InvalidRequest
    } else {
        ErrorKind::Unknown
    }
}

/// Identifiers attached to a structured error for logging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorContext {
    pub user_id: Option<String>,
    pub document_id: Option<String>,
    pub job_id: Option<String>,
    pub extra: BTreeMap<String, String>,
}

impl ErrorContext {
    pub fn for_document(user_id: &str, document_id: &str) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            document_id: Some(document_id.to_string()),
            ..Self::default()
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }
}

/// A classified failure, ready for logging and display.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct StructuredError {
    pub kind: ErrorKind,
    /// Full message for logs, context layers included.
    pub message: String,
    /// The classified message: root cause or API error text.
    pub cause: String,
    pub user_message: String,
    pub retryable: bool,
    pub fallback_available: bool,
    pub context: ErrorContext,
    /// Shared handle to the failure this was derived from.
    pub original: Option<Arc<anyhow::Error>>,
}

impl StructuredError {
    /// Build from a bare signal (no original error object).
    pub fn from_signal(signal: &FailureSignal, context: ErrorContext, locale: Locale) -> Self {
        let kind = classify(signal);
        Self {
            kind,
            message: signal.message.clone(),
            cause: signal.message.clone(),
            user_message: user_message(kind, locale).to_string(),
            retryable: kind.is_retryable(),
            fallback_available: kind.has_fallback(),
            context,
            original: None,
        }
    }
}

/// Classify `err` and attach context.
pub fn structure(err: anyhow::Error, context: ErrorContext, locale: Locale) -> StructuredError {
    let mut structured = structure_ref(&err, context, locale);
    structured.original = Some(Arc::new(err));
    structured
}

/// Classify a borrowed error without taking ownership of it.
pub fn structure_ref(err: &anyhow::Error, context: ErrorContext, locale: Locale) -> StructuredError {
    let mut structured = StructuredError::from_signal(&FailureSignal::from_error(err), context, locale);
    structured.message = format!("{:#}", err);
    structured
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_take_priority() {
        let sig = FailureSignal::from_message("request timed out").with_status(401);
        assert_eq!(classify(&sig), ErrorKind::Authentication);
        let sig = FailureSignal::from_message("whatever").with_status(429);
        assert_eq!(classify(&sig), ErrorKind::RateLimit);
        let sig = FailureSignal::from_message("whatever").with_status(402);
        assert_eq!(classify(&sig), ErrorKind::Quota);
        for status in [500, 502, 503, 504] {
            let sig = FailureSignal::from_message("oops").with_status(status);
            assert_eq!(classify(&sig), ErrorKind::ServerError);
        }
    }

    #[test]
    fn keywords_classify_without_status() {
        let cases = [
            ("Invalid API key provided", ErrorKind::Authentication),
            ("Rate limit reached for requests", ErrorKind::RateLimit),
            ("You exceeded your current quota", ErrorKind::Quota),
            (
                "This model's maximum context length is 8192 tokens",
                ErrorKind::ContextLengthExceeded,
            ),
            ("The engine is currently overloaded", ErrorKind::ServerError),
            ("operation timed out", ErrorKind::Timeout),
            ("Connection refused (os error 111)", ErrorKind::Network),
            ("the moon is made of cheese", ErrorKind::Unknown),
        ];
        for (msg, expected) in cases {
            assert_eq!(
                classify(&FailureSignal::from_message(msg)),
                expected,
                "message: {}",
                msg
            );
        }
    }

    #[test]
    fn code_field_is_inspected() {
        let sig = FailureSignal {
            status: Some(400),
            message: "bad".to_string(),
            code: Some("context_length_exceeded".to_string()),
            error_type: Some("invalid_request_error".to_string()),
        };
        assert_eq!(classify(&sig), ErrorKind::ContextLengthExceeded);
    }

    #[test]
    fn plain_client_errors_are_invalid_requests() {
        let sig = FailureSignal::from_message("missing field `messages`").with_status(400);
        assert_eq!(classify(&sig), ErrorKind::InvalidRequest);
        let sig = FailureSignal::from_message("no such model").with_status(404);
        assert_eq!(classify(&sig), ErrorKind::InvalidRequest);
    }

    #[test]
    fn classification_is_deterministic() {
        let sig = FailureSignal::from_message("Too Many Requests");
        let first = classify(&sig);
        for _ in 0..10 {
            assert_eq!(classify(&sig.clone()), first);
        }
    }

    #[test]
    fn auth_and_quota_never_retry_or_fall_back() {
        for kind in [ErrorKind::Authentication, ErrorKind::Quota] {
            assert!(!kind.is_retryable());
            assert!(!kind.has_fallback());
        }
    }

    #[test]
    fn transient_kinds_are_retryable() {
        for kind in [
            ErrorKind::RateLimit,
            ErrorKind::ServerError,
            ErrorKind::Timeout,
            ErrorKind::Network,
        ] {
            assert!(kind.is_retryable(), "{} should retry", kind);
        }
        assert!(!ErrorKind::Unknown.is_retryable());
        assert!(!ErrorKind::InvalidRequest.is_retryable());
        assert!(!ErrorKind::ContextLengthExceeded.is_retryable());
    }

    #[test]
    fn every_kind_has_messages_in_every_locale() {
        for kind in ErrorKind::ALL {
            assert!(!user_message(kind, Locale::En).is_empty());
            assert!(!user_message(kind, Locale::Es).is_empty());
            assert_ne!(user_message(kind, Locale::En), user_message(kind, Locale::Es));
        }
    }

    #[test]
    fn api_error_envelope_is_parsed() {
        let body = r#"{"error":{"message":"Rate limit reached","type":"requests","code":"rate_limit_exceeded"}}"#;
        let api = ApiError::from_body("completion", 429, body);
        assert_eq!(api.message, "Rate limit reached");
        assert_eq!(api.code.as_deref(), Some("rate_limit_exceeded"));
        assert_eq!(api.error_type.as_deref(), Some("requests"));

        let plain = ApiError::from_body("completion", 502, "<html>bad gateway</html>");
        assert_eq!(plain.message, "<html>bad gateway</html>");
        assert!(plain.code.is_none());
    }

    #[test]
    fn structure_reads_api_error_through_context() {
        let api = ApiError::from_body("completion", 401, r#"{"error":{"message":"nope"}}"#);
        let err = anyhow::Error::new(api).context("calling completion service");
        let ctx = ErrorContext::for_document("u1", "d1").with("stage", "generation");
        let structured = structure(err, ctx.clone(), Locale::Es);
        assert_eq!(structured.kind, ErrorKind::Authentication);
        assert!(!structured.retryable);
        assert!(!structured.fallback_available);
        assert_eq!(structured.context, ctx);
        assert_eq!(
            structured.user_message,
            user_message(ErrorKind::Authentication, Locale::Es)
        );
        assert!(structured.original.is_some());
    }

    #[test]
    fn context_layers_do_not_change_the_kind() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory");
        let err = anyhow::Error::new(io)
            .context("Failed to read uploads/Computer Networks.pdf")
            .context("Failed to acquire text for Computer Networks.pdf");

        let signal = FailureSignal::from_error(&err);
        assert_eq!(signal.message, "No such file or directory");

        let structured = structure_ref(&err, ErrorContext::default(), Locale::En);
        assert_eq!(structured.kind, ErrorKind::Unknown);
        assert!(!structured.retryable);
        assert!(structured.message.contains("Computer Networks.pdf"));
        assert_eq!(structured.cause, "No such file or directory");

        let err = anyhow::anyhow!("connection refused").context("Timeout Handling Notes.pdf");
        assert_eq!(
            structure_ref(&err, ErrorContext::default(), Locale::En).kind,
            ErrorKind::Network
        );
    }

    #[test]
    fn structure_of_plain_error_uses_message() {
        let err = anyhow::anyhow!("upstream said: service unavailable");
        let structured = structure_ref(&err, ErrorContext::default(), Locale::En);
        assert_eq!(structured.kind, ErrorKind::ServerError);
        assert!(structured.retryable);
        assert!(structured.original.is_none());
    }
}
