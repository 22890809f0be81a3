//! Failure classification.

use outreach_store::ReasonCode;

/// Statuses worth another attempt. A missing status (transport failure) is
/// retryable as well.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Error-text fragments the marketplace uses when the reply window has closed.
const OUT_OF_WINDOW_PHRASES: [&str; 7] = [
    "response window",
    "reply window",
    "time window",
    "out of window",
    "window expired",
    "window has expired",
    "48 hours",
];

/// Reason code for a failed send. First match wins.
pub fn classify_failure(status: Option<u16>, error: Option<&str>) -> ReasonCode {
    match status {
        Some(429) => return ReasonCode::RateLimit,
        Some(401) | Some(403) => return ReasonCode::Auth,
        _ => {}
    }

    if error.is_some_and(mentions_window) {
        return ReasonCode::OutOfWindow;
    }

    match status {
        None => ReasonCode::Network,
        Some(_) => ReasonCode::Unknown,
    }
}

pub fn is_retryable(status: Option<u16>) -> bool {
    match status {
        None => true,
        Some(code) => RETRYABLE_STATUSES.contains(&code),
    }
}

fn mentions_window(error: &str) -> bool {
    let lowered = error.to_lowercase();
    OUT_OF_WINDOW_PHRASES
        .iter()
        .any(|phrase| lowered.contains(phrase))
}
