use chrono::{DateTime, Utc};

/// Current wall-clock time, centralized so tests can be written against a
/// fixed point without reaching into `chrono::Utc::now()` directly.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}
