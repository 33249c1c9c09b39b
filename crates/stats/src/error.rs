use std::fmt;

use warbot_api_client::{ApiError, ApiErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsErrorKind {
    /// The faction has no ranked war running right now.
    NoActiveWar,
    /// The API key was rejected; retrying will not help.
    Unauthorized,
    /// The API could not produce a usable answer; try again later.
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct StatsError {
    pub kind: StatsErrorKind,
    pub detail: String,
}

impl StatsError {
    pub fn no_active_war() -> Self {
        Self {
            kind: StatsErrorKind::NoActiveWar,
            detail: "no ranked war is currently running".to_string(),
        }
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self {
            kind: StatsErrorKind::Unauthorized,
            detail: detail.into(),
        }
    }

    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self {
            kind: StatsErrorKind::Unavailable,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for StatsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stats_error kind={:?} detail={}", self.kind, self.detail)
    }
}

impl std::error::Error for StatsError {}

impl From<ApiError> for StatsError {
    fn from(error: ApiError) -> Self {
        let detail = format!("{}: {}", error.code, error.detail);
        match error.kind {
            ApiErrorKind::Unauthorized => Self::unauthorized(detail),
            ApiErrorKind::Transient | ApiErrorKind::Malformed => Self::unavailable(detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_kinds_collapse_to_caller_facing_kinds() {
        let unauthorized: StatsError = ApiError::unauthorized("http_status", "status 403").into();
        assert_eq!(unauthorized.kind, StatsErrorKind::Unauthorized);

        let transient: StatsError = ApiError::transient("timeout", "request timed out").into();
        assert_eq!(transient.kind, StatsErrorKind::Unavailable);

        let malformed: StatsError = ApiError::malformed("invalid_json", "bad body").into();
        assert_eq!(malformed.kind, StatsErrorKind::Unavailable);
        assert!(malformed.detail.contains("invalid_json"));
    }
}
