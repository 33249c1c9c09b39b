use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    Transient,
    Malformed,
    Unauthorized,
}

#[derive(Debug, Clone)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub code: String,
    pub detail: String,
}

impl ApiError {
    fn new(kind: ApiErrorKind, code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            detail: detail.into(),
        }
    }

    pub fn transient(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Transient, code, detail)
    }

    pub fn malformed(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Malformed, code, detail)
    }

    pub fn unauthorized(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Unauthorized, code, detail)
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ApiErrorKind::Transient
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind == ApiErrorKind::Unauthorized
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "api_error kind={:?} code={} detail={}",
            self.kind, self.code, self.detail
        )
    }
}

impl std::error::Error for ApiError {}
