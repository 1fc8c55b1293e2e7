use thiserror::Error;

pub type GeoResult<T> = Result<T, GeoError>;

const BODY_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum GeoError {
    #[error(
        "upstream unavailable while trying to {operation}{}",
        .status.map(|code| format!(" (HTTP {code})")).unwrap_or_default()
    )]
    UpstreamUnavailable {
        operation: String,
        status: Option<u16>,
        body: Option<String>,
    },
    #[error("{context}: {source}")]
    Resolution {
        context: String,
        #[source]
        source: Box<GeoError>,
    },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0}")]
    Config(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl GeoError {
    pub fn upstream(operation: impl Into<String>, status: Option<u16>, body: Option<String>) -> Self {
        Self::UpstreamUnavailable {
            operation: operation.into(),
            status,
            body: body.map(|text| preview(&text)).filter(|text| !text.is_empty()),
        }
    }

    pub fn transport(operation: impl Into<String>, err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());
        Self::upstream(operation, status, Some(err.without_url().to_string()))
    }

    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Resolution {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub fn is_upstream_unavailable(&self) -> bool {
        match self {
            Self::UpstreamUnavailable { .. } => true,
            Self::Resolution { source, .. } => source.is_upstream_unavailable(),
            _ => false,
        }
    }

    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::UpstreamUnavailable { status, .. } => *status,
            Self::Resolution { source, .. } => source.upstream_status(),
            _ => None,
        }
    }
}

fn preview(text: &str) -> String {
    text.trim().chars().take(BODY_PREVIEW_CHARS).collect()
}
