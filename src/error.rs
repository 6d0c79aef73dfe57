//! Unified application error model.
//! One enum shared by the resolver, registry, label merger, engine and the
//! binaries, with small helper constructors and a CLI exit-code mapping.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    /// Every candidate location for a required document failed.
    #[error("source_unavailable: no usable document at {}", .attempted.join(", "))]
    SourceUnavailable { attempted: Vec<String> },
    /// The query engine rejected a statement; message is the engine's own.
    #[error("{code}: {message}")]
    Query { code: String, message: String },
    #[error("{code}: {message}")]
    Fetch { code: String, message: String },
    #[error("{code}: {message}")]
    Config { code: String, message: String },
    #[error("{code}: {message}")]
    Io { code: String, message: String },
    #[error("{code}: {message}")]
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::SourceUnavailable { .. } => "source_unavailable",
            AppError::Query { code, .. }
            | AppError::Fetch { code, .. }
            | AppError::Config { code, .. }
            | AppError::Io { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            AppError::SourceUnavailable { attempted } => {
                format!("no usable document at {}", attempted.join(", "))
            }
            AppError::Query { message, .. }
            | AppError::Fetch { message, .. }
            | AppError::Config { message, .. }
            | AppError::Io { message, .. }
            | AppError::Internal { message, .. } => message.clone(),
        }
    }

    pub fn source_unavailable<I, S>(attempted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AppError::SourceUnavailable { attempted: attempted.into_iter().map(Into::into).collect() }
    }
    pub fn query<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Query { code: code.into(), message: msg.into() } }
    pub fn fetch<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Fetch { code: code.into(), message: msg.into() } }
    pub fn config<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Config { code: code.into(), message: msg.into() } }
    pub fn io<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Io { code: code.into(), message: msg.into() } }
    pub fn internal<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Process exit code used by the binaries.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config { .. } => 2,
            AppError::SourceUnavailable { .. } => 3,
            AppError::Fetch { .. } => 4,
            AppError::Query { .. } => 5,
            AppError::Io { .. } => 6,
            AppError::Internal { .. } => 70,
        }
    }

    pub fn is_query(&self) -> bool { matches!(self, AppError::Query { .. }) }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal".into(), message: err.to_string() }
    }
}

impl From<polars::prelude::PolarsError> for AppError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        AppError::Query { code: "engine_error".into(), message: err.to_string() }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Fetch { code: "invalid_json".into(), message: err.to_string() }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Fetch { code: "network".into(), message: err.to_string() }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io { code: "io".into(), message: err.to_string() }
    }
}
