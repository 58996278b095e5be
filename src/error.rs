//! Typed errors.
//!
//! Most of the crate propagates `anyhow::Error`. The fetcher keeps a closed
//! taxonomy so callers can tell "upstream down" from "upstream changed
//! shape", and account operations distinguish caller mistakes from storage
//! failures so the HTTP layer can answer 400 instead of 500.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Network failure, timeout, or connection refused.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status.
    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    /// JSON envelope carried a non-zero `code`.
    #[error("upstream error code {code}: {message}")]
    Upstream { code: i64, message: String },

    /// Body was not JSON.
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),

    /// None of the known response layouts matched.
    #[error("no known schema matched (tried: {})", tried.join(", "))]
    NoSchemaMatched { tried: Vec<&'static str> },
}

#[derive(Debug, Error)]
pub enum UserError {
    #[error("username already taken: {0}")]
    DuplicateUsername(String),

    #[error("email already registered: {0}")]
    DuplicateEmail(String),

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("no such user: {0}")]
    UnknownUser(i64),

    #[error("item not found: {0}")]
    UnknownItem(String),

    #[error("{0} must not be empty")]
    MissingField(&'static str),

    #[error(transparent)]
    Db(#[from] sqlx::Error),
}
