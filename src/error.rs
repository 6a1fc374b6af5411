/* src/error.rs */

use serde::{Deserialize, Serialize};

/// Reason a fetch batch failed. Stored on the record as part of its [`Failure`](crate::Failure).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FetchError {
	/// The configured fetch function rejected.
	#[error("fetch failed: {0}")]
	Failed(String),
	/// No fetch function is configured and nothing stored the value in time.
	#[error("no data available")]
	Unavailable,
	/// A multi-key fetch returned a different number of values than keys requested.
	#[error("fetch returned {actual} values for {expected} keys")]
	CountMismatch { expected: usize, actual: usize },
	/// The namespace's context was reclaimed before the fetch could run.
	#[error("namespace context was dropped")]
	ContextDropped,
	/// The fetch was requested outside of a tokio runtime.
	#[error("no tokio runtime available to drive the fetch")]
	NoRuntime,
}

impl FetchError {
	pub fn failed(reason: impl std::fmt::Display) -> Self {
		Self::Failed(reason.to_string())
	}
}

impl From<String> for FetchError {
	fn from(reason: String) -> Self {
		Self::Failed(reason)
	}
}

impl From<&str> for FetchError {
	fn from(reason: &str) -> Self {
		Self::Failed(reason.to_string())
	}
}

/// Errors surfaced to callers of the store and its handles.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	/// An updater was applied to a key that has no primed data yet.
	///
	/// This is reported to the caller only; the store is left untouched.
	#[error("no primed data for key: {hash}")]
	MissingData { hash: String },

	/// A list update supplied the wrong number of values.
	#[error("expected {expected} values, got {actual}")]
	LengthMismatch { expected: usize, actual: usize },

	/// The awaited record settled with a failure.
	#[error("fetch error: {0}")]
	Fetch(#[from] FetchError),

	/// The waiter was torn down before the record settled.
	#[error("request was cancelled before the record settled")]
	Cancelled,

	#[error("builder error: {0}")]
	Builder(String),

	#[cfg(feature = "json")]
	#[error("state serialization error: {0}")]
	Json(#[from] serde_json::Error),
}
