/* src/record.rs */

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::FetchError;

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|elapsed| elapsed.as_millis() as u64)
		.unwrap_or(0)
}

/// When and why the latest fetch for a record failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
	/// Milliseconds since the Unix epoch.
	pub at: u64,
	pub reason: FetchError,
}

/// The cached state for one key.
///
/// Records are immutable snapshots: every change produces a new record that
/// replaces the stored one in a single commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<D, K> {
	/// The key this record was stored under.
	pub key: K,
	/// Latest known value. Absent until the first successful fetch or update.
	pub data: Option<D>,
	/// Set once `data` has been stored at least once. Never reverts.
	pub primed: bool,
	/// A fetch is in flight, or expected imminently.
	pub pending: bool,
	/// Marked stale by `invalidate` and not yet replaced by a newer value.
	pub invalidated: bool,
	/// Failure of the latest fetch. Stale data is kept alongside it.
	pub failure: Option<Failure>,
	/// Milliseconds since the Unix epoch of the last full value or update.
	pub updated_at: Option<u64>,
}

impl<D, K> Record<D, K> {
	/// An empty record awaiting its first value.
	pub fn initial(key: K) -> Self {
		Self {
			key,
			data: None,
			primed: false,
			pending: true,
			invalidated: false,
			failure: None,
			updated_at: None,
		}
	}

	/// A record holding a freshly received or written value.
	pub fn fulfilled(key: K, data: D, pending: bool, updated_at: u64) -> Self {
		Self {
			key,
			data: Some(data),
			primed: true,
			pending,
			invalidated: false,
			failure: None,
			updated_at: Some(updated_at),
		}
	}

	/// True when no fetch is outstanding and the record either has data or a failure.
	pub fn is_settled(&self) -> bool {
		!self.pending && (self.primed || self.failure.is_some())
	}

	pub(crate) fn into_pending(self) -> Self {
		Self {
			pending: true,
			..self
		}
	}

	pub(crate) fn into_invalidated(self) -> Self {
		Self {
			invalidated: true,
			..self
		}
	}

	pub(crate) fn into_failed(self, reason: FetchError, at: u64) -> Self {
		Self {
			failure: Some(Failure { at, reason }),
			pending: false,
			..self
		}
	}
}

/// Composite view over the records of an ordered key list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListRecord<D, K> {
	pub key: Vec<K>,
	/// One record per key, in key order.
	pub data: Vec<Record<D, K>>,
	/// True only if every member is primed.
	pub primed: bool,
	/// True if any member is pending.
	pub pending: bool,
	/// The first member failure in key order.
	pub failure: Option<Failure>,
}

impl<D, K> ListRecord<D, K> {
	pub(crate) fn aggregate(key: Vec<K>, data: Vec<Record<D, K>>) -> Self {
		let primed = data.iter().all(|record| record.primed);
		let pending = data.iter().any(|record| record.pending);
		let failure = data.iter().find_map(|record| record.failure.clone());
		Self {
			key,
			data,
			primed,
			pending,
			failure,
		}
	}

	/// Member values in key order, if every member has data.
	pub fn values(&self) -> Option<Vec<&D>> {
		self.data.iter().map(|record| record.data.as_ref()).collect()
	}
}
