/* src/event.rs */

use crate::FetchError;

/// Lifecycle events broadcast by each namespace.
///
/// Delivery is best-effort: slow receivers may miss events once the channel fills up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
	/// Records were replaced in a single commit.
	Committed { hashes: Vec<String> },
	/// A fetch batch resolved.
	Fetched { hashes: Vec<String> },
	/// A fetch batch rejected. Every hash in the batch failed together.
	FetchFailed {
		hashes: Vec<String>,
		reason: FetchError,
	},
	/// A record was evicted.
	Purged { hash: String },
	/// Records were restored from extracted state.
	Hydrated { hashes: Vec<String> },
}
