/* src/handle/mod.rs */

mod document;
mod guard;
mod list;
#[cfg(feature = "stream")]
mod stream;

pub use document::DocumentHandle;
pub use guard::{Hold, Subscription};
pub use list::ListHandle;
#[cfg(feature = "stream")]
pub use stream::RecordStream;

use async_trait::async_trait;

use crate::StoreError;

/// Operations shared by single-key and multi-key handles.
///
/// The two variants differ only in how member records are aggregated into
/// a snapshot and in the shape of the data an update takes.
#[async_trait]
pub trait Handle: Send + Sync {
	type Key: Send + Sync;
	type Snapshot: Clone + Send + 'static;
	type Data: Send;

	fn key(&self) -> &Self::Key;

	/// Returns the current snapshot, storing empty pending records for keys
	/// seen for the first time. Never blocks.
	fn get_latest(&self) -> Self::Snapshot;

	/// Resolves once the data is primed and no fetch is pending, fetching if needed.
	///
	/// Resolves immediately when the data is already primed. Rejects with the
	/// stored failure reason if the fetch fails before anything was primed.
	async fn get(&self) -> Result<Self::Snapshot, StoreError>;

	/// Calls `callback` with a fresh snapshot on every commit touching the key(s).
	///
	/// The keys are held, and fetched if stale, for as long as the
	/// subscription lives.
	fn subscribe<F>(&self, callback: F) -> Subscription
	where
		F: Fn(&Self::Snapshot) + Send + Sync + 'static;

	/// Prevents the key(s) from being purged until the guard is released.
	fn hold(&self) -> Hold;

	/// Marks the stored data stale. Only subscribed keys are refetched right away.
	fn invalidate(&self);

	/// Stores a literal value without fetching.
	fn update(&self, data: Self::Data) -> Result<(), StoreError>;

	/// Stores the result of `updater` applied to the current primed data.
	///
	/// Fails with [`StoreError::MissingData`] and leaves the store untouched
	/// when there is no primed data to update.
	fn update_with<F>(&self, updater: F) -> Result<(), StoreError>
	where
		F: FnOnce(&Self::Data, &Self::Key) -> Self::Data;

	/// Streams the current snapshot followed by every subsequent change.
	#[cfg(feature = "stream")]
	fn watch(&self) -> RecordStream<Self::Snapshot> {
		let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
		let _ = tx.send(self.get_latest());
		let subscription = self.subscribe(move |snapshot: &Self::Snapshot| {
			let _ = tx.send(snapshot.clone());
		});
		RecordStream::new(rx, subscription)
	}
}
