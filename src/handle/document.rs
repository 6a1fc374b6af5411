/* src/handle/document.rs */

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::{Handle, Hold, Subscription};
use crate::store::NamespacedStore;
use crate::{FetchError, Record, StoreError};

/// Handle for a single key.
pub struct DocumentHandle<D, K, C> {
	store: NamespacedStore<D, K, C>,
	key: K,
}

impl<D, K: Clone, C> Clone for DocumentHandle<D, K, C> {
	fn clone(&self) -> Self {
		Self {
			store: self.store.clone(),
			key: self.key.clone(),
		}
	}
}

impl<D, K, C> DocumentHandle<D, K, C>
where
	D: Clone + Send + Sync + 'static,
	K: Clone + Send + Sync + 'static,
	C: Send + Sync + 'static,
{
	pub(crate) fn new(store: NamespacedStore<D, K, C>, key: K) -> Self {
		Self { store, key }
	}

	/// The namespace this handle reads from.
	pub fn store(&self) -> &NamespacedStore<D, K, C> {
		&self.store
	}

	/// Shows `prediction` (if any) as a pending value while `outcome` runs.
	///
	/// Fetches of the key are held back until `outcome` settles. Its value is
	/// then stored as fulfilled, or on error the record reverts to its prior
	/// data with the failure attached and the error is returned.
	pub async fn predict_update<F>(
		&self,
		prediction: Option<D>,
		outcome: F,
	) -> Result<Record<D, K>, StoreError>
	where
		F: Future<Output = Result<D, FetchError>>,
	{
		self.store
			.predict(self.key.clone(), prediction, outcome)
			.await
	}
}

fn settled<D, K>(record: Record<D, K>) -> Result<Record<D, K>, StoreError> {
	if record.primed {
		return Ok(record);
	}
	let reason = record
		.failure
		.map(|failure| failure.reason)
		.unwrap_or(FetchError::Unavailable);
	Err(StoreError::Fetch(reason))
}

#[async_trait]
impl<D, K, C> Handle for DocumentHandle<D, K, C>
where
	D: Clone + Send + Sync + 'static,
	K: Clone + Send + Sync + 'static,
	C: Send + Sync + 'static,
{
	type Key = K;
	type Snapshot = Record<D, K>;
	type Data = D;

	fn key(&self) -> &K {
		&self.key
	}

	fn get_latest(&self) -> Record<D, K> {
		if let Some(record) = self.store.record(&self.key) {
			return record;
		}
		let record = Record::initial(self.key.clone());
		self.store.commit(vec![record.clone()]);
		record
	}

	async fn get(&self) -> Result<Record<D, K>, StoreError> {
		if let Some(record) = self.store.record(&self.key)
			&& record.primed
		{
			return Ok(record);
		}

		let (tx, rx) = oneshot::channel();
		let waiter = Arc::new(Mutex::new(Some(tx)));
		let slot = Arc::clone(&waiter);
		let subscription = self.store.subscribe_keys(vec![self.key.clone()], move |records| {
			let Some(record) = records.first() else {
				return;
			};
			if !record.is_settled() {
				return;
			}
			if let Some(tx) = slot.lock().take() {
				let _ = tx.send(record.clone());
			}
		});

		// An idle record that is neither primed nor being fetched would
		// otherwise never settle.
		let waiting = waiter.lock().is_some();
		if waiting {
			match self.store.record(&self.key) {
				Some(record) if !record.pending && record.primed => {
					drop(subscription);
					return Ok(record);
				}
				Some(record) if !record.pending => self.store.fetch_keys(vec![record.key]),
				_ => {}
			}
		}

		let record = rx.await.map_err(|_| StoreError::Cancelled)?;
		drop(subscription);
		settled(record)
	}

	fn subscribe<F>(&self, callback: F) -> Subscription
	where
		F: Fn(&Record<D, K>) + Send + Sync + 'static,
	{
		self.store
			.subscribe_keys(vec![self.key.clone()], move |records| {
				if let Some(record) = records.first() {
					callback(record);
				}
			})
	}

	fn hold(&self) -> Hold {
		self.store.hold_hashes(vec![self.store.hash(&self.key)])
	}

	fn invalidate(&self) {
		self.store.invalidate_keys(vec![self.key.clone()]);
	}

	fn update(&self, data: D) -> Result<(), StoreError> {
		self.store.write(vec![self.key.clone()], vec![data]);
		Ok(())
	}

	fn update_with<F>(&self, updater: F) -> Result<(), StoreError>
	where
		F: FnOnce(&D, &K) -> D,
	{
		let data = match self.store.record(&self.key) {
			Some(Record {
				primed: true,
				data: Some(data),
				..
			}) => data,
			_ => {
				return Err(StoreError::MissingData {
					hash: self.store.hash(&self.key),
				});
			}
		};
		let next = updater(&data, &self.key);
		self.update(next)
	}
}

impl<D, K: std::fmt::Debug, C> std::fmt::Debug for DocumentHandle<D, K, C> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DocumentHandle")
			.field("key", &self.key)
			.finish_non_exhaustive()
	}
}
