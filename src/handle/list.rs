/* src/handle/list.rs */

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::{Handle, Hold, Subscription};
use crate::store::NamespacedStore;
use crate::{FetchError, ListRecord, Record, StoreError};

/// Handle over an ordered list of keys, aggregated into a [`ListRecord`].
pub struct ListHandle<D, K, C> {
	store: NamespacedStore<D, K, C>,
	keys: Vec<K>,
}

impl<D, K: Clone, C> Clone for ListHandle<D, K, C> {
	fn clone(&self) -> Self {
		Self {
			store: self.store.clone(),
			keys: self.keys.clone(),
		}
	}
}

impl<D, K, C> ListHandle<D, K, C>
where
	D: Clone + Send + Sync + 'static,
	K: Clone + Send + Sync + 'static,
	C: Send + Sync + 'static,
{
	pub(crate) fn new(store: NamespacedStore<D, K, C>, keys: Vec<K>) -> Self {
		Self { store, keys }
	}

	pub fn store(&self) -> &NamespacedStore<D, K, C> {
		&self.store
	}

	fn current(&self) -> ListRecord<D, K> {
		let records = self
			.store
			.records(&self.keys)
			.into_iter()
			.zip(&self.keys)
			.map(|(record, key)| record.unwrap_or_else(|| Record::initial(key.clone())))
			.collect();
		ListRecord::aggregate(self.keys.clone(), records)
	}
}

/// Rejects with the first failure when some member never got data.
fn settled<D, K>(list: ListRecord<D, K>) -> Result<ListRecord<D, K>, StoreError> {
	if list.primed {
		return Ok(list);
	}
	let reason = list
		.data
		.iter()
		.filter(|record| !record.primed)
		.find_map(|record| record.failure.as_ref())
		.map(|failure| failure.reason.clone())
		.unwrap_or(FetchError::Unavailable);
	Err(StoreError::Fetch(reason))
}

#[async_trait]
impl<D, K, C> Handle for ListHandle<D, K, C>
where
	D: Clone + Send + Sync + 'static,
	K: Clone + Send + Sync + 'static,
	C: Send + Sync + 'static,
{
	type Key = Vec<K>;
	type Snapshot = ListRecord<D, K>;
	type Data = Vec<D>;

	fn key(&self) -> &Vec<K> {
		&self.keys
	}

	fn get_latest(&self) -> ListRecord<D, K> {
		let missing: Vec<Record<D, K>> = self
			.store
			.records(&self.keys)
			.into_iter()
			.zip(&self.keys)
			.filter(|(record, _)| record.is_none())
			.map(|(_, key)| Record::initial(key.clone()))
			.collect();
		self.store.commit(missing);
		self.current()
	}

	async fn get(&self) -> Result<ListRecord<D, K>, StoreError> {
		let list = self.current();
		if list.primed {
			return Ok(list);
		}

		let (tx, rx) = oneshot::channel();
		let waiter = Arc::new(Mutex::new(Some(tx)));
		let slot = Arc::clone(&waiter);
		let keys = self.keys.clone();
		let subscription = self.store.subscribe_keys(self.keys.clone(), move |records| {
			if !records.iter().all(Record::is_settled) {
				return;
			}
			if let Some(tx) = slot.lock().take() {
				let _ = tx.send(ListRecord::aggregate(keys.clone(), records.to_vec()));
			}
		});

		let waiting = waiter.lock().is_some();
		if waiting {
			let list = self.current();
			if !list.pending {
				if list.primed {
					drop(subscription);
					return Ok(list);
				}
				// Idle members that failed before priming.
				let idle: Vec<K> = list
					.data
					.into_iter()
					.filter(|record| !record.primed)
					.map(|record| record.key)
					.collect();
				self.store.fetch_keys(idle);
			}
		}

		let list = rx.await.map_err(|_| StoreError::Cancelled)?;
		drop(subscription);
		settled(list)
	}

	fn subscribe<F>(&self, callback: F) -> Subscription
	where
		F: Fn(&ListRecord<D, K>) + Send + Sync + 'static,
	{
		let keys = self.keys.clone();
		self.store.subscribe_keys(self.keys.clone(), move |records| {
			callback(&ListRecord::aggregate(keys.clone(), records.to_vec()));
		})
	}

	fn hold(&self) -> Hold {
		self.store.hold_hashes(self.store.hashes(&self.keys))
	}

	fn invalidate(&self) {
		self.store.invalidate_keys(self.keys.clone());
	}

	fn update(&self, data: Vec<D>) -> Result<(), StoreError> {
		if data.len() != self.keys.len() {
			return Err(StoreError::LengthMismatch {
				expected: self.keys.len(),
				actual: data.len(),
			});
		}
		self.store.write(self.keys.clone(), data);
		Ok(())
	}

	fn update_with<F>(&self, updater: F) -> Result<(), StoreError>
	where
		F: FnOnce(&Vec<D>, &Vec<K>) -> Vec<D>,
	{
		let mut data = Vec::with_capacity(self.keys.len());
		for (record, key) in self.store.records(&self.keys).into_iter().zip(&self.keys) {
			match record {
				Some(Record {
					primed: true,
					data: Some(value),
					..
				}) => data.push(value),
				_ => {
					return Err(StoreError::MissingData {
						hash: self.store.hash(key),
					});
				}
			}
		}
		let next = updater(&data, &self.keys);
		self.update(next)
	}
}

impl<D, K: std::fmt::Debug, C> std::fmt::Debug for ListHandle<D, K, C> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ListHandle")
			.field("keys", &self.keys)
			.finish_non_exhaustive()
	}
}
