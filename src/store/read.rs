/* src/store/read.rs */

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast;

use super::NamespacedStore;
use crate::{DocumentHandle, ListHandle, Record, StoreEvent};

impl<D, K, C> NamespacedStore<D, K, C>
where
	D: Clone + Send + Sync + 'static,
	K: Clone + Send + Sync + 'static,
	C: Send + Sync + 'static,
{
	/// Returns a handle for a single key.
	pub fn key(&self, key: K) -> DocumentHandle<D, K, C> {
		DocumentHandle::new(self.clone(), key)
	}

	/// Returns a handle over an ordered list of keys.
	pub fn keys(&self, keys: Vec<K>) -> ListHandle<D, K, C> {
		ListHandle::new(self.clone(), keys)
	}

	/// Computes the storage hash of a key.
	pub fn hash(&self, key: &K) -> String {
		(self.inner.config.hash)(key)
	}

	pub(crate) fn hashes(&self, keys: &[K]) -> Vec<String> {
		keys.iter().map(|key| self.hash(key)).collect()
	}

	/// Gets the stored record for a key without creating one. This is a wait-free operation.
	pub fn record(&self, key: &K) -> Option<Record<D, K>> {
		let hash = self.hash(key);
		self.inner.records.load().get(&hash).cloned()
	}

	/// Gets the stored records for several keys, in key order, without creating any.
	pub fn records(&self, keys: &[K]) -> Vec<Option<Record<D, K>>> {
		let snapshot = self.inner.records.load();
		keys.iter()
			.map(|key| snapshot.get(&self.hash(key)).cloned())
			.collect()
	}

	/// Returns every stored record keyed by hash.
	///
	/// This is the serialized form consumed by
	/// [`hydrate_from_state`](Self::hydrate_from_state).
	pub fn extract_state(&self) -> HashMap<String, Record<D, K>> {
		(**self.inner.records.load()).clone()
	}

	/// Returns the keys of all stored records.
	pub fn known_keys(&self) -> Vec<K> {
		let snapshot = self.inner.records.load();
		snapshot.values().map(|record| record.key.clone()).collect()
	}

	/// Returns the number of stored records.
	pub fn len(&self) -> usize {
		self.inner.records.load().len()
	}

	/// Returns true if no records are stored.
	pub fn is_empty(&self) -> bool {
		self.inner.records.load().is_empty()
	}

	/// Number of outstanding holds (including subscriptions) on a key.
	pub fn hold_count(&self, key: &K) -> usize {
		let hash = self.hash(key);
		self.inner.state.lock().holds.get(&hash).copied().unwrap_or(0)
	}

	/// Returns true if a fetch for the key is in flight.
	pub fn is_fetching(&self, key: &K) -> bool {
		let hash = self.hash(key);
		self.inner.state.lock().fetches.contains_key(&hash)
	}

	/// The namespace's context, if it is still alive.
	pub fn context(&self) -> Option<Arc<C>> {
		self.inner.context.upgrade()
	}

	/// Subscribes to lifecycle events of this namespace.
	pub fn events(&self) -> broadcast::Receiver<StoreEvent> {
		self.inner.events.subscribe()
	}
}
