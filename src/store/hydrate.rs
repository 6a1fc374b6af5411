/* src/store/hydrate.rs */

use std::collections::HashMap;

use super::NamespacedStore;
use crate::{Record, StoreEvent};

impl<D, K, C> NamespacedStore<D, K, C>
where
	D: Clone + Send + Sync + 'static,
	K: Clone + Send + Sync + 'static,
	C: Send + Sync + 'static,
{
	/// Restores records produced by [`extract_state`](Self::extract_state).
	///
	/// The records go through a regular commit, keyed by the hash of their own
	/// key rather than the map key, so subscribers and waiting `get()` calls
	/// see them. Subscribed records that arrive invalidated, or pending with no
	/// local fetch behind them, are fetched.
	pub fn hydrate_from_state(&self, state: HashMap<String, Record<D, K>>) {
		if state.is_empty() {
			return;
		}
		let records: Vec<Record<D, K>> = state.into_values().collect();
		let hashes = self.hashes(&records.iter().map(|r| r.key.clone()).collect::<Vec<_>>());

		let stale: Vec<K> = {
			let state = self.inner.state.lock();
			records
				.iter()
				.zip(&hashes)
				.filter(|(record, hash)| {
					state.subscriptions.contains_key(*hash)
						&& !state.fetches.contains_key(*hash)
						&& (record.invalidated || record.pending)
				})
				.map(|(record, _)| record.key.clone())
				.collect()
		};

		tracing::debug!(records = records.len(), "hydrating namespace");
		self.commit(records);
		let _ = self.inner.events.send(StoreEvent::Hydrated { hashes });

		if !stale.is_empty() {
			self.fetch_keys(stale);
		}
	}
}

#[cfg(feature = "json")]
impl<D, K, C> NamespacedStore<D, K, C>
where
	D: Clone + Send + Sync + serde::Serialize + serde::de::DeserializeOwned + 'static,
	K: Clone + Send + Sync + serde::Serialize + serde::de::DeserializeOwned + 'static,
	C: Send + Sync + 'static,
{
	/// Serializes [`extract_state`](Self::extract_state) to a JSON object.
	pub fn extract_state_json(&self) -> Result<String, crate::StoreError> {
		Ok(serde_json::to_string(&**self.inner.records.load())?)
	}

	/// Parses a JSON object produced by [`extract_state_json`](Self::extract_state_json)
	/// and hydrates from it.
	pub fn hydrate_from_json(&self, json: &str) -> Result<(), crate::StoreError> {
		let state: HashMap<String, Record<D, K>> = serde_json::from_str(json)?;
		self.hydrate_from_state(state);
		Ok(())
	}
}
