/* src/store/commit.rs */

use std::collections::HashSet;
use std::sync::Arc;

use super::{Listener, NamespacedStore};
use crate::{Record, StoreEvent};

impl<D, K, C> NamespacedStore<D, K, C>
where
	D: Clone + Send + Sync + 'static,
	K: Clone + Send + Sync + 'static,
	C: Send + Sync + 'static,
{
	/// Replaces the stored record for each given record's key, then runs one
	/// notification pass and one effect pass over exactly those hashes, and
	/// schedules purges for the ones nobody holds.
	///
	/// A subscription covering several of the hashes is notified once.
	pub fn commit(&self, records: Vec<Record<D, K>>) {
		if records.is_empty() {
			return;
		}

		// Hashes always come from the record's own key.
		let mut hashes: Vec<String> = Vec::with_capacity(records.len());
		let mut seen = HashSet::new();
		let entries: Vec<(String, Record<D, K>)> = records
			.into_iter()
			.map(|record| {
				let hash = self.hash(&record.key);
				if seen.insert(hash.clone()) {
					hashes.push(hash.clone());
				}
				(hash, record)
			})
			.collect();

		let listeners = {
			let state = self.inner.state.lock();
			self.inner.records.rcu(|current| {
				let mut next = (**current).clone();
				for (hash, record) in &entries {
					next.insert(hash.clone(), record.clone());
				}
				next
			});

			let mut notified = HashSet::new();
			let mut listeners: Vec<Arc<Listener<D, K>>> = Vec::new();
			for hash in &hashes {
				if let Some(registered) = state.subscriptions.get(hash) {
					for listener in registered {
						if notified.insert(listener.id) {
							listeners.push(Arc::clone(listener));
						}
					}
				}
			}
			listeners
		};

		self.notify(&listeners);
		self.run_effects(&hashes);

		let _ = self.inner.events.send(StoreEvent::Committed {
			hashes: hashes.clone(),
		});

		let unheld: Vec<String> = {
			let state = self.inner.state.lock();
			hashes
				.into_iter()
				.filter(|hash| !state.holds.contains_key(hash))
				.collect()
		};
		self.schedule_purge(unheld);
	}

	fn notify(&self, listeners: &[Arc<Listener<D, K>>]) {
		for listener in listeners {
			// Reload per listener: an earlier callback may have committed.
			let current: Vec<Record<D, K>> = {
				let snapshot = self.inner.records.load();
				listener
					.hashes
					.iter()
					.zip(&listener.keys)
					.map(|(hash, key)| {
						snapshot
							.get(hash)
							.cloned()
							.unwrap_or_else(|| Record::initial(key.clone()))
					})
					.collect()
			};
			(listener.callback)(&current);
		}
	}

	fn run_effects(&self, hashes: &[String]) {
		let Some(effect) = self.inner.config.effect.as_ref() else {
			return;
		};
		let context = self.inner.context.upgrade();

		for hash in hashes {
			// Subscribers may have changed the record since it was committed.
			let record = self.inner.records.load().get(hash).cloned();
			let Some(record) = record else {
				continue;
			};

			let previous = self.inner.state.lock().effect_cleanups.remove(hash);
			if let Some(cleanup) = previous {
				cleanup();
			}

			let Some(context) = context.as_deref() else {
				continue;
			};
			let Some(cleanup) = effect(&record, context) else {
				continue;
			};

			let displaced = self
				.inner
				.state
				.lock()
				.effect_cleanups
				.insert(hash.clone(), cleanup);
			// Only reachable when the effect itself committed this hash again.
			if let Some(displaced) = displaced {
				displaced();
			}
		}
	}
}
