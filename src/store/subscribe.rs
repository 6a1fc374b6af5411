/* src/store/subscribe.rs */

use std::sync::Arc;

use super::{Listener, NamespacedStore};
use crate::{Record, Subscription};

impl<D, K, C> NamespacedStore<D, K, C>
where
	D: Clone + Send + Sync + 'static,
	K: Clone + Send + Sync + 'static,
	C: Send + Sync + 'static,
{
	/// Registers `callback` for the keys, holding them until unsubscribed.
	///
	/// Keys whose record is missing, invalidated, or pending with no fetch in
	/// flight are fetched immediately. The callback receives the records for
	/// all of its keys, in key order, once per commit that touches any of them.
	pub(crate) fn subscribe_keys<F>(&self, keys: Vec<K>, callback: F) -> Subscription
	where
		F: Fn(&[Record<D, K>]) + Send + Sync + 'static,
	{
		let hashes = self.hashes(&keys);
		let hold = self.hold_hashes(hashes.clone());

		let (id, stale) = {
			let mut state = self.inner.state.lock();
			let id = state.next_id();
			let listener = Arc::new(Listener {
				id,
				keys: keys.clone(),
				hashes: hashes.clone(),
				callback: Box::new(callback),
			});

			let snapshot = self.inner.records.load();
			let mut stale = Vec::new();
			for (key, hash) in keys.iter().zip(&hashes) {
				state
					.subscriptions
					.entry(hash.clone())
					.or_default()
					.push(Arc::clone(&listener));

				if state.fetches.contains_key(hash) {
					continue;
				}
				let needs_fetch = match snapshot.get(hash) {
					None => true,
					Some(record) => record.pending || record.invalidated,
				};
				if needs_fetch {
					stale.push(key.clone());
				}
			}
			(id, stale)
		};

		if !stale.is_empty() {
			self.fetch_keys(stale);
		}

		let store = self.clone();
		Subscription::new(move || {
			store.unsubscribe(id, &hashes);
			hold.release();
		})
	}

	fn unsubscribe(&self, id: u64, hashes: &[String]) {
		let mut state = self.inner.state.lock();
		for hash in hashes {
			let emptied = match state.subscriptions.get_mut(hash) {
				Some(listeners) => {
					listeners.retain(|listener| listener.id != id);
					listeners.is_empty()
				}
				None => false,
			};
			if emptied {
				state.subscriptions.remove(hash);
			}
		}
	}
}
