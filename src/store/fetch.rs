/* src/store/fetch.rs */

use std::future::Future;

use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture};

use super::{NamespacedStore, State};
use crate::record::now_millis;
use crate::{FetchError, Record, StoreError, StoreEvent};

/// Keys claimed by one fetch call.
pub(crate) struct FetchBatch<K> {
	id: u64,
	keys: Vec<K>,
	hashes: Vec<String>,
}

impl<K> FetchBatch<K> {
	fn new(id: u64) -> Self {
		Self {
			id,
			keys: Vec::new(),
			hashes: Vec::new(),
		}
	}

	/// Marks the hash as in flight under this batch, unless another fetch already owns it.
	fn claim<D>(&mut self, state: &mut State<D, K>, key: K, hash: String) -> bool {
		if state.fetches.contains_key(&hash) {
			return false;
		}
		state.fetches.insert(hash.clone(), self.id);
		self.keys.push(key);
		self.hashes.push(hash);
		true
	}

	fn is_empty(&self) -> bool {
		self.keys.is_empty()
	}
}

/// Stand-in used when no fetch function is configured: waits one scheduling
/// step, then fails unless every key has been stored by someone else.
fn fallback_fetch<D, K, C>(
	store: NamespacedStore<D, K, C>,
	keys: Vec<K>,
) -> BoxFuture<'static, Result<Vec<D>, FetchError>>
where
	D: Clone + Send + Sync + 'static,
	K: Clone + Send + Sync + 'static,
	C: Send + Sync + 'static,
{
	async move {
		tokio::task::yield_now().await;
		store
			.records(&keys)
			.into_iter()
			.map(|record| match record {
				Some(Record {
					primed: true,
					data: Some(data),
					..
				}) => Ok(data),
				_ => Err(FetchError::Unavailable),
			})
			.collect()
	}
	.boxed()
}

impl<D, K, C> NamespacedStore<D, K, C>
where
	D: Clone + Send + Sync + 'static,
	K: Clone + Send + Sync + 'static,
	C: Send + Sync + 'static,
{
	/// Fetches every key that has no fetch in flight, as a single batch.
	pub(crate) fn fetch_keys(&self, keys: Vec<K>) {
		let hashes = self.hashes(&keys);
		let (batch, pending) = {
			let mut guard = self.inner.state.lock();
			let state = &mut *guard;
			let snapshot = self.inner.records.load();
			let mut batch = FetchBatch::new(state.next_id());
			let mut pending = Vec::new();

			for (key, hash) in keys.into_iter().zip(hashes) {
				let current = snapshot.get(&hash).cloned();
				if !batch.claim(state, key.clone(), hash) {
					continue;
				}
				match current {
					Some(record) if record.pending => {}
					Some(record) => pending.push(record.into_pending()),
					None => pending.push(Record::initial(key)),
				}
			}
			(batch, pending)
		};

		self.commit(pending);
		self.dispatch(batch);
	}

	/// Issues one fetch call for the batch and commits its outcome.
	fn dispatch(&self, batch: FetchBatch<K>) {
		if batch.is_empty() {
			return;
		}
		// Held until the outcome is committed.
		let hold = self.hold_hashes(batch.hashes.clone());

		let request = match self.inner.context.upgrade() {
			Some(context) => match &self.inner.config.fetch_many {
				Some(fetch_many) => fetch_many(batch.keys.clone(), context, self.clone()),
				None => fallback_fetch(self.clone(), batch.keys.clone()),
			},
			None => future::ready(Err(FetchError::ContextDropped)).boxed(),
		};

		tracing::debug!(batch = batch.id, keys = batch.keys.len(), "dispatching fetch");

		let runtime = match tokio::runtime::Handle::try_current() {
			Ok(runtime) => runtime,
			Err(_) => {
				tracing::warn!(batch = batch.id, "fetch requested outside a tokio runtime");
				self.settle(batch, Err(FetchError::NoRuntime));
				hold.release();
				return;
			}
		};

		let store = self.clone();
		runtime.spawn(async move {
			let result = request.await;
			store.settle(batch, result);
			hold.release();
		});
	}

	/// Commits one record per key of the batch: fulfilled on success, failed
	/// (keeping prior data) on error. The batch succeeds or fails as a whole.
	///
	/// Keys whose in-flight marker was taken over (by a purge, or by a
	/// prediction) are skipped, so a stale result never lands over newer state.
	fn settle(&self, batch: FetchBatch<K>, result: Result<Vec<D>, FetchError>) {
		let result = match result {
			Ok(values) if values.len() != batch.keys.len() => Err(FetchError::CountMismatch {
				expected: batch.keys.len(),
				actual: values.len(),
			}),
			other => other,
		};
		let now = now_millis();

		let records: Vec<Record<D, K>> = {
			let mut state = self.inner.state.lock();
			let owned: Vec<bool> = batch
				.hashes
				.iter()
				.map(|hash| {
					let owned = state.fetches.get(hash) == Some(&batch.id);
					if owned {
						state.fetches.remove(hash);
					}
					owned
				})
				.collect();
			let hashes: Vec<String> = batch
				.hashes
				.iter()
				.zip(&owned)
				.filter(|(_, owned)| **owned)
				.map(|(hash, _)| hash.clone())
				.collect();
			if hashes.len() < batch.hashes.len() {
				tracing::debug!(
					batch = batch.id,
					dropped = batch.hashes.len() - hashes.len(),
					"discarding superseded fetch results"
				);
			}
			if hashes.is_empty() {
				return;
			}

			let snapshot = self.inner.records.load();
			let settled = batch.keys.into_iter().zip(batch.hashes).zip(owned);
			match result {
				Ok(values) => {
					tracing::debug!(batch = batch.id, keys = values.len(), "fetch resolved");
					let _ = self.inner.events.send(StoreEvent::Fetched { hashes });
					settled
						.zip(values)
						.filter(|(((_, _), owned), _)| *owned)
						.map(|(((key, _), _), data)| Record::fulfilled(key, data, false, now))
						.collect()
				}
				Err(reason) => {
					tracing::warn!(batch = batch.id, error = %reason, "fetch failed");
					let _ = self.inner.events.send(StoreEvent::FetchFailed {
						hashes,
						reason: reason.clone(),
					});
					settled
						.filter(|((_, _), owned)| *owned)
						.map(|((key, hash), _)| {
							snapshot
								.get(&hash)
								.cloned()
								.unwrap_or_else(|| Record::initial(key))
								.into_failed(reason.clone(), now)
						})
						.collect()
				}
			}
		};

		self.commit(records);
	}

	/// Marks stored records invalidated. Subscribed ones are refetched in the
	/// same commit; held-but-unsubscribed ones wait for a subscription.
	pub(crate) fn invalidate_keys(&self, keys: Vec<K>) {
		let hashes = self.hashes(&keys);
		let (invalidated, batch) = {
			let mut guard = self.inner.state.lock();
			let state = &mut *guard;
			let snapshot = self.inner.records.load();
			let mut batch = FetchBatch::new(state.next_id());
			let mut invalidated = Vec::new();

			for (key, hash) in keys.into_iter().zip(hashes) {
				let Some(record) = snapshot.get(&hash) else {
					continue;
				};
				if record.invalidated {
					continue;
				}
				let mut record = record.clone().into_invalidated();
				if state.subscriptions.contains_key(&hash) && batch.claim(state, key, hash) {
					record.pending = true;
				}
				invalidated.push(record);
			}
			(invalidated, batch)
		};

		self.commit(invalidated);
		self.dispatch(batch);
	}

	/// Stores literal values, keeping each record's pending flag.
	pub(crate) fn write(&self, keys: Vec<K>, values: Vec<D>) {
		let now = now_millis();
		let current = self.records(&keys);
		let records = keys
			.into_iter()
			.zip(values)
			.zip(current)
			.map(|((key, data), current)| {
				let pending = current.is_some_and(|record| record.pending);
				Record::fulfilled(key, data, pending, now)
			})
			.collect();
		self.commit(records);
	}

	/// Stores a predicted value while `outcome` runs, blocking fetches of the key.
	///
	/// A fetch already in flight for the key is superseded: its result is
	/// discarded. On success the outcome's value is committed. On failure the
	/// record rolls back to what it was before the prediction, with the
	/// failure set. If the namespace is purged meanwhile, nothing is committed.
	pub(crate) async fn predict<F>(
		&self,
		key: K,
		prediction: Option<D>,
		outcome: F,
	) -> Result<Record<D, K>, StoreError>
	where
		F: Future<Output = Result<D, FetchError>>,
	{
		let hash = self.hash(&key);
		let hold = self.hold_hashes(vec![hash.clone()]);

		let (id, prior) = {
			let mut state = self.inner.state.lock();
			let id = state.next_id();
			if let Some(superseded) = state.fetches.insert(hash.clone(), id) {
				tracing::debug!(hash = %hash, batch = superseded, "prediction supersedes fetch");
			}
			(id, self.inner.records.load().get(&hash).cloned())
		};

		let predicted = match (prediction, prior.clone()) {
			(Some(data), Some(record)) => Record {
				data: Some(data),
				primed: true,
				pending: true,
				..record
			},
			(Some(data), None) => Record {
				updated_at: None,
				..Record::fulfilled(key.clone(), data, true, 0)
			},
			(None, Some(record)) => record.into_pending(),
			(None, None) => Record::initial(key.clone()),
		};
		self.commit(vec![predicted]);

		let result = outcome.await;
		let now = now_millis();
		let owned = {
			let mut state = self.inner.state.lock();
			let owned = state.fetches.get(&hash) == Some(&id);
			if owned {
				state.fetches.remove(&hash);
			}
			owned
		};

		let (record, result) = match result {
			Ok(data) => (Record::fulfilled(key, data, false, now), Ok(())),
			Err(reason) => {
				let rolled_back = prior
					.unwrap_or_else(|| Record::initial(key))
					.into_failed(reason.clone(), now);
				(rolled_back, Err(StoreError::Fetch(reason)))
			}
		};
		if owned {
			self.commit(vec![record.clone()]);
		}
		hold.release();
		result.map(|()| record)
	}
}
