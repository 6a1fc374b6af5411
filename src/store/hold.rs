/* src/store/hold.rs */

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::runtime::RuntimeFlavor;

use super::{Inner, NamespacedStore, ScheduledPurge};
use crate::config::{Canceller, Cleanup, PurgePolicy};
use crate::{Hold, StoreEvent};

/// Evicts a scheduled purge by id. Implemented by every namespace regardless
/// of its data, key and context types.
trait Purgeable: Send + Sync {
	fn purge_scheduled(&self, hash: &str, id: u64);
}

/// Handed to a purge scheduler; calling [`purge`](Self::purge) evicts the record.
///
/// The eviction runs one scheduling step after the call (or after the
/// configured grace period on a multi-threaded runtime), so a hold taken in
/// the meantime still cancels it. Calling `purge` after the scheduled purge
/// was cancelled, or more than once, does nothing.
#[derive(Clone)]
pub struct PurgeTrigger {
	target: Weak<dyn Purgeable>,
	hash: String,
	id: u64,
	grace: Duration,
}

impl PurgeTrigger {
	/// Hash of the record this trigger purges.
	pub fn hash(&self) -> &str {
		&self.hash
	}

	pub fn purge(&self) {
		let target = self.target.clone();
		let hash = self.hash.clone();
		let id = self.id;

		match tokio::runtime::Handle::try_current() {
			Ok(runtime) => {
				let grace = match runtime.runtime_flavor() {
					RuntimeFlavor::CurrentThread => None,
					_ => Some(self.grace),
				};
				runtime.spawn(async move {
					match grace {
						Some(grace) => tokio::time::sleep(grace).await,
						None => tokio::task::yield_now().await,
					}
					if let Some(target) = target.upgrade() {
						target.purge_scheduled(&hash, id);
					}
				});
			}
			Err(_) => {
				tracing::warn!(hash = %hash, "purge triggered outside a tokio runtime, purging immediately");
				if let Some(target) = target.upgrade() {
					target.purge_scheduled(&hash, id);
				}
			}
		}
	}
}

impl std::fmt::Debug for PurgeTrigger {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PurgeTrigger")
			.field("hash", &self.hash)
			.field("id", &self.id)
			.finish()
	}
}

impl<D, K, C> Purgeable for Inner<D, K, C>
where
	D: Clone + Send + Sync + 'static,
	K: Clone + Send + Sync + 'static,
	C: Send + Sync + 'static,
{
	fn purge_scheduled(&self, hash: &str, id: u64) {
		let cleanup = {
			let mut guard = self.state.lock();
			let state = &mut *guard;

			// Cancelled, or superseded by a newer schedule.
			if state.scheduled_purges.get(hash).map(|scheduled| scheduled.id) != Some(id) {
				return;
			}
			state.scheduled_purges.remove(hash);
			if state.holds.contains_key(hash) {
				return;
			}

			self.records.rcu(|current| {
				let mut next = (**current).clone();
				next.remove(hash);
				next
			});
			state.effect_cleanups.remove(hash)
		};

		if let Some(cleanup) = cleanup {
			cleanup();
		}
		tracing::debug!(hash = %hash, "purged record");
		let _ = self.events.send(StoreEvent::Purged {
			hash: hash.to_string(),
		});
	}
}

fn schedule_after(delay: Duration, trigger: PurgeTrigger) -> Canceller {
	match tokio::runtime::Handle::try_current() {
		Ok(runtime) => {
			let task = runtime.spawn(async move {
				tokio::time::sleep(delay).await;
				trigger.purge();
			});
			let abort_handle = task.abort_handle();
			Box::new(move || abort_handle.abort())
		}
		Err(_) => {
			trigger.purge();
			Box::new(|| {})
		}
	}
}

impl<D, K, C> NamespacedStore<D, K, C>
where
	D: Clone + Send + Sync + 'static,
	K: Clone + Send + Sync + 'static,
	C: Send + Sync + 'static,
{
	/// Cancels pending purges of the hashes and increments their hold counts.
	pub(crate) fn hold_hashes(&self, hashes: Vec<String>) -> Hold {
		let cancellers: Vec<Canceller> = {
			let mut guard = self.inner.state.lock();
			let state = &mut *guard;
			let mut cancellers = Vec::new();
			for hash in &hashes {
				if let Some(scheduled) = state.scheduled_purges.remove(hash) {
					cancellers.extend(scheduled.canceller);
				}
				*state.holds.entry(hash.clone()).or_insert(0) += 1;
			}
			cancellers
		};
		for cancel in cancellers {
			cancel();
		}
		tracing::trace!(hashes = hashes.len(), "acquired hold");

		let store = self.clone();
		Hold::new(move || store.release_hashes(&hashes))
	}

	fn release_hashes(&self, hashes: &[String]) {
		let released: Vec<String> = {
			let mut guard = self.inner.state.lock();
			let state = &mut *guard;
			let mut released = Vec::new();
			for hash in hashes {
				let remaining = match state.holds.get_mut(hash) {
					Some(count) => {
						*count -= 1;
						*count
					}
					None => continue,
				};
				if remaining == 0 {
					state.holds.remove(hash);
					released.push(hash.clone());
				}
			}
			released
		};
		tracing::trace!(released = released.len(), "released hold");
		self.schedule_purge(released);
	}

	/// Schedules purges for stored, unheld hashes that have none scheduled yet.
	pub(crate) fn schedule_purge(&self, hashes: Vec<String>) {
		for hash in hashes {
			let (id, record) = {
				let mut state = self.inner.state.lock();
				if state.scheduled_purges.contains_key(&hash) || state.holds.contains_key(&hash) {
					continue;
				}
				let record = self.inner.records.load().get(&hash).cloned();
				let Some(record) = record else {
					continue;
				};
				let id = state.next_id();
				state.scheduled_purges.insert(
					hash.clone(),
					ScheduledPurge {
						id,
						canceller: None,
					},
				);
				(id, record)
			};

			let target: Weak<Inner<D, K, C>> = Arc::downgrade(&self.inner);
			let target: Weak<dyn Purgeable> = target;
			let trigger = PurgeTrigger {
				target,
				hash: hash.clone(),
				id,
				grace: self.inner.config.purge_grace,
			};

			let canceller = match &self.inner.config.purge {
				PurgePolicy::After(delay) => schedule_after(*delay, trigger),
				PurgePolicy::Custom(scheduler) => match self.inner.context.upgrade() {
					Some(context) => scheduler(trigger, &record, context.as_ref()),
					None => {
						trigger.purge();
						Box::new(|| {})
					}
				},
			};

			// The scheduler may have already run the purge, or a hold may have cancelled it.
			let orphaned = {
				let mut state = self.inner.state.lock();
				match state.scheduled_purges.get_mut(&hash) {
					Some(scheduled) if scheduled.id == id => {
						scheduled.canceller = Some(canceller);
						None
					}
					_ => Some(canceller),
				}
			};
			if let Some(cancel) = orphaned {
				cancel();
			}
		}
	}

	/// Immediately evicts every record in this namespace.
	///
	/// Each effect cleanup runs exactly once and every scheduled purge is
	/// cancelled. Hold counts are kept. Results of fetches still in flight are
	/// discarded when they arrive. Keys with live subscriptions are
	/// fetched again right away, so subscribers see one batched notification
	/// with pending records followed by the fetch result.
	pub fn purge(&self) {
		let subscribed = self.evict_all();
		if !subscribed.is_empty() {
			self.fetch_keys(subscribed);
		}
	}

	/// Evicts everything, returning the keys that still have subscriptions.
	pub(crate) fn evict_all(&self) -> Vec<K> {
		let (cancellers, cleanups, evicted, subscribed) = {
			let mut guard = self.inner.state.lock();
			let state = &mut *guard;

			let cancellers: Vec<Canceller> = state
				.scheduled_purges
				.drain()
				.filter_map(|(_, scheduled)| scheduled.canceller)
				.collect();
			let cleanups: HashMap<String, Cleanup> = state.effect_cleanups.drain().collect();
			// Outstanding batches no longer own their hashes; settle drops their results.
			state.fetches.clear();

			let evicted = self.inner.records.swap(Arc::new(HashMap::new()));
			let subscribed: Vec<K> = evicted
				.iter()
				.filter(|(hash, _)| state.subscriptions.contains_key(*hash))
				.map(|(_, record)| record.key.clone())
				.collect();
			(cancellers, cleanups, evicted, subscribed)
		};

		for cancel in cancellers {
			cancel();
		}
		for (_, cleanup) in cleanups {
			cleanup();
		}

		tracing::debug!(records = evicted.len(), "purged namespace");
		for hash in evicted.keys() {
			let _ = self.inner.events.send(StoreEvent::Purged { hash: hash.clone() });
		}
		subscribed
	}
}
