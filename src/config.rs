/* src/config.rs */

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture};

use crate::store::{NamespacedStore, PurgeTrigger};
use crate::{FetchError, Record, Store, StoreError};

/// Default delay between a record losing its last hold and its eviction.
pub const DEFAULT_PURGE_DELAY: Duration = Duration::from_secs(1);

/// Default wait before a triggered purge runs on a multi-threaded runtime.
///
/// On a current-thread runtime a triggered purge runs one scheduling step
/// later instead, which is enough for a hold released and re-acquired in the
/// same synchronous section to cancel it. Other worker threads may run the
/// purge task right away, so multi-threaded runtimes wait this long.
pub const DEFAULT_PURGE_GRACE: Duration = Duration::from_millis(10);

/// Default event channel capacity per namespace.
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Returned by an effect; runs before the next effect for the same hash, or at purge.
pub type Cleanup = Box<dyn FnOnce() + Send>;

/// Returned by a purge scheduler; cancels the scheduled purge.
pub type Canceller = Box<dyn FnOnce() + Send>;

pub type HashFn<K> = Arc<dyn Fn(&K) -> String + Send + Sync>;

pub type FetchManyFn<D, K, C> = Arc<
	dyn Fn(Vec<K>, Arc<C>, NamespacedStore<D, K, C>) -> BoxFuture<'static, Result<Vec<D>, FetchError>>
		+ Send
		+ Sync,
>;

pub type EffectFn<D, K, C> = Arc<dyn Fn(&Record<D, K>, &C) -> Option<Cleanup> + Send + Sync>;

pub type PurgeSchedulerFn<D, K, C> =
	Arc<dyn Fn(PurgeTrigger, &Record<D, K>, &C) -> Canceller + Send + Sync>;

/// How unheld records are evicted.
pub enum PurgePolicy<D, K, C> {
	/// Purge a fixed delay after the last hold is released.
	After(Duration),
	/// Hand the purge trigger to a caller-supplied scheduler.
	Custom(PurgeSchedulerFn<D, K, C>),
}

impl<D, K, C> Clone for PurgePolicy<D, K, C> {
	fn clone(&self) -> Self {
		match self {
			Self::After(delay) => Self::After(*delay),
			Self::Custom(scheduler) => Self::Custom(Arc::clone(scheduler)),
		}
	}
}

impl<D, K, C> Default for PurgePolicy<D, K, C> {
	fn default() -> Self {
		Self::After(DEFAULT_PURGE_DELAY)
	}
}

impl<D, K, C> std::fmt::Debug for PurgePolicy<D, K, C> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::After(delay) => f.debug_tuple("After").field(delay).finish(),
			Self::Custom(_) => f.write_str("Custom(..)"),
		}
	}
}

/// Configuration shared by the root store and every namespace derived from it.
pub(crate) struct Config<D, K, C> {
	pub(crate) hash: HashFn<K>,
	pub(crate) fetch_many: Option<FetchManyFn<D, K, C>>,
	pub(crate) effect: Option<EffectFn<D, K, C>>,
	pub(crate) purge: PurgePolicy<D, K, C>,
	pub(crate) purge_grace: Duration,
	pub(crate) event_capacity: usize,
}

/// Hashes strings to themselves and everything else to its JSON serialization.
///
/// Keys that cannot be serialized (maps with non-string keys, for instance)
/// all hash to the empty string and therefore share a single record. Use
/// [`StoreBuilder::hash_with`] for such key types.
#[cfg(feature = "json")]
pub fn json_hash<K: serde::Serialize>(key: &K) -> String {
	match serde_json::to_value(key) {
		Ok(serde_json::Value::String(hash)) => hash,
		Ok(value) => value.to_string(),
		Err(e) => {
			tracing::warn!(error = %e, "key is not serializable, hashing to empty string");
			String::new()
		}
	}
}

/// Builder for [`Store`].
pub struct StoreBuilder<D, K, C> {
	context: Option<C>,
	hash: Option<HashFn<K>>,
	fetch: Option<FetchManyFn<D, K, C>>,
	fetch_many: Option<FetchManyFn<D, K, C>>,
	effect: Option<EffectFn<D, K, C>>,
	purge: PurgePolicy<D, K, C>,
	purge_grace: Duration,
	event_capacity: usize,
}

impl<D, K, C> StoreBuilder<D, K, C>
where
	D: Clone + Send + Sync + 'static,
	K: Clone + Send + Sync + 'static,
	C: Send + Sync + 'static,
{
	pub fn new() -> Self {
		Self {
			context: None,
			hash: None,
			fetch: None,
			fetch_many: None,
			effect: None,
			purge: PurgePolicy::default(),
			purge_grace: DEFAULT_PURGE_GRACE,
			event_capacity: DEFAULT_EVENT_CAPACITY,
		}
	}

	/// Context of the root namespace.
	pub fn context(mut self, context: C) -> Self {
		self.context = Some(context);
		self
	}

	/// Sets the key hashing function. Equal keys must always produce equal hashes.
	pub fn hash_with<F>(mut self, hash: F) -> Self
	where
		F: Fn(&K) -> String + Send + Sync + 'static,
	{
		let hash: HashFn<K> = Arc::new(hash);
		self.hash = Some(hash);
		self
	}

	/// Sets a single-key fetch function. Batches run it once per key and fail together.
	pub fn fetch<F, Fut>(mut self, fetch: F) -> Self
	where
		F: Fn(K, Arc<C>, NamespacedStore<D, K, C>) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<D, FetchError>> + Send + 'static,
	{
		let fetch_many: FetchManyFn<D, K, C> = Arc::new(
			move |keys: Vec<K>, context: Arc<C>, store: NamespacedStore<D, K, C>| {
				let requests: Vec<Fut> = keys
					.into_iter()
					.map(|key| fetch(key, Arc::clone(&context), store.clone()))
					.collect();
				future::try_join_all(requests).boxed()
			},
		);
		self.fetch = Some(fetch_many);
		self
	}

	/// Sets a multi-key fetch function. Takes precedence over [`fetch`](Self::fetch).
	///
	/// The returned values must be in the same order as the requested keys.
	pub fn fetch_many<F, Fut>(mut self, fetch_many: F) -> Self
	where
		F: Fn(Vec<K>, Arc<C>, NamespacedStore<D, K, C>) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<Vec<D>, FetchError>> + Send + 'static,
	{
		let fetch_many: FetchManyFn<D, K, C> = Arc::new(
			move |keys: Vec<K>, context: Arc<C>, store: NamespacedStore<D, K, C>| {
				fetch_many(keys, context, store).boxed()
			},
		);
		self.fetch_many = Some(fetch_many);
		self
	}

	/// Runs `effect` on every record change. A returned cleanup runs before the
	/// next effect for the same hash, or when the record is purged.
	pub fn effect<F>(mut self, effect: F) -> Self
	where
		F: Fn(&Record<D, K>, &C) -> Option<Cleanup> + Send + Sync + 'static,
	{
		let effect: EffectFn<D, K, C> = Arc::new(effect);
		self.effect = Some(effect);
		self
	}

	/// Purges unheld records after a fixed delay.
	pub fn purge_after(mut self, delay: Duration) -> Self {
		self.purge = PurgePolicy::After(delay);
		self
	}

	/// Purges unheld records whenever `scheduler` fires the trigger it receives.
	pub fn purge_with<F>(mut self, scheduler: F) -> Self
	where
		F: Fn(PurgeTrigger, &Record<D, K>, &C) -> Canceller + Send + Sync + 'static,
	{
		let scheduler: PurgeSchedulerFn<D, K, C> = Arc::new(scheduler);
		self.purge = PurgePolicy::Custom(scheduler);
		self
	}

	/// Sets how long a triggered purge waits on a multi-threaded runtime.
	pub fn purge_grace(mut self, grace: Duration) -> Self {
		self.purge_grace = grace;
		self
	}

	/// Sets the event channel capacity of each namespace.
	pub fn event_capacity(mut self, capacity: usize) -> Self {
		self.event_capacity = capacity;
		self
	}

	pub fn build(self) -> Result<Store<D, K, C>, StoreError> {
		let context = self
			.context
			.ok_or_else(|| StoreError::Builder("context is required".to_string()))?;
		let hash = self
			.hash
			.ok_or_else(|| StoreError::Builder("hash function is required".to_string()))?;
		if self.event_capacity == 0 {
			return Err(StoreError::Builder(
				"event capacity must be greater than zero".to_string(),
			));
		}

		let config = Config {
			hash,
			fetch_many: self.fetch_many.or(self.fetch),
			effect: self.effect,
			purge: self.purge,
			purge_grace: self.purge_grace,
			event_capacity: self.event_capacity,
		};
		Ok(Store::new(Arc::new(config), context))
	}
}

impl<D, K, C> Default for StoreBuilder<D, K, C>
where
	D: Clone + Send + Sync + 'static,
	K: Clone + Send + Sync + 'static,
	C: Send + Sync + 'static,
{
	fn default() -> Self {
		Self::new()
	}
}
