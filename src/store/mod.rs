/* src/store/mod.rs */

mod commit;
mod fetch;
mod hold;
mod hydrate;
mod read;
mod subscribe;

pub use hold::PurgeTrigger;

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::config::{Canceller, Cleanup, Config};
use crate::{Record, StoreEvent};

/// Callback registered for an ordered set of hashes.
pub(crate) struct Listener<D, K> {
	pub(crate) id: u64,
	pub(crate) keys: Vec<K>,
	pub(crate) hashes: Vec<String>,
	pub(crate) callback: Box<dyn Fn(&[Record<D, K>]) + Send + Sync>,
}

pub(crate) struct ScheduledPurge {
	pub(crate) id: u64,
	pub(crate) canceller: Option<Canceller>,
}

/// Bookkeeping guarded by one lock. Every record write also happens under it.
pub(crate) struct State<D, K> {
	pub(crate) holds: HashMap<String, usize>,
	/// Hash to the id of the batch (or prediction) currently fetching it.
	pub(crate) fetches: HashMap<String, u64>,
	pub(crate) scheduled_purges: HashMap<String, ScheduledPurge>,
	pub(crate) subscriptions: HashMap<String, Vec<Arc<Listener<D, K>>>>,
	pub(crate) effect_cleanups: HashMap<String, Cleanup>,
	next_id: u64,
}

impl<D, K> State<D, K> {
	fn new() -> Self {
		Self {
			holds: HashMap::new(),
			fetches: HashMap::new(),
			scheduled_purges: HashMap::new(),
			subscriptions: HashMap::new(),
			effect_cleanups: HashMap::new(),
			next_id: 0,
		}
	}

	pub(crate) fn next_id(&mut self) -> u64 {
		self.next_id += 1;
		self.next_id
	}
}

/// The root namespace owns its context; registered namespaces only observe theirs.
pub(crate) enum ContextRef<C> {
	Owned(Arc<C>),
	Borrowed(Weak<C>),
}

impl<C> ContextRef<C> {
	pub(crate) fn upgrade(&self) -> Option<Arc<C>> {
		match self {
			Self::Owned(context) => Some(Arc::clone(context)),
			Self::Borrowed(context) => context.upgrade(),
		}
	}
}

pub(crate) struct Inner<D, K, C> {
	pub(crate) config: Arc<Config<D, K, C>>,
	pub(crate) context: ContextRef<C>,
	pub(crate) records: ArcSwap<HashMap<String, Record<D, K>>>,
	pub(crate) state: Mutex<State<D, K>>,
	pub(crate) events: broadcast::Sender<StoreEvent>,
}

/// One isolated cache: a hash to record map plus its holds, fetches,
/// scheduled purges, subscriptions and effect cleanups.
///
/// Records are read wait-free; writers serialize on the bookkeeping lock and
/// never hold it while running callbacks, so callbacks may re-enter the store.
/// Fetching and deferred purging spawn onto the current tokio runtime.
pub struct NamespacedStore<D, K, C> {
	pub(crate) inner: Arc<Inner<D, K, C>>,
}

impl<D, K, C> Clone for NamespacedStore<D, K, C> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<D, K, C> NamespacedStore<D, K, C>
where
	D: Clone + Send + Sync + 'static,
	K: Clone + Send + Sync + 'static,
	C: Send + Sync + 'static,
{
	pub(crate) fn new(config: Arc<Config<D, K, C>>, context: ContextRef<C>) -> Self {
		let events = broadcast::channel(config.event_capacity).0;
		Self {
			inner: Arc::new(Inner {
				config,
				context,
				records: ArcSwap::from_pointee(HashMap::new()),
				state: Mutex::new(State::new()),
				events,
			}),
		}
	}

	/// Returns true if both values refer to the same namespace.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}
}

impl<D, K, C> std::fmt::Debug for NamespacedStore<D, K, C> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let mut s = f.debug_struct("NamespacedStore");
		s.field("records", &self.inner.records.load().len());
		s.field("purge", &self.inner.config.purge);
		s.finish_non_exhaustive()
	}
}
