/* src/namespace.rs */

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::store::{ContextRef, NamespacedStore};
use crate::{DocumentHandle, ListHandle, Record, StoreBuilder, StoreEvent};

struct Registered<D, K, C> {
	context: Weak<C>,
	store: NamespacedStore<D, K, C>,
}

/// The root namespace plus every namespace derived from it by context.
///
/// Namespaces share the root's hashing, fetch, effect and purge
/// configuration but nothing else. A namespace is looked up by the identity
/// of its context `Arc` and is reclaimed once that context is dropped.
pub struct Store<D, K, C> {
	root: NamespacedStore<D, K, C>,
	context: Arc<C>,
	config: Arc<Config<D, K, C>>,
	namespaces: Mutex<HashMap<usize, Registered<D, K, C>>>,
}

fn identity<C>(context: &Arc<C>) -> usize {
	Arc::as_ptr(context) as *const () as usize
}

impl<D, K, C> Store<D, K, C>
where
	D: Clone + Send + Sync + 'static,
	K: Clone + Send + Sync + 'static,
	C: Send + Sync + 'static,
{
	pub fn builder() -> StoreBuilder<D, K, C> {
		StoreBuilder::new()
	}

	pub(crate) fn new(config: Arc<Config<D, K, C>>, context: C) -> Self {
		let context = Arc::new(context);
		let root = NamespacedStore::new(Arc::clone(&config), ContextRef::Owned(Arc::clone(&context)));
		Self {
			root,
			context,
			config,
			namespaces: Mutex::new(HashMap::new()),
		}
	}

	/// The namespace bound to `context`, created on first use.
	///
	/// The same `Arc` (or a clone of it) always yields the same namespace.
	/// Namespaces whose context has been dropped are reclaimed here.
	pub fn namespace(&self, context: &Arc<C>) -> NamespacedStore<D, K, C> {
		let id = identity(context);
		let (store, reclaimed) = {
			let mut namespaces = self.namespaces.lock();
			let mut reclaimed = Vec::new();
			namespaces.retain(|_, registered| {
				let alive = registered.context.strong_count() > 0;
				if !alive {
					reclaimed.push(registered.store.clone());
				}
				alive
			});

			let store = match namespaces.get(&id) {
				Some(registered) => registered.store.clone(),
				None => {
					let store = NamespacedStore::new(
						Arc::clone(&self.config),
						ContextRef::Borrowed(Arc::downgrade(context)),
					);
					namespaces.insert(
						id,
						Registered {
							context: Arc::downgrade(context),
							store: store.clone(),
						},
					);
					tracing::debug!(namespaces = namespaces.len(), "created namespace");
					store
				}
			};
			(store, reclaimed)
		};

		for namespace in reclaimed {
			namespace.evict_all();
			tracing::debug!("reclaimed namespace of dropped context");
		}
		store
	}

	/// Disposes of the namespace bound to `context`, evicting its records.
	///
	/// Returns false if no such namespace was registered. Handles still
	/// pointing at the namespace keep working against an empty cache.
	pub fn forget_namespace(&self, context: &Arc<C>) -> bool {
		let removed = self.namespaces.lock().remove(&identity(context));
		match removed {
			Some(registered) => {
				registered.store.evict_all();
				tracing::debug!("forgot namespace");
				true
			}
			None => false,
		}
	}

	/// Number of registered namespaces, excluding the root.
	pub fn namespace_count(&self) -> usize {
		self.namespaces.lock().len()
	}

	/// The root namespace, bound to the builder's context.
	pub fn root(&self) -> &NamespacedStore<D, K, C> {
		&self.root
	}

	pub fn context(&self) -> &Arc<C> {
		&self.context
	}

	pub fn key(&self, key: K) -> DocumentHandle<D, K, C> {
		self.root.key(key)
	}

	pub fn keys(&self, keys: Vec<K>) -> ListHandle<D, K, C> {
		self.root.keys(keys)
	}

	pub fn extract_state(&self) -> HashMap<String, Record<D, K>> {
		self.root.extract_state()
	}

	pub fn hydrate_from_state(&self, state: HashMap<String, Record<D, K>>) {
		self.root.hydrate_from_state(state);
	}

	pub fn known_keys(&self) -> Vec<K> {
		self.root.known_keys()
	}

	/// Purges the root namespace only.
	pub fn purge(&self) {
		self.root.purge();
	}

	pub fn events(&self) -> broadcast::Receiver<StoreEvent> {
		self.root.events()
	}
}

#[cfg(feature = "json")]
impl<D, K, C> Store<D, K, C>
where
	D: Clone + Send + Sync + 'static,
	K: Clone + Send + Sync + serde::Serialize + 'static,
	C: Send + Sync + 'static,
{
	/// A builder with [`json_hash`](crate::json_hash) preset as the key hash.
	///
	/// Keys that fail to serialize all hash to the empty string and alias one
	/// record; set [`hash_with`](StoreBuilder::hash_with) for such key types.
	pub fn json_builder() -> StoreBuilder<D, K, C> {
		StoreBuilder::new().hash_with(crate::json_hash::<K>)
	}
}

impl<D, K, C> std::fmt::Debug for Store<D, K, C> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Store")
			.field("root", &self.root)
			.field("namespaces", &self.namespaces.lock().len())
			.finish_non_exhaustive()
	}
}
