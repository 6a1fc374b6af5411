/* src/lib.rs */

//! Keyed, namespaced data cache with batched fetching and subscriptions.
//!
//! A [`Store`] maps keys to [`Record`] snapshots. Records are fetched on
//! demand in batches, kept alive by holds and subscriptions, and purged once
//! nobody needs them. Components:
//!
//! - **store**: [`NamespacedStore`], one isolated cache with its fetch
//!   dispatcher, hold counts, purge scheduling, subscriptions and effects.
//! - **handle**: [`DocumentHandle`] and [`ListHandle`], the per-key and
//!   per-key-list facades implementing [`Handle`].
//! - **namespace**: [`Store`], the root namespace plus one namespace per
//!   context object.
//!
//! ## Feature Flags
//!
//! - `full`: Enables all features.
//! - `json` (default): [`json_hash`], `Store::json_builder` and JSON
//!   state extraction/hydration.
//! - `stream`: [`Handle::watch`] returning a [`RecordStream`].
//!
//! ## Basic Usage
//!
//! ```no_run
//! use mirror::{Handle, Store};
//!
//! # async fn run() -> Result<(), mirror::StoreError> {
//! let store = Store::<u64, u64, ()>::builder()
//! 	.context(())
//! 	.hash_with(|id: &u64| id.to_string())
//! 	.fetch(|id, _ctx, _store| async move { Ok::<_, mirror::FetchError>(id * 2) })
//! 	.build()?;
//!
//! let record = store.key(1).get().await?;
//! assert_eq!(record.data, Some(2));
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod event;
mod handle;
mod namespace;
mod record;
mod store;

pub use config::{
	Canceller, Cleanup, DEFAULT_EVENT_CAPACITY, DEFAULT_PURGE_DELAY, DEFAULT_PURGE_GRACE,
	PurgePolicy, StoreBuilder,
};
#[cfg(feature = "json")]
pub use config::json_hash;
pub use error::{FetchError, StoreError};
pub use event::StoreEvent;
pub use handle::{DocumentHandle, Handle, Hold, ListHandle, Subscription};
#[cfg(feature = "stream")]
pub use handle::RecordStream;
pub use namespace::Store;
pub use record::{Failure, ListRecord, Record};
pub use store::{NamespacedStore, PurgeTrigger};
