/* tests/handle_tests.rs */

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use mirror::{FetchError, Handle, Store, StoreError};

fn store() -> Store<u64, u64, ()> {
	Store::builder()
		.context(())
		.hash_with(|id: &u64| id.to_string())
		.fetch(|id: u64, _ctx, _store| async move {
			if id == 0 {
				Err(FetchError::failed("zero"))
			} else {
				Ok(id * 2)
			}
		})
		.build()
		.unwrap()
}

#[tokio::test]
async fn test_list_get_keeps_key_order() {
	let store = store();

	let list = store.keys(vec![1, 2]).get().await.unwrap();

	assert_eq!(list.key, vec![1, 2]);
	assert_eq!(list.data.len(), 2);
	assert_eq!(list.data[0].key, 1);
	assert_eq!(list.data[1].data, Some(4));
	assert!(list.primed);
	assert!(!list.pending);
	assert!(list.failure.is_none());
}

#[tokio::test]
async fn test_list_reports_first_member_failure() {
	let store = store();
	store.key(1).update(10).unwrap();

	let err = store.keys(vec![1, 0]).get().await.unwrap_err();
	assert!(matches!(err, StoreError::Fetch(FetchError::Failed(reason)) if reason == "zero"));

	let list = store.keys(vec![1, 0]).get_latest();
	assert!(!list.primed);
	assert_eq!(list.data[0].data, Some(10));
	assert_eq!(
		list.failure.map(|failure| failure.reason),
		Some(FetchError::failed("zero"))
	);
}

#[tokio::test]
async fn test_list_get_latest_stores_missing_members() {
	let store = store();
	store.key(2).update(3).unwrap();

	let list = store.keys(vec![1, 2]).get_latest();

	assert!(!list.primed);
	assert!(list.pending);
	assert_eq!(list.data[1].data, Some(3));
	let mut known = store.known_keys();
	known.sort();
	assert_eq!(known, vec![1, 2]);
}

#[tokio::test]
async fn test_list_update_checks_length() {
	let store = store();
	let list = store.keys(vec![1, 2]);

	let err = list.update(vec![1]).unwrap_err();
	assert!(matches!(
		err,
		StoreError::LengthMismatch {
			expected: 2,
			actual: 1
		}
	));
	assert!(store.root().is_empty());

	list.update(vec![7, 8]).unwrap();
	assert_eq!(list.get_latest().values(), Some(vec![&7, &8]));
}

#[tokio::test]
async fn test_list_update_with_requires_every_member() {
	let store = store();
	store.key(1).update(1).unwrap();
	let list = store.keys(vec![1, 2]);

	let err = list
		.update_with(|values, _keys| values.iter().map(|v| v + 1).collect())
		.unwrap_err();
	assert!(matches!(err, StoreError::MissingData { hash } if hash == "2"));
	assert_eq!(store.key(1).get_latest().data, Some(1));

	list.get().await.unwrap();
	list.update_with(|values, keys| values.iter().zip(keys).map(|(v, k)| v + k).collect())
		.unwrap();
	assert_eq!(list.get_latest().values(), Some(vec![&2, &6]));
}

#[tokio::test]
async fn test_list_subscription_notified_once_per_commit() {
	let store = store();
	let calls = Arc::new(AtomicUsize::new(0));
	let counter = Arc::clone(&calls);
	let list = store.keys(vec![1, 2]);
	list.update(vec![1, 1]).unwrap();

	let _subscription = list.subscribe(move |_| {
		counter.fetch_add(1, Ordering::SeqCst);
	});
	list.update(vec![2, 2]).unwrap();

	assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unsubscribe_stops_notifications() {
	let store = store();
	let calls = Arc::new(AtomicUsize::new(0));
	let counter = Arc::clone(&calls);
	let handle = store.key(1);
	handle.update(1).unwrap();

	let subscription = handle.subscribe(move |_| {
		counter.fetch_add(1, Ordering::SeqCst);
	});
	handle.update(2).unwrap();
	assert_eq!(store.root().hold_count(&1), 1);

	subscription.unsubscribe();
	handle.update(3).unwrap();

	assert_eq!(calls.load(Ordering::SeqCst), 1);
	assert_eq!(store.root().hold_count(&1), 0);
}

#[cfg(feature = "stream")]
#[tokio::test]
async fn test_watch_streams_until_primed() {
	use futures_util::StreamExt;

	let store = store();
	let mut stream = store.key(1).watch();

	let first = stream.next().await.unwrap();
	assert!(!first.primed);

	let mut latest = first;
	while !latest.primed {
		latest = stream.next().await.unwrap();
	}
	assert_eq!(latest.data, Some(2));
	assert!(!latest.pending);
}
