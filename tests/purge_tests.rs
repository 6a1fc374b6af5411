/* tests/purge_tests.rs */

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use mirror::{Canceller, FetchError, Handle, PurgeTrigger, Record, Store};
use parking_lot::Mutex;

/// Purges as soon as a record loses its last hold, counting effect cleanups.
fn immediate_store(cleanups: Arc<AtomicUsize>) -> Store<u64, u64, ()> {
	Store::builder()
		.context(())
		.hash_with(|id: &u64| id.to_string())
		.fetch(|id: u64, _ctx, _store| async move { Ok::<_, FetchError>(id * 2) })
		.effect(move |_record, _ctx| {
			let cleanups = Arc::clone(&cleanups);
			Some(Box::new(move || {
				cleanups.fetch_add(1, Ordering::SeqCst);
			}))
		})
		.purge_with(|trigger: PurgeTrigger, _record: &Record<u64, u64>, _ctx: &()| {
			trigger.purge();
			Box::new(|| {})
		})
		.build()
		.unwrap()
}

#[tokio::test]
async fn test_immediate_purge_runs_cleanup_once() {
	let cleanups = Arc::new(AtomicUsize::new(0));
	let store = immediate_store(Arc::clone(&cleanups));

	store.key(1).get().await.unwrap();
	// Cleanups of replaced effect runs, before the purge.
	let before = cleanups.load(Ordering::SeqCst);
	tokio::time::sleep(Duration::from_millis(10)).await;

	assert!(!store.extract_state().contains_key("1"));
	assert_eq!(cleanups.load(Ordering::SeqCst), before + 1);
}

#[tokio::test]
async fn test_release_and_reacquire_in_same_step_keeps_record() {
	let cleanups = Arc::new(AtomicUsize::new(0));
	let store = immediate_store(Arc::clone(&cleanups));
	let handle = store.key(1);

	let first = handle.hold();
	handle.update(1).unwrap();
	first.release();
	let second = handle.hold();
	tokio::time::sleep(Duration::from_millis(10)).await;

	assert_eq!(handle.get_latest().data, Some(1));
	assert_eq!(cleanups.load(Ordering::SeqCst), 0);

	drop(second);
	tokio::time::sleep(Duration::from_millis(10)).await;

	assert!(store.extract_state().is_empty());
	assert_eq!(cleanups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fixed_delay_purge() {
	let store = Store::<u64, u64, ()>::builder()
		.context(())
		.hash_with(|id: &u64| id.to_string())
		.purge_after(Duration::from_millis(50))
		.build()
		.unwrap();

	store.key(1).update(1).unwrap();
	tokio::time::sleep(Duration::from_millis(10)).await;
	assert_eq!(store.root().len(), 1);

	tokio::time::sleep(Duration::from_millis(100)).await;
	assert!(store.root().is_empty());
}

#[tokio::test]
async fn test_hold_cancels_fixed_delay_purge() {
	let store = Store::<u64, u64, ()>::builder()
		.context(())
		.hash_with(|id: &u64| id.to_string())
		.purge_after(Duration::from_millis(30))
		.build()
		.unwrap();
	let handle = store.key(1);

	handle.update(1).unwrap();
	let hold = handle.hold();
	tokio::time::sleep(Duration::from_millis(60)).await;

	assert_eq!(store.root().len(), 1);
	assert_eq!(store.root().hold_count(&1), 1);
	drop(hold);
	assert_eq!(store.root().hold_count(&1), 0);
}

#[tokio::test]
async fn test_cancelled_trigger_is_noop() {
	let triggers: Arc<Mutex<Vec<PurgeTrigger>>> = Arc::new(Mutex::new(Vec::new()));
	let cancelled = Arc::new(AtomicBool::new(false));
	let stash = Arc::clone(&triggers);
	let flag = Arc::clone(&cancelled);
	let store = Store::<u64, u64, ()>::builder()
		.context(())
		.hash_with(|id: &u64| id.to_string())
		.purge_with(move |trigger: PurgeTrigger, _record: &Record<u64, u64>, _ctx: &()| {
			stash.lock().push(trigger);
			let flag = Arc::clone(&flag);
			let cancel: Canceller = Box::new(move || flag.store(true, Ordering::SeqCst));
			cancel
		})
		.build()
		.unwrap();
	let handle = store.key(1);

	handle.update(1).unwrap();
	let hold = handle.hold();
	assert!(cancelled.load(Ordering::SeqCst));

	let stale = triggers.lock().remove(0);
	assert_eq!(stale.hash(), "1");
	stale.purge();
	tokio::time::sleep(Duration::from_millis(10)).await;
	assert_eq!(store.root().len(), 1);

	drop(hold);
	let fresh = triggers.lock().remove(0);
	fresh.purge();
	fresh.purge();
	tokio::time::sleep(Duration::from_millis(10)).await;
	assert!(store.root().is_empty());
}

#[tokio::test]
async fn test_namespace_purge_refetches_subscribed_keys() {
	let calls = Arc::new(AtomicUsize::new(0));
	let active = Arc::new(AtomicUsize::new(0));
	let counter = Arc::clone(&calls);
	let effects = Arc::clone(&active);
	let store = Store::<u64, u64, ()>::builder()
		.context(())
		.hash_with(|id: &u64| id.to_string())
		.fetch(move |id: u64, _ctx, _store| {
			counter.fetch_add(1, Ordering::SeqCst);
			async move { Ok::<_, FetchError>(id * 2) }
		})
		.effect(move |_record, _ctx| {
			effects.fetch_add(1, Ordering::SeqCst);
			let effects = Arc::clone(&effects);
			Some(Box::new(move || {
				effects.fetch_sub(1, Ordering::SeqCst);
			}))
		})
		.purge_after(Duration::from_secs(3600))
		.build()
		.unwrap();
	let subscribed = store.key(1);
	let _subscription = subscribed.subscribe(|_| {});
	subscribed.get().await.unwrap();
	store.key(2).update(5).unwrap();
	assert_eq!(active.load(Ordering::SeqCst), 2);

	store.purge();

	// Only the refetched key is back, pending; each evicted effect was cleaned up.
	assert_eq!(store.known_keys(), vec![1]);
	assert!(subscribed.get_latest().pending);
	assert_eq!(active.load(Ordering::SeqCst), 1);

	tokio::time::sleep(Duration::from_millis(20)).await;
	assert_eq!(calls.load(Ordering::SeqCst), 2);
	assert_eq!(subscribed.get_latest().data, Some(2));
	assert_eq!(active.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_namespace_purge_discards_in_flight_fetch() {
	let calls = Arc::new(AtomicUsize::new(0));
	let counter = Arc::clone(&calls);
	let store = Store::<u64, u64, ()>::builder()
		.context(())
		.hash_with(|id: &u64| id.to_string())
		.fetch(move |_id: u64, _ctx, _store| {
			let call = counter.fetch_add(1, Ordering::SeqCst) as u64 + 1;
			// The first fetch lands well before the second.
			let delay = Duration::from_millis(if call == 1 { 40 } else { 120 });
			async move {
				tokio::time::sleep(delay).await;
				Ok::<_, FetchError>(call)
			}
		})
		.purge_after(Duration::from_secs(3600))
		.build()
		.unwrap();
	let handle = store.key(1);
	let notifications = Arc::new(AtomicUsize::new(0));
	let notified = Arc::clone(&notifications);
	let _subscription = handle.subscribe(move |_| {
		notified.fetch_add(1, Ordering::SeqCst);
	});
	tokio::time::sleep(Duration::from_millis(10)).await;
	let before = notifications.load(Ordering::SeqCst);

	store.purge();

	assert_eq!(store.known_keys(), vec![1]);
	assert!(handle.get_latest().pending);
	assert!(store.root().is_fetching(&1));
	assert_eq!(notifications.load(Ordering::SeqCst), before + 1);
	assert_eq!(calls.load(Ordering::SeqCst), 2);

	tokio::time::sleep(Duration::from_millis(60)).await;
	assert!(handle.get_latest().pending);
	assert!(handle.get_latest().data.is_none());

	tokio::time::sleep(Duration::from_millis(100)).await;
	let record = handle.get_latest();
	assert_eq!(record.data, Some(2));
	assert!(!record.pending);
	assert!(!store.root().is_fetching(&1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rehold_in_same_step_survives_multi_thread_runtime() {
	let store = immediate_store(Arc::new(AtomicUsize::new(0)));
	let mut holds = Vec::new();

	for id in 0..500 {
		let handle = store.key(id);
		let first = handle.hold();
		handle.update(id).unwrap();
		first.release();
		holds.push(handle.hold());
	}
	tokio::time::sleep(Duration::from_millis(50)).await;

	assert_eq!(store.root().len(), 500);
	drop(holds);
	tokio::time::sleep(Duration::from_millis(50)).await;
	assert!(store.root().is_empty());
}
