/* tests/namespace_tests.rs */

use std::sync::Arc;

use mirror::{FetchError, Handle, Store, StoreError};

struct Multiplier {
	factor: u64,
}

fn store() -> Store<u64, u64, Multiplier> {
	Store::builder()
		.context(Multiplier { factor: 1 })
		.hash_with(|id: &u64| id.to_string())
		.fetch(|id: u64, ctx: Arc<Multiplier>, _store| async move {
			Ok::<_, FetchError>(id * ctx.factor)
		})
		.build()
		.unwrap()
}

#[tokio::test]
async fn test_namespaces_cache_independently() {
	let store = store();
	let double = Arc::new(Multiplier { factor: 2 });
	let triple = Arc::new(Multiplier { factor: 3 });

	let a = store.namespace(&double).key(1).get().await.unwrap();
	let b = store.namespace(&triple).key(1).get().await.unwrap();
	let root = store.key(1).get().await.unwrap();

	assert_eq!(a.data, Some(2));
	assert_eq!(b.data, Some(3));
	assert_eq!(root.data, Some(1));
	assert_eq!(store.namespace_count(), 2);
}

#[tokio::test]
async fn test_same_context_same_namespace() {
	let store = store();
	let context = Arc::new(Multiplier { factor: 2 });

	let first = store.namespace(&context);
	let second = store.namespace(&Arc::clone(&context));
	let other = store.namespace(&Arc::new(Multiplier { factor: 2 }));

	assert!(first.ptr_eq(&second));
	assert!(!first.ptr_eq(&other));
	assert!(!first.ptr_eq(store.root()));
}

#[tokio::test]
async fn test_dropped_context_is_reclaimed() {
	let store = store();
	let context = Arc::new(Multiplier { factor: 2 });
	let orphan = store.namespace(&context);
	orphan.key(1).update(1).unwrap();
	drop(context);

	let live = Arc::new(Multiplier { factor: 3 });
	store.namespace(&live);

	assert_eq!(store.namespace_count(), 1);
	assert!(orphan.is_empty());
	let err = orphan.key(5).get().await.unwrap_err();
	assert!(matches!(err, StoreError::Fetch(FetchError::ContextDropped)));
}

#[tokio::test]
async fn test_forget_namespace() {
	let store = store();
	let context = Arc::new(Multiplier { factor: 2 });
	let namespace = store.namespace(&context);
	namespace.key(1).get().await.unwrap();

	assert!(store.forget_namespace(&context));
	assert!(!store.forget_namespace(&context));
	assert_eq!(store.namespace_count(), 0);
	assert!(namespace.is_empty());
	assert!(!store.namespace(&context).ptr_eq(&namespace));
}

#[tokio::test]
async fn test_root_supports_list_handles() {
	let store = store();

	let list = store.keys(vec![1, 2]).get().await.unwrap();

	assert_eq!(list.values(), Some(vec![&1, &2]));
	assert!(Arc::ptr_eq(store.root().context().as_ref().unwrap(), store.context()));
}
