/* src/handle/guard.rs */

type Release = Box<dyn FnOnce() + Send + Sync>;

/// Keeps records from being purged while alive.
///
/// Dropping the guard, or calling [`release`](Self::release), releases the
/// hold. Releasing twice is impossible by construction.
#[must_use = "the hold is released as soon as the guard is dropped"]
pub struct Hold {
	release: Option<Release>,
}

impl Hold {
	pub(crate) fn new<F>(release: F) -> Self
	where
		F: FnOnce() + Send + Sync + 'static,
	{
		Self {
			release: Some(Box::new(release)),
		}
	}

	/// Releases the hold now.
	pub fn release(mut self) {
		self.run();
	}

	fn run(&mut self) {
		if let Some(release) = self.release.take() {
			release();
		}
	}
}

impl Drop for Hold {
	fn drop(&mut self) {
		self.run();
	}
}

impl std::fmt::Debug for Hold {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Hold")
			.field("active", &self.release.is_some())
			.finish()
	}
}

/// An active subscription. Unsubscribes and releases its hold on drop.
#[must_use = "the subscription ends as soon as the guard is dropped"]
pub struct Subscription {
	unsubscribe: Option<Release>,
}

impl Subscription {
	pub(crate) fn new<F>(unsubscribe: F) -> Self
	where
		F: FnOnce() + Send + Sync + 'static,
	{
		Self {
			unsubscribe: Some(Box::new(unsubscribe)),
		}
	}

	pub fn unsubscribe(mut self) {
		self.run();
	}

	fn run(&mut self) {
		if let Some(unsubscribe) = self.unsubscribe.take() {
			unsubscribe();
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.run();
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription")
			.field("active", &self.unsubscribe.is_some())
			.finish()
	}
}
