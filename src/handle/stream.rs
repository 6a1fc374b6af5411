/* src/handle/stream.rs */

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::Subscription;

/// Snapshots of a handle as an async stream. Dropping it unsubscribes.
pub struct RecordStream<T> {
	inner: UnboundedReceiverStream<T>,
	_subscription: Subscription,
}

impl<T> RecordStream<T> {
	pub(crate) fn new(rx: mpsc::UnboundedReceiver<T>, subscription: Subscription) -> Self {
		Self {
			inner: UnboundedReceiverStream::new(rx),
			_subscription: subscription,
		}
	}
}

impl<T> Stream for RecordStream<T> {
	type Item = T;

	fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		Pin::new(&mut self.inner).poll_next(cx)
	}
}
