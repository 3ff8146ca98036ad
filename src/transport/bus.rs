//! Multicast notification bus
//!
//! Every subscriber owns an unbounded queue, so a slow consumer never blocks
//! the publisher or other subscribers and nothing is dropped under load.
//! Items are delivered to each subscriber in publish order.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// Broadcast channel with independent per-subscriber queues
pub struct Bus<T> {
    inner: Arc<BusInner<T>>,
}

struct BusInner<T> {
    name: &'static str,
    next_id: AtomicU64,
    subscribers: Mutex<Vec<Subscriber<T>>>,
}

struct Subscriber<T> {
    id: u64,
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for Bus<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> Bus<T> {
    /// Create an empty bus; `name` only shows up in traces
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            inner: Arc::new(BusInner {
                name,
                next_id: AtomicU64::new(0),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Receive every item published from now on
    #[must_use]
    pub fn subscribe(&self) -> Subscription<T> {
        self.register(None)
    }

    /// Subscribe with `initial` queued ahead of any later publish
    pub(crate) fn subscribe_with_initial(&self, initial: T) -> Subscription<T> {
        self.register(Some(initial))
    }

    fn register(&self, initial: Option<T>) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        let mut subscribers = self.inner.subscribers.lock();
        if let Some(initial) = initial {
            // receiver is alive, cannot fail
            let _ = tx.send(initial);
        }
        subscribers.push(Subscriber { id, tx });
        trace!(bus = self.inner.name, id, subscribers = subscribers.len(), "subscribed");
        drop(subscribers);

        Subscription {
            rx,
            handle: SubscriptionHandle {
                id,
                active: Arc::new(AtomicBool::new(true)),
                bus: Arc::downgrade(&self.inner),
            },
        }
    }

    /// Deliver `item` to every current subscriber in subscription order
    ///
    /// Returns the number of subscribers the item was queued for.
    pub fn publish(&self, item: T) -> usize {
        let mut subscribers = self.inner.subscribers.lock();
        subscribers.retain(|subscriber| subscriber.tx.send(item.clone()).is_ok());
        let delivered = subscribers.len();
        trace!(bus = self.inner.name, subscribers = delivered, "published");
        delivered
    }

    /// Number of registered subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }
}

impl<T: Clone + Send + 'static> Bus<T> {
    /// Run `handler` for every item on its own task
    ///
    /// The handler is awaited before the next item is taken, but never holds
    /// up the publisher or other subscribers.
    pub fn spawn_listener<F, Fut>(&self, runtime: &Handle, mut handler: F) -> Listener<T>
    where
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut subscription = self.subscribe();
        let handle = subscription.handle();

        let task = runtime.spawn(async move {
            while let Some(item) = subscription.recv().await {
                handler(item).await;
            }
        });

        Listener {
            handle: Some(handle),
            task,
        }
    }
}

/// Detachable reference to a subscription
///
/// Can be cloned into a handler to unsubscribe from inside a delivery.
pub struct SubscriptionHandle<T> {
    id: u64,
    active: Arc<AtomicBool>,
    bus: Weak<BusInner<T>>,
}

impl<T> Clone for SubscriptionHandle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            active: Arc::clone(&self.active),
            bus: Weak::clone(&self.bus),
        }
    }
}

impl<T> SubscriptionHandle<T> {
    /// Stop delivery; idempotent
    ///
    /// Items already queued but not yet received are discarded.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(bus) = self.bus.upgrade() {
            let mut subscribers = bus.subscribers.lock();
            subscribers.retain(|subscriber| subscriber.id != self.id);
            trace!(bus = bus.name, id = self.id, subscribers = subscribers.len(), "unsubscribed");
        }
    }

    /// Check whether the subscription still receives items
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Receiving end of a bus subscription
///
/// Dropping the subscription unsubscribes it.
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
    handle: SubscriptionHandle<T>,
}

impl<T> Subscription<T> {
    /// Next item, or `None` once unsubscribed or the bus is gone
    pub async fn recv(&mut self) -> Option<T> {
        if !self.handle.is_active() {
            return None;
        }
        let item = self.rx.recv().await?;
        self.handle.is_active().then_some(item)
    }

    /// Next item if one is already queued
    pub fn try_recv(&mut self) -> Option<T> {
        if !self.handle.is_active() {
            return None;
        }
        self.rx.try_recv().ok()
    }

    /// Handle for unsubscribing from elsewhere
    #[must_use]
    pub fn handle(&self) -> SubscriptionHandle<T> {
        self.handle.clone()
    }

    /// Stop delivery; idempotent
    pub fn unsubscribe(&self) {
        self.handle.unsubscribe();
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.handle.unsubscribe();
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        if !self.handle.is_active() {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(item)) if self.handle.is_active() => Poll::Ready(Some(item)),
            Poll::Ready(_) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Subscriber running on its own task
///
/// Dropping the listener unsubscribes it; use [`Listener::detach`] to keep it
/// running for the lifetime of the bus.
pub struct Listener<T> {
    handle: Option<SubscriptionHandle<T>>,
    task: JoinHandle<()>,
}

impl<T> Listener<T> {
    /// Stop delivery; idempotent
    pub fn unsubscribe(&self) {
        if let Some(handle) = &self.handle {
            handle.unsubscribe();
        }
    }

    /// Check whether the listener task has exited
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Keep listening after this value is dropped
    pub fn detach(mut self) {
        self.handle = None;
    }
}

impl<T> Drop for Listener<T> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[test]
    fn test_publish_fans_out_in_order() {
        let bus = Bus::new("test");
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        assert_eq!(bus.publish(1), 2);
        assert_eq!(bus.publish(2), 2);

        assert_eq!(first.try_recv(), Some(1));
        assert_eq!(first.try_recv(), Some(2));
        assert_eq!(second.try_recv(), Some(1));
        assert_eq!(second.try_recv(), Some(2));
        assert_eq!(first.try_recv(), None);
    }

    #[test]
    fn test_no_replay_for_late_subscribers() {
        let bus = Bus::new("test");
        bus.publish(1);
        let mut late = bus.subscribe();
        assert_eq!(late.try_recv(), None);
        bus.publish(2);
        assert_eq!(late.try_recv(), Some(2));
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bus = Bus::new("test");
        let mut subscription = bus.subscribe();
        let handle = subscription.handle();
        bus.publish(1);

        handle.unsubscribe();
        handle.unsubscribe();
        subscription.unsubscribe();

        assert_eq!(bus.subscriber_count(), 0);
        assert!(!handle.is_active());
        // queued item is discarded
        assert_eq!(subscription.try_recv(), None);
        assert_eq!(bus.publish(2), 0);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = Bus::<u8>::new("test");
        let subscription = bus.subscribe();
        let _other = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
        drop(subscription);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_initial_value_precedes_publishes() {
        let bus = Bus::new("test");
        let mut subscription = bus.subscribe_with_initial(0);
        bus.publish(1);
        assert_eq!(subscription.try_recv(), Some(0));
        assert_eq!(subscription.try_recv(), Some(1));
    }

    #[tokio::test]
    async fn test_stream_combinators() {
        let bus = Bus::new("test");
        let subscription = bus.subscribe();
        for value in 1..=6 {
            bus.publish(value);
        }
        drop(bus);

        let evens: Vec<i32> = subscription.filter(|v| futures::future::ready(v % 2 == 0)).collect().await;
        assert_eq!(evens, vec![2, 4, 6]);
    }

    #[tokio::test]
    async fn test_slow_listener_does_not_block_others() {
        let bus = Bus::new("test");
        let gate = Arc::new(Notify::new());

        let slow_gate = Arc::clone(&gate);
        let _slow = bus.spawn_listener(&Handle::current(), move |_: u32| {
            let gate = Arc::clone(&slow_gate);
            async move { gate.notified().await }
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _fast = bus.spawn_listener(&Handle::current(), move |value: u32| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(value);
            }
        });

        for value in 0..100 {
            bus.publish(value);
        }

        for expected in 0..100 {
            let value = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("fast listener stalled");
            assert_eq!(value, Some(expected));
        }
        gate.notify_waiters();
    }

    #[tokio::test]
    async fn test_unsubscribe_from_inside_handler() {
        let bus = Bus::new("test");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let slot: Arc<Mutex<Option<SubscriptionHandle<u32>>>> = Arc::new(Mutex::new(None));

        let handler_slot = Arc::clone(&slot);
        let listener = bus.spawn_listener(&Handle::current(), move |value: u32| {
            let tx = tx.clone();
            if let Some(handle) = handler_slot.lock().as_ref() {
                handle.unsubscribe();
            }
            async move {
                let _ = tx.send(value);
            }
        });
        *slot.lock() = listener.handle.clone();

        bus.publish(1);
        bus.publish(2);

        assert_eq!(rx.recv().await, Some(1));
        // handler dropped its sender when the task ended
        assert_eq!(rx.recv().await, None);
        assert_eq!(bus.subscriber_count(), 0);
        assert!(!listener.handle.as_ref().is_some_and(SubscriptionHandle::is_active));
    }
}
