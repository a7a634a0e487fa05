//! In-process loopback implementation of the channel contract
//!
//! [`InMemoryBroker`] holds queues and direct-exchange bindings shared by any
//! number of [`InMemoryChannel`] endpoints. Routing follows broker
//! conventions: publishing to the default (empty) exchange targets the queue
//! named by the routing key, publishing to a named exchange delivers to every
//! queue bound under the routing key, and a mandatory publish reports whether
//! any queue accepted the message. Deliveries are only dispatched while a
//! channel's event processing is driven, mirroring how the request/response
//! layer is used against a real broker client.

use crate::communication::channel::{
    Delivery, DeliveryInfo, InboundHandler, MessageChannel, MessageProperties, SubscriptionHandle,
};
use crate::{BoxedError, EmptyResult};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{timeout, Instant};
use tracing::trace;

#[derive(Debug, Default)]
struct BrokerState {
    queues: HashMap<String, VecDeque<Delivery>>,
    bindings: HashMap<(String, String), Vec<String>>,
    acknowledged: Vec<u64>,
    next_delivery_tag: u64,
}

/// In-process message broker backing [`InMemoryChannel`] endpoints
///
/// All state sits behind one mutex with short, non-suspending critical
/// sections; arrivals are signalled to every waiting channel.
#[derive(Debug, Default)]
pub struct InMemoryBroker {
    state: Mutex<BrokerState>,
    arrivals: Notify,
}

impl InMemoryBroker {
    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a queue
    ///
    /// Publishing to the default exchange targets queues by name; declaring
    /// an existing queue is a no-op.
    pub fn declare_queue(&self, name: &str) {
        self.state().queues.entry(name.to_owned()).or_default();
    }

    /// Binds `queue` to `exchange` under `routing_key`
    ///
    /// Direct-exchange semantics: a publish to `exchange` with exactly
    /// `routing_key` is delivered to every queue bound this way. The queue is
    /// declared implicitly.
    pub fn bind(&self, exchange: &str, routing_key: &str, queue: &str) {
        let mut state = self.state();

        state.queues.entry(queue.to_owned()).or_default();
        state
            .bindings
            .entry((exchange.to_owned(), routing_key.to_owned()))
            .or_default()
            .push(queue.to_owned());
    }

    /// Number of messages currently waiting in `queue`
    pub fn queue_depth(&self, queue: &str) -> usize {
        self.state().queues.get(queue).map_or(0, VecDeque::len)
    }

    /// Delivery tags acknowledged so far, in acknowledgement order
    pub fn acknowledgements(&self) -> Vec<u64> {
        self.state().acknowledged.clone()
    }

    fn route(
        &self,
        exchange: &str,
        routing_key: &str,
        properties: &MessageProperties,
        body: &[u8],
    ) -> bool {
        let mut state = self.state();

        let targets: Vec<String> = if exchange.is_empty() {
            if state.queues.contains_key(routing_key) {
                vec![routing_key.to_owned()]
            } else {
                Vec::new()
            }
        } else {
            state
                .bindings
                .get(&(exchange.to_owned(), routing_key.to_owned()))
                .cloned()
                .unwrap_or_default()
        };

        if targets.is_empty() {
            return false;
        }

        for target in &targets {
            state.next_delivery_tag += 1;
            let delivery = Delivery {
                info: DeliveryInfo {
                    delivery_tag: state.next_delivery_tag,
                    exchange: exchange.to_owned(),
                    routing_key: routing_key.to_owned(),
                    redelivered: false,
                },
                properties: properties.clone(),
                body: body.to_vec(),
            };

            if let Some(queue) = state.queues.get_mut(target) {
                queue.push_back(delivery);
            }
        }

        drop(state);
        self.arrivals.notify_waiters();
        true
    }
}

/// Channel endpoint scoped to one inbound queue of an [`InMemoryBroker`]
pub struct InMemoryChannel {
    broker: Arc<InMemoryBroker>,
    inbound: String,
    handler: Mutex<Option<Arc<dyn InboundHandler>>>,
    subscriptions: AtomicU64,
}

impl InMemoryChannel {
    /// Attaches a channel to `broker`, declaring `inbound` as its
    /// subscription target
    pub fn attach(broker: Arc<InMemoryBroker>, inbound: &str) -> Self {
        broker.declare_queue(inbound);

        Self {
            broker,
            inbound: inbound.to_owned(),
            handler: Mutex::new(None),
            subscriptions: AtomicU64::new(0),
        }
    }

    /// Broker this channel is attached to
    pub fn broker(&self) -> &Arc<InMemoryBroker> {
        &self.broker
    }

    fn handler(&self) -> Option<Arc<dyn InboundHandler>> {
        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn drain(&self) -> Vec<Delivery> {
        self.broker
            .state()
            .queues
            .get_mut(&self.inbound)
            .map(|queue| queue.drain(..).collect())
            .unwrap_or_default()
    }

    async fn pump(&self, wait: Option<Duration>) -> EmptyResult {
        let deadline = wait.map(|limit| Instant::now() + limit);

        loop {
            // Register interest before checking the queue so an arrival
            // between the check and the await cannot be missed.
            let arrived = self.broker.arrivals.notified();

            if let Some(handler) = self.handler() {
                let batch = self.drain();

                if !batch.is_empty() {
                    for delivery in batch {
                        handler.handle(delivery).await?;
                    }
                    return Ok(());
                }
            }

            match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());

                    if remaining.is_zero() {
                        return Ok(());
                    }

                    let _ = timeout(remaining, arrived).await;
                }
                None => arrived.await,
            }
        }
    }
}

#[async_trait]
impl MessageChannel for InMemoryChannel {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        properties: &MessageProperties,
        mandatory: bool,
    ) -> Result<bool, BoxedError> {
        let routed = self.broker.route(exchange, routing_key, properties, body);

        if mandatory && !routed {
            trace!(exchange, routing_key, "Message could not be routed");
        }

        Ok(routed)
    }

    async fn subscribe(
        &self,
        handler: Arc<dyn InboundHandler>,
    ) -> Result<SubscriptionHandle, BoxedError> {
        *self
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handler);

        let id = self.subscriptions.fetch_add(1, Ordering::Relaxed);
        Ok(SubscriptionHandle::new(id))
    }

    async fn acknowledge(&self, delivery: &DeliveryInfo) -> EmptyResult {
        self.broker.state().acknowledged.push(delivery.delivery_tag);
        Ok(())
    }

    async fn process_events(&self, wait: Option<Duration>) -> EmptyResult {
        self.pump(wait).await
    }
}
