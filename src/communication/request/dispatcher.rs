use super::registry::{CorrelationRegistry, ResponseRecord};
use crate::communication::channel::{Delivery, InboundHandler, MessageChannel};
use crate::EmptyResult;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, trace};

/// Routes inbound messages back to the correct pending request
///
/// Bound once per coordinator instance as the channel's inbound callback.
/// Each delivery is classified by its correlation identifier and filed into
/// the [`CorrelationRegistry`]. Messages that cannot be matched, late
/// answers to timed-out requests or messages carrying no identifier at all,
/// are dropped. Every delivery is acknowledged regardless, so unmatched
/// messages are consumed rather than redelivered.
pub struct ResponseDispatcher<C> {
    registry: Arc<CorrelationRegistry>,
    channel: Arc<C>,
}

impl<C> ResponseDispatcher<C> {
    /// Creates a dispatcher filing responses into `registry` and
    /// acknowledging them on `channel`
    pub fn new(registry: Arc<CorrelationRegistry>, channel: Arc<C>) -> Self {
        Self { registry, channel }
    }
}

#[async_trait]
impl<C: MessageChannel> InboundHandler for ResponseDispatcher<C> {
    async fn handle(&self, delivery: Delivery) -> EmptyResult {
        let Delivery {
            info,
            properties,
            body,
        } = delivery;

        match properties.correlation_id.clone() {
            Some(id) => {
                trace!(correlation_id = %id, "Received response");
                let record = ResponseRecord::new(info.clone(), properties, body);

                if !self.registry.store(&id, record) {
                    debug!(correlation_id = %id, "Dropping response nobody is waiting for");
                }
            }
            None => debug!("Dropping inbound message without a correlation identifier"),
        }

        self.channel.acknowledge(&info).await
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use crate::communication::channel::{DeliveryInfo, MessageProperties};
    use crate::communication::implementation::memory::{InMemoryBroker, InMemoryChannel};

    fn delivery(correlation_id: Option<&str>) -> Delivery {
        Delivery {
            info: DeliveryInfo {
                delivery_tag: 7,
                exchange: String::new(),
                routing_key: "rpc.client".into(),
                redelivered: false,
            },
            properties: MessageProperties {
                correlation_id: correlation_id.map(str::to_owned),
                ..MessageProperties::default()
            },
            body: b"pong".to_vec(),
        }
    }

    fn dispatcher() -> (
        Arc<CorrelationRegistry>,
        Arc<InMemoryBroker>,
        ResponseDispatcher<InMemoryChannel>,
    ) {
        let registry = Arc::new(CorrelationRegistry::default());
        let broker = Arc::new(InMemoryBroker::default());
        let channel = Arc::new(InMemoryChannel::attach(broker.clone(), "rpc.client"));
        let dispatcher = ResponseDispatcher::new(registry.clone(), channel);

        (registry, broker, dispatcher)
    }

    #[tokio::test]
    async fn file_responses_for_registered_identifiers() {
        let (registry, broker, dispatcher) = dispatcher();
        registry.register(Some("abc".into())).expect("registration failed");

        dispatcher.handle(delivery(Some("abc"))).await.expect("dispatch failed");

        let record = registry
            .take("abc")
            .expect("retrieval failed")
            .expect("slot was not filled");
        assert_eq!(record.body, b"pong");
        assert_eq!(broker.acknowledgements(), vec![7]);
    }

    #[tokio::test]
    async fn acknowledge_responses_nobody_is_waiting_for() {
        let (registry, broker, dispatcher) = dispatcher();

        dispatcher.handle(delivery(Some("nope"))).await.expect("dispatch failed");

        assert_eq!(registry.outstanding(), 0);
        assert_eq!(broker.acknowledgements(), vec![7]);
    }

    #[tokio::test]
    async fn acknowledge_messages_without_identifiers() {
        let (registry, broker, dispatcher) = dispatcher();

        dispatcher.handle(delivery(None)).await.expect("dispatch failed");

        assert_eq!(registry.outstanding(), 0);
        assert_eq!(broker.acknowledgements(), vec![7]);
    }
}
