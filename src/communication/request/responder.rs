use crate::communication::channel::{Delivery, InboundHandler, MessageChannel, MessageProperties};
use crate::communication::error::RequestError;
use crate::{BoxedError, EmptyResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Reply produced by a [`RequestProcessor`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    /// Opaque response body
    pub body: Vec<u8>,
    /// Metadata to attach; the correlation identifier is overwritten with
    /// the one carried by the request
    pub properties: MessageProperties,
}

/// Application logic answering inbound requests
#[async_trait]
pub trait RequestProcessor: Send + Sync {
    /// Produces the reply for a single request
    ///
    /// Returning `None` consumes the request without answering it.
    async fn process(&self, request: &Delivery) -> Result<Option<Reply>, BoxedError>;
}

/// Responding side of the request-response pattern
///
/// Subscribes itself as the channel's inbound callback. Each request is fed
/// through the [`RequestProcessor`]; any returned [`Reply`] is published to
/// the request's reply address with the correlation identifier carried
/// forward. Requests are acknowledged unconditionally: processing is
/// at-most-once, and processor failures are logged rather than redelivered.
pub struct Responder<C, P> {
    channel: Arc<C>,
    processor: P,
}

impl<C, P> Responder<C, P>
where
    C: MessageChannel + 'static,
    P: RequestProcessor + 'static,
{
    /// Subscribes a responder to the channel's inbound source
    pub async fn bind(channel: Arc<C>, processor: P) -> Result<Arc<Self>, BoxedError> {
        let responder = Arc::new(Self {
            channel: channel.clone(),
            processor,
        });
        channel.subscribe(responder.clone()).await?;

        Ok(responder)
    }

    /// Drives the channel's event loop indefinitely
    ///
    /// Returns only when the underlying channel fails.
    pub async fn serve(&self) -> EmptyResult {
        loop {
            self.channel.process_events(None).await?;
        }
    }
}

#[async_trait]
impl<C, P> InboundHandler for Responder<C, P>
where
    C: MessageChannel + 'static,
    P: RequestProcessor + 'static,
{
    async fn handle(&self, delivery: Delivery) -> EmptyResult {
        match self.processor.process(&delivery).await {
            Ok(Some(reply)) => {
                reply_to_request(
                    self.channel.as_ref(),
                    &delivery.properties,
                    &reply.body,
                    reply.properties,
                )
                .await?;
            }
            Ok(None) => {}
            Err(error) => warn!(?error, "Request processor failed, consuming request anyway"),
        }

        self.channel.acknowledge(&delivery.info).await
    }
}

/// Replies to a request without any coordinator-side bookkeeping
///
/// Publishes to the default exchange using the original request's reply
/// address as routing key and carries its correlation identifier forward.
/// Fire-and-forget: the mandatory flag is not set and the registry is never
/// involved, so this cannot fail due to correlation state.
#[instrument(err, skip(channel, body, properties))]
pub async fn reply_to_request<C>(
    channel: &C,
    original: &MessageProperties,
    body: &[u8],
    mut properties: MessageProperties,
) -> Result<(), RequestError>
where
    C: MessageChannel + ?Sized,
{
    let reply_to = original
        .reply_to
        .as_deref()
        .ok_or(RequestError::MissingReplyAddress)?;
    properties.correlation_id = original.correlation_id.clone();

    debug!(reply_to, "Publishing reply");
    channel.publish("", reply_to, body, &properties, false).await?;

    Ok(())
}

#[cfg(test)]
mod does {
    use super::*;
    use crate::communication::implementation::memory::{InMemoryBroker, InMemoryChannel};
    use std::sync::Mutex;
    use std::time::Duration;

    struct UppercaseProcessor;

    #[async_trait]
    impl RequestProcessor for UppercaseProcessor {
        async fn process(&self, request: &Delivery) -> Result<Option<Reply>, BoxedError> {
            Ok(Some(Reply {
                body: request.body.to_ascii_uppercase(),
                properties: MessageProperties::default(),
            }))
        }
    }

    struct SilentProcessor;

    #[async_trait]
    impl RequestProcessor for SilentProcessor {
        async fn process(&self, _request: &Delivery) -> Result<Option<Reply>, BoxedError> {
            Ok(None)
        }
    }

    struct FailingProcessor;

    #[async_trait]
    impl RequestProcessor for FailingProcessor {
        async fn process(&self, _request: &Delivery) -> Result<Option<Reply>, BoxedError> {
            Err("processor exploded".into())
        }
    }

    struct Recorder {
        seen: Mutex<Vec<Delivery>>,
    }

    #[async_trait]
    impl InboundHandler for Recorder {
        async fn handle(&self, delivery: Delivery) -> EmptyResult {
            self.seen
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(delivery);
            Ok(())
        }
    }

    fn request_properties() -> MessageProperties {
        MessageProperties {
            correlation_id: Some("42".into()),
            reply_to: Some("rpc.cli".into()),
            ..MessageProperties::default()
        }
    }

    async fn publish_request(broker: &Arc<InMemoryBroker>, client: &InMemoryChannel) {
        let routed = client
            .publish("", "svc.upper", b"ping", &request_properties(), true)
            .await
            .expect("publish failed");
        assert!(routed, "request was not routed");
        assert_eq!(broker.queue_depth("svc.upper"), 1);
    }

    #[tokio::test]
    async fn answer_requests_with_replies() {
        let broker = Arc::new(InMemoryBroker::default());
        let service_channel = Arc::new(InMemoryChannel::attach(broker.clone(), "svc.upper"));
        let client = InMemoryChannel::attach(broker.clone(), "rpc.cli");
        Responder::bind(service_channel.clone(), UppercaseProcessor)
            .await
            .expect("binding the responder failed");

        publish_request(&broker, &client).await;
        service_channel
            .process_events(Some(Duration::from_millis(50)))
            .await
            .expect("event processing failed");

        assert_eq!(broker.queue_depth("rpc.cli"), 1);
        assert!(!broker.acknowledgements().is_empty());

        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        client
            .subscribe(recorder.clone())
            .await
            .expect("subscription failed");
        client
            .process_events(Some(Duration::from_millis(50)))
            .await
            .expect("event processing failed");

        let seen = recorder
            .seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].body, b"PING");
        assert_eq!(seen[0].properties.correlation_id.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn consume_requests_without_answering() {
        let broker = Arc::new(InMemoryBroker::default());
        let service_channel = Arc::new(InMemoryChannel::attach(broker.clone(), "svc.upper"));
        let client = InMemoryChannel::attach(broker.clone(), "rpc.cli");
        Responder::bind(service_channel.clone(), SilentProcessor)
            .await
            .expect("binding the responder failed");

        publish_request(&broker, &client).await;
        service_channel
            .process_events(Some(Duration::from_millis(50)))
            .await
            .expect("event processing failed");

        assert_eq!(broker.queue_depth("rpc.cli"), 0);
        assert_eq!(broker.acknowledgements().len(), 1);
    }

    #[tokio::test]
    async fn consume_requests_when_the_processor_fails() {
        let broker = Arc::new(InMemoryBroker::default());
        let service_channel = Arc::new(InMemoryChannel::attach(broker.clone(), "svc.upper"));
        let client = InMemoryChannel::attach(broker.clone(), "rpc.cli");
        Responder::bind(service_channel.clone(), FailingProcessor)
            .await
            .expect("binding the responder failed");

        publish_request(&broker, &client).await;
        service_channel
            .process_events(Some(Duration::from_millis(50)))
            .await
            .expect("event processing failed");

        assert_eq!(broker.queue_depth("rpc.cli"), 0);
        assert_eq!(broker.acknowledgements().len(), 1);
    }

    #[tokio::test]
    async fn carry_absent_identifiers_forward() {
        let broker = Arc::new(InMemoryBroker::default());
        broker.declare_queue("rpc.cli");
        let channel = InMemoryChannel::attach(broker.clone(), "svc.upper");

        let original = MessageProperties {
            reply_to: Some("rpc.cli".into()),
            ..MessageProperties::default()
        };
        let reply_properties = MessageProperties {
            correlation_id: Some("stale".into()),
            ..MessageProperties::default()
        };

        reply_to_request(&channel, &original, b"pong", reply_properties)
            .await
            .expect("reply failed");

        assert_eq!(broker.queue_depth("rpc.cli"), 1);
    }
}
