use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inbound addressing identity of a request coordinator
///
/// The address names the coordinator's own subscription target and is
/// attached to every outgoing request as the reply destination. An optional
/// exchange binding can additionally be recorded so responders can discover
/// and address the endpoint through a shared exchange, using the address as
/// routing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcEndpointIdentity {
    address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exchange: Option<String>,
}

impl RpcEndpointIdentity {
    /// Creates an identity with an explicit inbound address
    pub fn new<S: Into<String>>(address: S) -> Self {
        Self {
            address: address.into(),
            exchange: None,
        }
    }

    /// Generates an identity with a randomly assigned inbound address
    pub fn generate() -> Self {
        Self::new(format!("rpc.{}", Uuid::new_v4()))
    }

    /// Records an exchange responders can reach this endpoint through
    pub fn with_exchange<S: Into<String>>(mut self, exchange: S) -> Self {
        self.exchange = Some(exchange.into());
        self
    }

    /// Inbound address responders have to target to deliver answers
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Exchange this endpoint is reachable through, if any
    pub fn exchange(&self) -> Option<&str> {
        self.exchange.as_deref()
    }
}
