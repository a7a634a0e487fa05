use crate::communication::channel::{DeliveryInfo, MessageProperties};
use crate::communication::error::RequestError;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::trace;
use uuid::Uuid;

/// Opaque token linking a request to its eventual response
pub type CorrelationId = String;

/// Payload delivered for a correlation identifier
///
/// Contains the entire response message, body plus transport metadata, and
/// the instant the dispatcher filed it. Immutable once stored; a later
/// response for the same identifier replaces the stored record until it is
/// retrieved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseRecord {
    /// Transport level delivery information of the response
    pub delivery: DeliveryInfo,
    /// Metadata attached by the responder
    pub properties: MessageProperties,
    /// Opaque response body
    pub body: Vec<u8>,
    /// Instant the response was filed
    pub received_at: DateTime<Utc>,
}

impl ResponseRecord {
    /// Creates a record stamped with the current time
    pub fn new(delivery: DeliveryInfo, properties: MessageProperties, body: Vec<u8>) -> Self {
        Self {
            delivery,
            properties,
            body,
            received_at: Utc::now(),
        }
    }
}

/// Tracks outstanding requests by correlation identifier
///
/// The single source of truth for "is this call still pending". An
/// identifier exists in the registry exactly as long as a request is
/// outstanding or its response awaits retrieval; retrieval of a filled slot
/// hands the record over exactly once.
///
/// The map sits behind a mutex with short, non-suspending critical sections
/// so the dispatcher's [`store`](Self::store) and a coordinator's retrieval
/// cannot race. This does not make a coordinator shareable; see the module
/// documentation for the single-owner constraint.
#[derive(Debug, Default)]
pub struct CorrelationRegistry {
    slots: Mutex<HashMap<CorrelationId, Option<ResponseRecord>>>,
}

impl CorrelationRegistry {
    fn slots(&self) -> MutexGuard<'_, HashMap<CorrelationId, Option<ResponseRecord>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers the receiving of a response
    ///
    /// Returns the given identifier after registering, or a generated one
    /// when `id` is `None`. Generated identifiers are UUIDs, making
    /// collisions among outstanding requests negligible; uniqueness is not
    /// required across time once a slot has been freed.
    pub fn register(&self, id: Option<CorrelationId>) -> Result<CorrelationId, RequestError> {
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut slots = self.slots();

        if slots.contains_key(&id) {
            return Err(RequestError::DuplicateCorrelationId(id));
        }

        slots.insert(id.clone(), None);
        trace!(correlation_id = %id, "Registered response slot");
        Ok(id)
    }

    /// Files a response for a registered identifier
    ///
    /// Unknown identifiers are dropped without error or side effect. This
    /// protects against late responses for requests that have already timed
    /// out, and against messages this process never asked for. Returns
    /// whether the record was kept, so callers can tell the two apart.
    pub fn store(&self, id: &str, record: ResponseRecord) -> bool {
        match self.slots().get_mut(id) {
            Some(slot) => {
                *slot = Some(record);
                true
            }
            None => false,
        }
    }

    /// Retrieves the response for a registered identifier
    ///
    /// Returns `Ok(None)` while no response has arrived, leaving the slot
    /// registered. Once filled, the record is returned and the slot removed;
    /// a second retrieval therefore fails with
    /// [`UnknownCorrelationId`](RequestError::UnknownCorrelationId), as does
    /// any identifier that was never registered.
    pub fn take(&self, id: &str) -> Result<Option<ResponseRecord>, RequestError> {
        let mut slots = self.slots();

        match slots.get(id) {
            None => Err(RequestError::UnknownCorrelationId(id.to_owned())),
            Some(None) => Ok(None),
            Some(Some(_)) => Ok(slots.remove(id).flatten()),
        }
    }

    /// Identifiers currently filled and awaiting retrieval
    pub fn filled(&self) -> HashSet<CorrelationId> {
        self.slots()
            .iter()
            .filter(|(_, slot)| slot.is_some())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Releases a slot regardless of its state
    ///
    /// Used to abandon an outstanding registration after a failed publish or
    /// an elapsed timeout, where [`take`](Self::take) would leave a pending
    /// slot in place. Absent identifiers are ignored.
    pub fn discard(&self, id: &str) {
        if self.slots().remove(id).is_some() {
            trace!(correlation_id = %id, "Discarded response slot");
        }
    }

    /// Number of identifiers currently registered, filled or not
    pub fn outstanding(&self) -> usize {
        self.slots().len()
    }
}
