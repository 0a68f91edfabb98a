use crate::payload::Payload;
use serde_json::Value;

/// Persisted identity of an entity
pub type EntityId = u64;

/// CRUD collaborator a form submits through.
///
/// The engine never inspects `Self::Error`; a rejected call is relayed to
/// whoever started the submit.
pub trait EntityStore {
    type Error: std::error::Error;

    fn fetch_by_id(&self, id: EntityId) -> Result<Option<Value>, Self::Error>;

    /// Create an entity from `payload`, returning it as stored
    fn add(&mut self, payload: &Payload) -> Result<Value, Self::Error>;

    /// Apply `payload` to entity `id`, returning it as stored
    fn update(&mut self, id: EntityId, payload: &Payload) -> Result<Value, Self::Error>;

    fn list(&self) -> Result<Vec<Value>, Self::Error>;
}
