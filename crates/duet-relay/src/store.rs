//! Participant persistence boundary.
//!
//! The relay only needs create/find/update/delete by id plus a
//! "stale since" query. `MemoryStore` is the in-process implementation;
//! anything durable can sit behind the same trait.

use std::collections::HashMap;
use std::time::Instant;

/// A participant known to the presence registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: String,
    pub display_name: String,
    /// Id of the current partner, if engaged. Always symmetric.
    pub engaged_with: Option<String>,
    pub last_activity: Instant,
}

impl Participant {
    pub fn new(id: String, display_name: String) -> Self {
        Self {
            id,
            display_name,
            engaged_with: None,
            last_activity: Instant::now(),
        }
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged_with.is_some()
    }
}

pub trait ParticipantStore: Send + Sync + 'static {
    /// Insert a new participant. An existing record with the same id is replaced.
    fn create(&mut self, participant: Participant);

    fn find(&self, id: &str) -> Option<Participant>;

    /// Overwrite an existing record. Returns false if the id is unknown.
    fn update(&mut self, participant: Participant) -> bool;

    fn delete(&mut self, id: &str) -> Option<Participant>;

    /// Ids whose `last_activity` is strictly before `cutoff`.
    fn stale_since(&self, cutoff: Instant) -> Vec<String>;

    /// All participants in join order.
    fn list(&self) -> Vec<Participant>;
}

/// In-memory store preserving join order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    participants: HashMap<String, Participant>,
    order: Vec<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ParticipantStore for MemoryStore {
    fn create(&mut self, participant: Participant) {
        if !self.participants.contains_key(&participant.id) {
            self.order.push(participant.id.clone());
        }
        self.participants.insert(participant.id.clone(), participant);
    }

    fn find(&self, id: &str) -> Option<Participant> {
        self.participants.get(id).cloned()
    }

    fn update(&mut self, participant: Participant) -> bool {
        match self.participants.get_mut(&participant.id) {
            Some(slot) => {
                *slot = participant;
                true
            }
            None => false,
        }
    }

    fn delete(&mut self, id: &str) -> Option<Participant> {
        let removed = self.participants.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(removed)
    }

    fn stale_since(&self, cutoff: Instant) -> Vec<String> {
        self.order
            .iter()
            .filter_map(|id| self.participants.get(id))
            .filter(|p| p.last_activity < cutoff)
            .map(|p| p.id.clone())
            .collect()
    }

    fn list(&self) -> Vec<Participant> {
        self.order
            .iter()
            .filter_map(|id| self.participants.get(id))
            .cloned()
            .collect()
    }
}
