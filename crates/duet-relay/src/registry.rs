//! Presence registry: identity, display names, liveness and partners.
//!
//! The registry is plain data over a `ParticipantStore`. It is always
//! accessed through the pairing coordinator's lock; `set_engaged` is
//! crate-private so only the coordinator can change partners.

use std::time::Instant;

use duet_common::{new_id, PresenceEntry};
use rand::Rng;

use crate::store::{Participant, ParticipantStore};

pub struct PresenceRegistry<S> {
    store: S,
    name_prefix: String,
}

impl<S: ParticipantStore> PresenceRegistry<S> {
    pub fn new(store: S, name_prefix: impl Into<String>) -> Self {
        Self {
            store,
            name_prefix: name_prefix.into(),
        }
    }

    /// Register a brand new participant. A random `"{prefix}{n}"` name is
    /// generated when none is given.
    pub fn join(&mut self, display_name: Option<String>) -> Participant {
        let display_name = display_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.generate_name());
        let participant = Participant::new(new_id(), display_name);
        self.store.create(participant.clone());
        participant
    }

    /// Reuse `id` if it is still registered, otherwise create a fresh
    /// participant. The flag is true when the prior id was reused.
    pub fn rejoin(&mut self, id: &str) -> (Participant, bool) {
        match self.store.find(id) {
            Some(mut existing) => {
                existing.last_activity = Instant::now();
                self.store.update(existing.clone());
                (existing, true)
            }
            None => (self.join(None), false),
        }
    }

    pub fn get(&self, id: &str) -> Option<Participant> {
        self.store.find(id)
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: &str) -> bool {
        self.store.find(id).is_some()
    }

    /// Refresh `last_activity`. Unknown ids are ignored.
    pub fn touch(&mut self, id: &str) {
        if let Some(mut participant) = self.store.find(id) {
            participant.last_activity = Instant::now();
            self.store.update(participant);
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Participant> {
        self.store.delete(id)
    }

    pub fn stale_since(&self, cutoff: Instant) -> Vec<String> {
        self.store.stale_since(cutoff)
    }

    /// Presence list in join order.
    pub fn snapshot(&self) -> Vec<PresenceEntry> {
        self.store
            .list()
            .into_iter()
            .map(|p| PresenceEntry {
                id: p.id,
                name: p.display_name,
                engaged_with: p.engaged_with,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.store.list().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn set_engaged(&mut self, id: &str, partner: Option<String>) -> bool {
        match self.store.find(id) {
            Some(mut participant) => {
                participant.engaged_with = partner;
                participant.last_activity = Instant::now();
                self.store.update(participant)
            }
            None => false,
        }
    }

    fn generate_name(&self) -> String {
        let n: u32 = rand::thread_rng().gen_range(0..1000);
        format!("{}{n}", self.name_prefix)
    }
}
