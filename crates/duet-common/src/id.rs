use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Perfect-negotiation role of one side of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Yields its own offer when offers collide.
    Polite,
    /// Keeps its own offer when offers collide.
    Impolite,
}

impl Role {
    /// Derive the local role from the two participant ids. The smaller id
    /// is impolite, so both sides agree without an extra round trip.
    pub fn for_pair(local_id: &str, remote_id: &str) -> Self {
        match local_id.cmp(remote_id) {
            Ordering::Less => Role::Impolite,
            _ => Role::Polite,
        }
    }

    pub fn is_polite(self) -> bool {
        matches!(self, Role::Polite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_id_is_valid_uuid() {
        let id = new_id();
        let parsed = uuid::Uuid::parse_str(&id);
        assert!(parsed.is_ok());
        assert_eq!(parsed.unwrap().get_version_num(), 4);
    }

    #[test]
    fn new_id_is_unique() {
        assert_ne!(new_id(), new_id());
    }

    #[test]
    fn smaller_id_is_impolite() {
        assert_eq!(Role::for_pair("a", "b"), Role::Impolite);
        assert_eq!(Role::for_pair("b", "a"), Role::Polite);
    }

    #[test]
    fn roles_are_complementary() {
        let a = new_id();
        let b = new_id();
        let ra = Role::for_pair(&a, &b);
        let rb = Role::for_pair(&b, &a);
        assert_ne!(ra, rb);
        assert!(ra.is_polite() ^ rb.is_polite());
    }

    #[test]
    fn role_is_deterministic() {
        let a = new_id();
        let b = new_id();
        let first = Role::for_pair(&a, &b);
        for _ in 0..10 {
            assert_eq!(Role::for_pair(&a, &b), first);
        }
    }

    #[test]
    fn role_serializes_snake_case() {
        let json = serde_json::to_string(&Role::Impolite).unwrap();
        assert_eq!(json, "\"impolite\"");
    }
}
