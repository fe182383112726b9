//! Tests for engagement arbitration, release, disconnect and reaping.

use std::time::Duration;

use duet_common::{PairingRejection, ServerMessage};
use tokio::sync::mpsc;

use super::*;
use crate::store::MemoryStore;

struct Client {
    id: String,
    connection_id: u64,
    rx: mpsc::Receiver<ServerMessage>,
}

impl Client {
    /// Everything queued so far.
    fn drain(&mut self) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn received_paired(&mut self) -> Option<String> {
        self.drain().into_iter().find_map(|msg| match msg {
            ServerMessage::Paired { partner_id } => Some(partner_id),
            _ => None,
        })
    }

    fn received_released(&mut self) -> Option<String> {
        self.drain().into_iter().find_map(|msg| match msg {
            ServerMessage::Released { partner_id } => Some(partner_id),
            _ => None,
        })
    }
}

fn coordinator() -> PairingCoordinator<MemoryStore> {
    PairingCoordinator::new(
        PresenceRegistry::new(MemoryStore::new(), "User"),
        SignalingRelay::new(),
    )
}

async fn connect(coord: &PairingCoordinator<MemoryStore>, name: &str) -> Client {
    let (tx, rx) = mpsc::channel(64);
    let admission = coord.join(Some(name.into()), tx).await;
    let mut client = Client {
        id: admission.participant.id,
        connection_id: admission.connection_id,
        rx,
    };
    client.drain();
    client
}

async fn partner_of(coord: &PairingCoordinator<MemoryStore>, id: &str) -> Option<String> {
    coord.participant(id).await.and_then(|p| p.engaged_with)
}

async fn assert_symmetric(coord: &PairingCoordinator<MemoryStore>) {
    for entry in coord.presence().await {
        if let Some(partner) = &entry.engaged_with {
            assert_ne!(partner, &entry.id);
            assert_eq!(
                partner_of(coord, partner).await.as_deref(),
                Some(entry.id.as_str())
            );
        }
    }
}

#[tokio::test]
async fn join_confirms_identity_and_broadcasts_presence() {
    let coord = coordinator();
    let (tx, mut rx) = mpsc::channel(8);
    let admission = coord.join(Some("Ada".into()), tx).await;

    let first = rx.recv().await.unwrap();
    assert_eq!(
        first,
        ServerMessage::Joined {
            participant_id: admission.participant.id.clone(),
            display_name: "Ada".into(),
        }
    );
    let second = rx.recv().await.unwrap();
    assert!(matches!(second, ServerMessage::PresenceList { ref participants } if participants.len() == 1));
}

#[tokio::test]
async fn toggle_pairs_both_sides() {
    let coord = coordinator();
    let mut a = connect(&coord, "A").await;
    let mut b = connect(&coord, "B").await;
    a.drain();

    coord.toggle_engagement(&a.id, &b.id).await.unwrap();

    assert_eq!(a.received_paired().as_deref(), Some(b.id.as_str()));
    assert_eq!(b.received_paired().as_deref(), Some(a.id.as_str()));
    assert_eq!(partner_of(&coord, &a.id).await.as_deref(), Some(b.id.as_str()));
    assert_eq!(partner_of(&coord, &b.id).await.as_deref(), Some(a.id.as_str()));
    assert_symmetric(&coord).await;
}

#[tokio::test]
async fn toggle_broadcasts_presence_with_engagement() {
    let coord = coordinator();
    let a = connect(&coord, "A").await;
    let b = connect(&coord, "B").await;
    let mut observer = connect(&coord, "C").await;

    coord.toggle_engagement(&a.id, &b.id).await.unwrap();

    let list = observer
        .drain()
        .into_iter()
        .find_map(|msg| match msg {
            ServerMessage::PresenceList { participants } => Some(participants),
            _ => None,
        })
        .unwrap();
    let a_entry = list.iter().find(|e| e.id == a.id).unwrap();
    assert_eq!(a_entry.engaged_with.as_deref(), Some(b.id.as_str()));
    let c_entry = list.iter().find(|e| e.id == observer.id).unwrap();
    assert_eq!(c_entry.engaged_with, None);
}

#[tokio::test]
async fn pairing_with_engaged_target_changes_nothing() {
    let coord = coordinator();
    let mut c = connect(&coord, "C").await;
    let d = connect(&coord, "D").await;
    let e = connect(&coord, "E").await;
    coord.toggle_engagement(&d.id, &e.id).await.unwrap();
    c.drain();

    let result = coord.toggle_engagement(&c.id, &d.id).await;
    assert_eq!(result, Err(PairingRejection::TargetEngaged(d.id.clone())));

    assert!(c.drain().is_empty());
    assert_eq!(partner_of(&coord, &c.id).await, None);
    assert_eq!(partner_of(&coord, &d.id).await.as_deref(), Some(e.id.as_str()));
    assert_eq!(partner_of(&coord, &e.id).await.as_deref(), Some(d.id.as_str()));
}

#[tokio::test]
async fn engaged_requester_is_rejected() {
    let coord = coordinator();
    let a = connect(&coord, "A").await;
    let b = connect(&coord, "B").await;
    let c = connect(&coord, "C").await;
    coord.toggle_engagement(&a.id, &b.id).await.unwrap();

    let result = coord.toggle_engagement(&a.id, &c.id).await;
    assert_eq!(result, Err(PairingRejection::RequesterEngaged(a.id.clone())));
    assert_eq!(partner_of(&coord, &c.id).await, None);
}

#[tokio::test]
async fn self_engagement_is_rejected() {
    let coord = coordinator();
    let a = connect(&coord, "A").await;
    let result = coord.toggle_engagement(&a.id, &a.id).await;
    assert_eq!(result, Err(PairingRejection::SelfEngagement));
    assert_eq!(partner_of(&coord, &a.id).await, None);
}

#[tokio::test]
async fn unknown_target_is_rejected() {
    let coord = coordinator();
    let a = connect(&coord, "A").await;
    let result = coord.toggle_engagement(&a.id, "ghost").await;
    assert_eq!(
        result,
        Err(PairingRejection::UnknownParticipant("ghost".into()))
    );
}

#[tokio::test]
async fn release_clears_both_sides() {
    let coord = coordinator();
    let mut a = connect(&coord, "A").await;
    let mut b = connect(&coord, "B").await;
    coord.toggle_engagement(&a.id, &b.id).await.unwrap();
    a.drain();
    b.drain();

    let partner = coord.release_engagement(&a.id).await.unwrap();
    assert_eq!(partner, b.id);

    assert_eq!(b.received_released().as_deref(), Some(a.id.as_str()));
    assert_eq!(a.received_released().as_deref(), Some(b.id.as_str()));
    assert_eq!(partner_of(&coord, &a.id).await, None);
    assert_eq!(partner_of(&coord, &b.id).await, None);

    // Both are free again.
    coord.toggle_engagement(&b.id, &a.id).await.unwrap();
}

#[tokio::test]
async fn release_when_free_is_noop() {
    let coord = coordinator();
    let mut a = connect(&coord, "A").await;
    let result = coord.release_engagement(&a.id).await;
    assert_eq!(result, Err(PairingRejection::NotEngaged(a.id.clone())));
    assert!(a.drain().is_empty());
}

#[tokio::test]
async fn disconnect_mid_session_releases_partner() {
    let coord = coordinator();
    let a = connect(&coord, "A").await;
    let mut b = connect(&coord, "B").await;
    coord.toggle_engagement(&a.id, &b.id).await.unwrap();
    b.drain();

    let removed = coord.on_disconnect(&a.id, a.connection_id).await;
    assert_eq!(removed.map(|p| p.id), Some(a.id.clone()));

    assert_eq!(b.received_released().as_deref(), Some(a.id.as_str()));
    assert_eq!(partner_of(&coord, &b.id).await, None);
    assert!(coord.participant(&a.id).await.is_none());
    assert!(!coord.relay().is_connected(&a.id).await);
    assert_symmetric(&coord).await;
}

#[tokio::test]
async fn superseded_connection_does_not_remove_participant() {
    let coord = coordinator();
    let a = connect(&coord, "A").await;

    let (tx, _rx) = mpsc::channel(8);
    let again = coord.rejoin(&a.id, tx).await;
    assert!(again.reused);
    assert_eq!(again.participant.id, a.id);

    assert!(coord.on_disconnect(&a.id, a.connection_id).await.is_none());
    assert!(coord.participant(&a.id).await.is_some());
    assert!(coord.relay().is_connected(&a.id).await);
}

#[tokio::test]
async fn rejoin_releases_leftover_engagement() {
    let coord = coordinator();
    let a = connect(&coord, "A").await;
    let mut b = connect(&coord, "B").await;
    coord.toggle_engagement(&a.id, &b.id).await.unwrap();
    b.drain();

    let (tx, _rx) = mpsc::channel(8);
    coord.rejoin(&a.id, tx).await;

    assert_eq!(b.received_released().as_deref(), Some(a.id.as_str()));
    assert_eq!(partner_of(&coord, &a.id).await, None);
    assert_eq!(partner_of(&coord, &b.id).await, None);
}

#[tokio::test]
async fn rejoin_with_unknown_id_issues_new_identity() {
    let coord = coordinator();
    let (tx, mut rx) = mpsc::channel(8);
    let admission = coord.rejoin("forgotten", tx).await;
    assert!(!admission.reused);
    assert_ne!(admission.participant.id, "forgotten");
    assert!(matches!(
        rx.recv().await.unwrap(),
        ServerMessage::Joined { ref participant_id, .. } if *participant_id == admission.participant.id
    ));
}

#[tokio::test]
async fn reaper_removes_idle_participants_and_releases_partners() {
    let coord = coordinator();
    let a = connect(&coord, "A").await;
    let b = connect(&coord, "B").await;
    coord.toggle_engagement(&a.id, &b.id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    let mut fresh = connect(&coord, "Fresh").await;
    fresh.drain();

    let reaped = coord.reap_stale(Duration::from_millis(10)).await;
    assert_eq!(reaped.len(), 2);
    assert!(reaped.contains(&a.id));
    assert!(reaped.contains(&b.id));
    assert!(coord.participant(&fresh.id).await.is_some());
    assert_eq!(coord.presence().await.len(), 1);
    assert!(!coord.relay().is_connected(&a.id).await);
}

#[tokio::test]
async fn touch_keeps_participant_alive() {
    let coord = coordinator();
    let a = connect(&coord, "A").await;

    tokio::time::sleep(Duration::from_millis(20)).await;
    coord.touch(&a.id).await;

    assert!(coord.reap_stale(Duration::from_millis(10)).await.is_empty());
    assert!(coord.participant(&a.id).await.is_some());
}

#[tokio::test]
async fn concurrent_toggles_on_shared_target_admit_one() {
    let coord = coordinator();
    let mut requesters = Vec::new();
    for i in 0..8 {
        requesters.push(connect(&coord, &format!("R{i}")).await);
    }
    let target = connect(&coord, "T").await;

    let mut handles = Vec::new();
    for r in &requesters {
        let coord = coord.clone();
        let requester = r.id.clone();
        let target = target.id.clone();
        handles.push(tokio::spawn(async move {
            coord.toggle_engagement(&requester, &target).await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            successes += 1;
        }
    }
    assert_eq!(successes, 1);

    let engaged = coord
        .presence()
        .await
        .into_iter()
        .filter(|e| e.engaged_with.is_some())
        .count();
    assert_eq!(engaged, 2);
    assert_symmetric(&coord).await;
}

#[tokio::test]
async fn concurrent_crossing_toggles_never_double_engage() {
    let coord = coordinator();
    let a = connect(&coord, "A").await;
    let b = connect(&coord, "B").await;
    let c = connect(&coord, "C").await;

    let (r1, r2, r3) = tokio::join!(
        coord.toggle_engagement(&a.id, &b.id),
        coord.toggle_engagement(&b.id, &c.id),
        coord.toggle_engagement(&c.id, &a.id),
    );
    let successes = [r1, r2, r3].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    assert_symmetric(&coord).await;
}
