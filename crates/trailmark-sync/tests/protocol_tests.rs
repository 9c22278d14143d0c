//! Client ↔ server tests over an in-memory transport
//!
//! Every message crosses the CBOR codec, so these exercise:
//! 1. Sequence numbers, acks and duplicate suppression
//! 2. Server-side authorization
//! 3. Sharing (including uploading local paths as forks)
//! 4. Offline fallback and correction by the next full sync
//! 5. Remote recording driven by the server tick

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use trailmark_model::{ActorId, PathId, Point};
use trailmark_sync::*;

// ============================================================================
// Harness
// ============================================================================

type Outbox = Rc<RefCell<Vec<(Channel, Vec<u8>)>>>;

struct Wire {
    open: Rc<Cell<bool>>,
    outbox: Outbox,
}

impl Transport for Wire {
    fn can_send(&self, _channel: Channel) -> bool {
        self.open.get()
    }

    fn send(&self, channel: Channel, bytes: Vec<u8>) -> Result<(), TransportError> {
        if !self.open.get() {
            return Err(TransportError::Send("wire closed".to_string()));
        }
        self.outbox.borrow_mut().push((channel, bytes));
        Ok(())
    }
}

struct Peer {
    actor: ActorId,
    client: PathClient,
    open: Rc<Cell<bool>>,
    outbox: Outbox,
}

impl Peer {
    fn join(server: &PathServer, name: &str) -> Peer {
        let actor = ActorId::new();
        let mut peer = Peer {
            actor,
            client: PathClient::new(actor, name, TrailConfig::default()),
            open: Rc::new(Cell::new(true)),
            outbox: Rc::new(RefCell::new(Vec::new())),
        };
        let welcome = server.connect(actor, name);
        peer.reconnect_wire();
        peer.deliver(&welcome);
        peer
    }

    fn reconnect_wire(&mut self) {
        self.open.set(true);
        self.client.connect(Box::new(Wire {
            open: Rc::clone(&self.open),
            outbox: Rc::clone(&self.outbox),
        }));
    }

    fn deliver(&mut self, outbound: &Outbound) -> Inbound {
        assert_eq!(outbound.to, self.actor);
        let bytes = outbound.encode().unwrap();
        self.client.handle_message(outbound.channel(), &bytes)
    }

    fn take_sent(&self) -> Vec<(Channel, Vec<u8>)> {
        std::mem::take(&mut *self.outbox.borrow_mut())
    }
}

/// Shuttle messages until every outbox is empty.
fn flush(server: &PathServer, peers: &mut [&mut Peer]) {
    loop {
        let mut replies = Vec::new();
        for peer in peers.iter() {
            for (channel, bytes) in peer.take_sent() {
                replies.extend(server.handle_message(peer.actor, channel, &bytes));
            }
        }
        if replies.is_empty() {
            return;
        }
        for reply in replies {
            if let Some(peer) = peers.iter_mut().find(|p| p.actor == reply.to) {
                peer.deliver(&reply);
            }
        }
    }
}

fn here(actor: ActorId, x: f64) -> ActorPosition {
    ActorPosition {
        actor,
        position: Point::new(x, 64.0, 0.0),
        dimension: "overworld".to_string(),
    }
}

/// Record a two-point path on the server for `peer`.
fn record_remote(server: &PathServer, peer: &mut Peer, name: &str) -> PathId {
    server.update_position(here(peer.actor, 0.0));
    peer.client.start_remote_recording(Some(name)).unwrap();
    flush(server, &mut [&mut *peer]);
    assert!(peer.client.is_remote_recording());

    assert!(server.tick(vec![here(peer.actor, 10.0)]).is_empty());
    peer.client.stop_remote_recording(true).unwrap();
    flush(server, &mut [&mut *peer]);
    assert!(!peer.client.is_remote_recording());

    peer.client
        .find_by_name(name)
        .map(|p| p.id())
        .expect("recorded path should be synced")
}

fn record_local(peer: &mut Peer, name: &str) -> PathId {
    let client = &mut peer.client;
    client
        .start_recording(Some(name), Point::new(0.0, 64.0, 0.0), "overworld")
        .unwrap();
    client
        .sample(Point::new(3.0, 64.0, 3.0), "overworld")
        .unwrap();
    client.stop_recording(true).unwrap().saved().unwrap().id()
}

// ============================================================================
// Sequencing
// ============================================================================

#[test]
fn test_remote_recording_round_trip() {
    let server = PathServer::new(RecordingConfig::server());
    let mut alice = Peer::join(&server, "alice");

    let id = record_remote(&server, &mut alice, "ridge");
    assert_eq!(alice.client.store().origin_of(&id), Some(Origin::ServerOwned));
    assert!(alice.client.store().is_visible(&id));
    assert_eq!(server.path(&id).unwrap().point_count(), 2);
}

#[test]
fn test_duplicate_result_is_ignored() {
    let server = PathServer::new(RecordingConfig::server());
    let mut alice = Peer::join(&server, "alice");
    let id = record_remote(&server, &mut alice, "ridge");

    let replies = server.handle_action(
        alice.actor,
        ActionRequest::Rename {
            path_id: id,
            name: "Summit".to_string(),
        },
    );
    assert_eq!(replies.len(), 1);
    assert_eq!(
        alice.deliver(&replies[0]),
        Inbound::Result {
            action: ActionKind::Rename,
            success: true
        }
    );
    assert_eq!(server.pending_retransmits(&alice.actor).len(), 1);

    // Replayed delivery of the same result.
    assert_eq!(alice.deliver(&replies[0]), Inbound::Duplicate);
    assert_eq!(alice.client.store().get(&id).unwrap().name(), "Summit");

    flush(&server, &mut [&mut alice]);
    assert!(server.pending_retransmits(&alice.actor).is_empty());
    let ServerMessage::Result(result) = &replies[0].message else {
        panic!("expected a result");
    };
    assert_eq!(server.last_acked(&alice.actor), Some(result.seq));
}

#[test]
fn test_retransmit_after_lost_ack_is_acknowledged() {
    let server = PathServer::new(RecordingConfig::server());
    let mut alice = Peer::join(&server, "alice");
    let id = record_remote(&server, &mut alice, "ridge");

    let replies = server.handle_action(
        alice.actor,
        ActionRequest::Rename {
            path_id: id,
            name: "Summit".to_string(),
        },
    );
    // The result arrives but the wire drops before the ack goes out.
    alice.open.set(false);
    assert!(matches!(alice.deliver(&replies[0]), Inbound::Result { success: true, .. }));
    assert!(alice.take_sent().is_empty());
    assert_eq!(server.pending_retransmits(&alice.actor).len(), 1);

    alice.open.set(true);
    for resend in server.pending_retransmits(&alice.actor) {
        assert_eq!(alice.deliver(&resend), Inbound::Duplicate);
    }
    flush(&server, &mut [&mut alice]);

    assert!(server.pending_retransmits(&alice.actor).is_empty());
    let ServerMessage::Result(result) = &replies[0].message else {
        panic!("expected a result");
    };
    assert_eq!(server.last_acked(&alice.actor), Some(result.seq));
    assert_eq!(alice.client.store().get(&id).unwrap().name(), "Summit");
}

#[test]
fn test_seq_is_monotonic_and_reports_ack() {
    let server = PathServer::new(RecordingConfig::server());
    let mut alice = Peer::join(&server, "alice");
    let id = record_remote(&server, &mut alice, "ridge");

    let recolor = |color| ActionRequest::Recolor { path_id: id, color };
    let first = server.handle_action(alice.actor, recolor(0xFF112233));
    let second = server.handle_action(alice.actor, recolor(0xFF445566));
    let (ServerMessage::Result(a), ServerMessage::Result(b)) =
        (&first[0].message, &second[0].message)
    else {
        panic!("expected results");
    };
    assert!(b.seq > a.seq);
    assert!(a.ack_seq.is_some());

    // Applying the newer result first makes the older one stale.
    alice.deliver(&second[0]);
    assert_eq!(alice.deliver(&first[0]), Inbound::Duplicate);
    assert_eq!(alice.client.store().get(&id).unwrap().color(), 0xFF445566);
}

#[test]
fn test_ack_drops_only_older_results() {
    let server = PathServer::new(RecordingConfig::server());
    let mut alice = Peer::join(&server, "alice");
    let id = record_remote(&server, &mut alice, "ridge");

    let mut seqs = Vec::new();
    for color in [0xFF000001u32, 0xFF000002, 0xFF000003] {
        let request = ActionRequest::Recolor { path_id: id, color };
        let reply = server.handle_action(alice.actor, request);
        if let ServerMessage::Result(result) = &reply[0].message {
            seqs.push(result.seq);
        }
    }
    server.apply_message(alice.actor, ClientMessage::Ack { seq: seqs[1] });

    let pending = server.pending_retransmits(&alice.actor);
    assert_eq!(pending.len(), 1);
    let ServerMessage::Result(left) = &pending[0].message else {
        panic!("expected a result");
    };
    assert_eq!(left.seq, seqs[2]);
}

#[test]
fn test_reconnect_starts_fresh_sequence() {
    let server = PathServer::new(RecordingConfig::server());
    let mut alice = Peer::join(&server, "alice");
    let id = record_remote(&server, &mut alice, "ridge");

    server.disconnect(&alice.actor);
    alice.client.disconnect();
    let welcome = server.connect(alice.actor, "alice");
    alice.reconnect_wire();
    alice.deliver(&welcome);

    let replies = server.handle_action(
        alice.actor,
        ActionRequest::Rename {
            path_id: id,
            name: "again".to_string(),
        },
    );
    let ServerMessage::Result(result) = &replies[0].message else {
        panic!("expected a result");
    };
    assert_eq!(result.seq, 1);
    assert!(matches!(alice.deliver(&replies[0]), Inbound::Result { success: true, .. }));
}

// ============================================================================
// Authorization
// ============================================================================

#[test]
fn test_only_owner_can_rename() {
    let server = PathServer::new(RecordingConfig::server());
    let mut alice = Peer::join(&server, "alice");
    let mut bob = Peer::join(&server, "bob");
    let id = record_remote(&server, &mut alice, "ridge");

    alice.client.share(id, bob.actor).unwrap();
    flush(&server, &mut [&mut alice, &mut bob]);
    assert_eq!(bob.client.store().origin_of(&id), Some(Origin::ServerShared));

    // The client refuses locally...
    assert!(matches!(
        bob.client.rename(id, "mine now"),
        Err(ClientError::NotOwner(_))
    ));
    // ...and the server refuses too, returning the authoritative path.
    let replies = server.handle_action(
        bob.actor,
        ActionRequest::Rename {
            path_id: id,
            name: "mine now".to_string(),
        },
    );
    let ServerMessage::Result(result) = &replies[0].message else {
        panic!("expected a result");
    };
    assert!(!result.success);
    assert_eq!(result.path.as_ref().map(|p| p.name()), Some("ridge"));
    assert_eq!(server.path(&id).unwrap().name(), "ridge");
}

#[test]
fn test_recipient_delete_unshares() {
    let server = PathServer::new(RecordingConfig::server());
    let mut alice = Peer::join(&server, "alice");
    let mut bob = Peer::join(&server, "bob");
    let id = record_remote(&server, &mut alice, "ridge");

    alice.client.share(id, bob.actor).unwrap();
    flush(&server, &mut [&mut alice, &mut bob]);

    assert_eq!(bob.client.delete(id).unwrap(), MutationOutcome::Sent);
    assert!(bob.client.store().get(&id).is_none());
    flush(&server, &mut [&mut alice, &mut bob]);

    let kept = server.path(&id).expect("owner keeps the path");
    assert!(!kept.is_shared_with(&bob.actor));
    assert!(server.snapshot_for(&bob.actor).is_empty());

    bob.client.request_sync().unwrap();
    flush(&server, &mut [&mut alice, &mut bob]);
    assert!(bob.client.store().get(&id).is_none());
}

#[test]
fn test_owner_delete_removes_path() {
    let server = PathServer::new(RecordingConfig::server());
    let mut alice = Peer::join(&server, "alice");
    let id = record_remote(&server, &mut alice, "ridge");

    assert_eq!(alice.client.delete(id).unwrap(), MutationOutcome::Sent);
    flush(&server, &mut [&mut alice]);
    assert!(server.path(&id).is_none());
    assert!(alice.client.store().is_empty());
}

// ============================================================================
// Sharing
// ============================================================================

#[test]
fn test_sharing_local_path_uploads_fork() {
    let server = PathServer::new(RecordingConfig::server());
    let mut alice = Peer::join(&server, "alice");
    let mut bob = Peer::join(&server, "bob");
    let local = record_local(&mut alice, "garden");

    assert_eq!(alice.client.share(local, bob.actor).unwrap(), MutationOutcome::Sent);
    flush(&server, &mut [&mut alice, &mut bob]);

    // The local original is untouched.
    assert_eq!(alice.client.store().origin_of(&local), Some(Origin::Local));

    let owned = alice.client.store().all_with_origin(&[Origin::ServerOwned]);
    assert_eq!(owned.len(), 1);
    let fork = owned[0];
    assert_ne!(fork.id(), local);
    assert_eq!(fork.lineage().origin_id, local);
    assert!(alice.client.store().is_visible(&fork.id()));

    let received = bob.client.store().get(&fork.id()).expect("bob got the share");
    assert_eq!(received.name(), "garden");
    assert!(bob.client.store().is_visible(&fork.id()));
    assert_eq!(bob.client.store().origin_of(&fork.id()), Some(Origin::ServerShared));
}

#[test]
fn test_share_requires_connection() {
    let server = PathServer::new(RecordingConfig::server());
    let mut alice = Peer::join(&server, "alice");
    let local = record_local(&mut alice, "garden");
    alice.client.disconnect();
    assert!(matches!(
        alice.client.share(local, ActorId::new()),
        Err(ClientError::Offline)
    ));
}

// ============================================================================
// Offline fallback
// ============================================================================

#[test]
fn test_offline_rename_is_corrected_by_full_sync() {
    let server = PathServer::new(RecordingConfig::server());
    let mut alice = Peer::join(&server, "alice");
    let id = record_remote(&server, &mut alice, "ridge");

    alice.open.set(false);
    assert_eq!(
        alice.client.rename(id, "offline name").unwrap(),
        MutationOutcome::LocalOnly
    );
    assert_eq!(alice.client.store().get(&id).unwrap().name(), "offline name");

    alice.open.set(true);
    alice.client.request_sync().unwrap();
    flush(&server, &mut [&mut alice]);
    assert_eq!(alice.client.store().get(&id).unwrap().name(), "ridge");
}

#[test]
fn test_rejected_input_leaves_state_alone() {
    let server = PathServer::new(RecordingConfig::server());
    let mut alice = Peer::join(&server, "alice");
    let id = record_remote(&server, &mut alice, "ridge");

    assert!(matches!(
        alice.client.rename(id, "   "),
        Err(ClientError::Validation(_))
    ));
    assert!(matches!(
        alice.client.recolor_from_str(id, "not-a-color"),
        Err(ClientError::Validation(_))
    ));
    assert!(alice.take_sent().is_empty());
    assert_eq!(alice.client.store().get(&id).unwrap().name(), "ridge");
}

#[test]
fn test_garbage_is_dropped() {
    let server = PathServer::new(RecordingConfig::server());
    let mut alice = Peer::join(&server, "alice");
    let id = record_remote(&server, &mut alice, "ridge");

    assert_eq!(
        alice.client.handle_message(Channel::Sync, b"definitely not cbor"),
        Inbound::Dropped
    );
    assert!(alice.client.store().contains(&id));
    assert!(server
        .handle_message(alice.actor, Channel::Actions, &[0xff, 0x00])
        .is_empty());
}

// ============================================================================
// Server recording
// ============================================================================

#[test]
fn test_tick_stops_and_saves_at_limit() {
    let mut config = RecordingConfig::server();
    config.max_points = 3;
    let server = PathServer::new(config);
    let mut alice = Peer::join(&server, "alice");

    server.update_position(here(alice.actor, 0.0));
    alice.client.start_remote_recording(None).unwrap();
    flush(&server, &mut [&mut alice]);

    assert!(server.tick(vec![here(alice.actor, 5.0)]).is_empty());
    assert!(server.tick(vec![here(alice.actor, 10.0)]).is_empty());
    let stopped = server.tick(vec![here(alice.actor, 15.0)]);
    assert_eq!(stopped.len(), 1);
    alice.deliver(&stopped[0]);

    assert!(!alice.client.is_remote_recording());
    let saved = alice.client.find_by_name("Path 1").expect("saved path");
    assert_eq!(saved.point_count(), 3);
    assert_eq!(alice.client.store().origin_of(&saved.id()), Some(Origin::ServerOwned));
}

#[test]
fn test_start_without_position_fails() {
    let server = PathServer::new(RecordingConfig::server());
    let mut alice = Peer::join(&server, "alice");
    alice.client.start_remote_recording(Some("nowhere")).unwrap();
    flush(&server, &mut [&mut alice]);
    assert!(!alice.client.is_remote_recording());
    assert!(!server.recorder().is_recording(&alice.actor));
}

#[test]
fn test_disconnect_cancels_server_recording() {
    let server = PathServer::new(RecordingConfig::server());
    let mut alice = Peer::join(&server, "alice");
    server.update_position(here(alice.actor, 0.0));
    alice.client.start_remote_recording(Some("trip")).unwrap();
    flush(&server, &mut [&mut alice]);
    assert!(server.recorder().is_recording(&alice.actor));

    server.disconnect(&alice.actor);
    assert!(!server.recorder().is_recording(&alice.actor));
    assert!(server.pending_retransmits(&alice.actor).is_empty());
    assert_eq!(server.path_count(), 0);
}
