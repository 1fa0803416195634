use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::sync::mpsc::{error::TrySendError, Sender};
use tokio_tungstenite::tungstenite::Message;

use crate::types::BroadcastMessage;

pub type ConnId = u64;

/// Broadcasts a member may fall behind by before it is dropped.
pub const OUTBOUND_QUEUE: usize = 64;

/// Live members of the chaos channel. Each member is the outbound queue of
/// one connection; its writer task owns the socket.
#[derive(Clone, Default)]
pub struct Session {
    members: Arc<Mutex<HashMap<ConnId, Sender<Message>>>>,
    next_id: Arc<AtomicU64>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, tx: Sender<Message>) -> ConnId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.members.lock().insert(id, tx);
        id
    }

    pub fn leave(&self, id: ConnId) {
        self.members.lock().remove(&id);
    }

    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sends to every member without waiting. A member whose queue is closed
    /// or full (a peer that stopped reading) is dropped; the rest still
    /// receive. Returns the number of deliveries.
    pub fn broadcast(&self, msg: &BroadcastMessage) -> usize {
        let text = match serde_json::to_string(msg) {
            Ok(t) => t,
            Err(e) => {
                tracing::error!("failed to encode broadcast: {}", e);
                return 0;
            }
        };

        let mut members = self.members.lock();
        let mut dead = Vec::new();
        for (id, tx) in members.iter() {
            match tx.try_send(Message::text(text.clone())) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(conn = id, "dropping member, outbound queue full");
                    dead.push(*id);
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::warn!(conn = id, "dropping member after failed delivery");
                    dead.push(*id);
                }
            }
        }
        for id in &dead {
            members.remove(id);
        }
        members.len()
    }
}
