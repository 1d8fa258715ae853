// 🔔 Realtime Channel Manager - Per-household broadcast groups
//
// Registry of live connections grouped by household id.
// Constructed once at startup and handed out as Arc<ChannelManager>.
// Nothing here is persisted: a restart drops every group and clients rejoin.
//
// Delivery is best-effort. A connection whose outbound queue is full or
// closed silently misses the event; there is no ack and no replay.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::ChannelError;
use crate::events::ServerEvent;

/// Default outbound queue depth per connection.
pub const DEFAULT_CONNECTION_BUFFER: usize = 64;

// ============================================================================
// CONNECTION IDENTITY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        ConnectionId(uuid::Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered connection: its id plus the stream of events addressed to it.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub events: mpsc::Receiver<ServerEvent>,
}

// ============================================================================
// BROADCASTER SEAM
// ============================================================================

/// Anything that can fan an event out to a household group.
pub trait Broadcaster: Send + Sync {
    /// Returns how many connections the event was handed to.
    fn broadcast(&self, household_id: &str, event: ServerEvent) -> Result<usize, ChannelError>;
}

// ============================================================================
// MANAGER
// ============================================================================

struct ConnectionEntry {
    sender: mpsc::Sender<ServerEvent>,
    groups: HashSet<String>,
}

#[derive(Default)]
struct Registry {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    groups: HashMap<String, HashSet<ConnectionId>>,
}

pub struct ChannelManager {
    registry: RwLock<Registry>,
    buffer: usize,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_CONNECTION_BUFFER)
    }

    pub fn with_buffer(buffer: usize) -> Self {
        ChannelManager {
            registry: RwLock::new(Registry::default()),
            buffer: buffer.max(1),
        }
    }

    // Every operation leaves the registry consistent, so a poisoned lock
    // still guards valid data.
    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a new live connection (Connecting → Connected).
    pub fn connect(&self) -> Connection {
        let id = ConnectionId::new();
        let (sender, events) = mpsc::channel(self.buffer);

        self.write().connections.insert(
            id,
            ConnectionEntry {
                sender,
                groups: HashSet::new(),
            },
        );

        debug!(connection_id = %id, "Connection registered");
        Connection { id, events }
    }

    /// Add a connection to a household group. Idempotent.
    ///
    /// Returns true if the connection was newly added. Unknown (already
    /// disconnected) connections are ignored.
    pub fn join(&self, connection_id: ConnectionId, household_id: &str) -> bool {
        let mut registry = self.write();
        let Some(entry) = registry.connections.get_mut(&connection_id) else {
            debug!(connection_id = %connection_id, household_id, "Join from unknown connection ignored");
            return false;
        };

        if !entry.groups.insert(household_id.to_string()) {
            return false;
        }

        registry
            .groups
            .entry(household_id.to_string())
            .or_default()
            .insert(connection_id);

        debug!(connection_id = %connection_id, household_id, "Joined household group");
        true
    }

    /// Remove a connection from a household group. Idempotent; never closes
    /// the connection.
    pub fn leave(&self, connection_id: ConnectionId, household_id: &str) -> bool {
        let mut registry = self.write();
        let was_member = registry
            .connections
            .get_mut(&connection_id)
            .map(|entry| entry.groups.remove(household_id))
            .unwrap_or(false);

        if let Some(members) = registry.groups.get_mut(household_id) {
            members.remove(&connection_id);
            if members.is_empty() {
                registry.groups.remove(household_id);
            }
        }

        if was_member {
            debug!(connection_id = %connection_id, household_id, "Left household group");
        }
        was_member
    }

    /// Drop a connection and remove it from every group it joined
    /// (→ Disconnected). Peers are not notified.
    pub fn disconnect(&self, connection_id: ConnectionId) {
        let mut registry = self.write();
        let Some(entry) = registry.connections.remove(&connection_id) else {
            return;
        };

        for household_id in &entry.groups {
            if let Some(members) = registry.groups.get_mut(household_id) {
                members.remove(&connection_id);
                if members.is_empty() {
                    registry.groups.remove(household_id);
                }
            }
        }

        debug!(
            connection_id = %connection_id,
            groups = entry.groups.len(),
            "Connection disconnected"
        );
    }

    /// Households a connection currently belongs to.
    pub fn groups_of(&self, connection_id: ConnectionId) -> Vec<String> {
        let mut groups: Vec<String> = self
            .read()
            .connections
            .get(&connection_id)
            .map(|entry| entry.groups.iter().cloned().collect())
            .unwrap_or_default();
        groups.sort();
        groups
    }

    pub fn group_size(&self, household_id: &str) -> usize {
        self.read().groups.get(household_id).map_or(0, HashSet::len)
    }

    pub fn is_connected(&self, connection_id: ConnectionId) -> bool {
        self.read().connections.contains_key(&connection_id)
    }

    pub fn connection_count(&self) -> usize {
        self.read().connections.len()
    }

    /// Send a reply to one connection only. Returns false if it was dropped.
    pub fn send_to(&self, connection_id: ConnectionId, event: ServerEvent) -> bool {
        self.read()
            .connections
            .get(&connection_id)
            .map(|entry| entry.sender.try_send(event).is_ok())
            .unwrap_or(false)
    }
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster for ChannelManager {
    /// Deliver to every connection in the group at call time.
    fn broadcast(&self, household_id: &str, event: ServerEvent) -> Result<usize, ChannelError> {
        event.validate_for_group(household_id)?;

        let registry = self.read();
        let Some(members) = registry.groups.get(household_id) else {
            trace!(household_id, event = event.name(), "Broadcast to empty group");
            return Ok(0);
        };

        let mut delivered = 0;
        for connection_id in members {
            let Some(entry) = registry.connections.get(connection_id) else {
                continue;
            };
            match entry.sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    // Best-effort: a slow or departing client misses this one.
                    trace!(connection_id = %connection_id, household_id, error = %e, "Dropped broadcast");
                }
            }
        }

        debug!(
            household_id,
            event = event.name(),
            recipients = members.len(),
            delivered,
            "Broadcast sent"
        );
        Ok(delivered)
    }
}
