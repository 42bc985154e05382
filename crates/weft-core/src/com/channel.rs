//! Named channels joining signals and slots declared by different graphs.
//!
//! Every signal that joins a channel is connected to every slot of that
//! channel, whichever member joined first. Members leave as a whole or one
//! owner at a time, severing exactly the connections they took part in.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};
use parking_lot::Mutex;

use crate::com::connection::Connection;
use crate::com::error::ConnectionError;
use crate::com::signal::AnySignal;
use crate::com::slot::Slot;

/// Identity of one party joining channels, typically a configuration graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberId(u64);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "member#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelKey {
    /// Shared by every member using the same name.
    Named(String),
    /// Seen by one member only: an unnamed connection declaration.
    Private(MemberId, usize),
}

impl ChannelKey {
    pub fn for_declaration(name: Option<&str>, member: MemberId, index: usize) -> Self {
        match name {
            Some(name) => ChannelKey::Named(name.to_string()),
            None => ChannelKey::Private(member, index),
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKey::Named(name) => f.write_str(name),
            ChannelKey::Private(member, index) => write!(f, "{}/{}", member, index),
        }
    }
}

struct Endpoint<T> {
    member: MemberId,
    owner: String,
    target: T,
}

struct Link {
    signal: (MemberId, String),
    slot: (MemberId, String),
    connection: Connection,
}

impl Link {
    fn involves(&self, member: MemberId, owner: Option<&str>) -> bool {
        let side = |(m, o): &(MemberId, String)| *m == member && owner.is_none_or(|owner| owner == o.as_str());
        side(&self.signal) || side(&self.slot)
    }
}

#[derive(Default)]
struct Channel {
    signals: Vec<Endpoint<Arc<dyn AnySignal>>>,
    slots: Vec<Endpoint<Arc<Slot>>>,
    links: Vec<Link>,
}

impl Channel {
    fn is_empty(&self) -> bool {
        self.signals.is_empty() && self.slots.is_empty()
    }

    /// Remove the endpoints of `member` (or of one of its owners) and
    /// disconnect their links; returns how many links were severed.
    fn remove(&mut self, member: MemberId, owner: Option<&str>) -> usize {
        let matches = |m: MemberId, o: &str| m == member && owner.is_none_or(|owner| owner == o);
        self.signals.retain(|e| !matches(e.member, &e.owner));
        self.slots.retain(|e| !matches(e.member, &e.owner));
        let (severed, kept): (Vec<Link>, Vec<Link>) =
            std::mem::take(&mut self.links).into_iter().partition(|l| l.involves(member, owner));
        self.links = kept;
        severed.iter().filter(|l| l.connection.disconnect()).count()
    }
}

/// Channel table shared by every graph of a context.
#[derive(Default)]
pub struct ChannelRegistry {
    next_member: AtomicU64,
    channels: Mutex<BTreeMap<ChannelKey, Channel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_member(&self) -> MemberId {
        MemberId(self.next_member.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Add `signal`, owned by `owner`, to `channel` and connect it to every
    /// slot already there.
    ///
    /// A failure against a slot of the same member is returned once every
    /// other slot has been tried; failures against other members' slots are
    /// logged and skipped. The signal stays in the channel either way.
    pub fn join_signal(
        &self,
        channel: &ChannelKey,
        member: MemberId,
        owner: &str,
        signal: Arc<dyn AnySignal>,
    ) -> Result<usize, ConnectionError> {
        let mut channels = self.channels.lock();
        let entry = channels.entry(channel.clone()).or_default();
        let mut links = Vec::new();
        let mut first_error = None;
        for slot in &entry.slots {
            match signal.connect_slot(&slot.target) {
                Ok(connection) => links.push(Link {
                    signal: (member, owner.to_string()),
                    slot: (slot.member, slot.owner.clone()),
                    connection,
                }),
                Err(e) => record(channel, member, slot.member, e, &mut first_error),
            }
        }
        let joined = links.len();
        entry.links.extend(links);
        entry.signals.push(Endpoint {
            member,
            owner: owner.to_string(),
            target: signal,
        });
        debug!("{} joined channel '{}' with a signal of '{}' ({} link(s))", member, channel, owner, joined);
        first_error.map_or(Ok(joined), Err)
    }

    /// Add `slot`, owned by `owner`, to `channel` and connect every signal
    /// already there to it. Errors are reported as for [`join_signal`](Self::join_signal).
    pub fn join_slot(
        &self,
        channel: &ChannelKey,
        member: MemberId,
        owner: &str,
        slot: Arc<Slot>,
    ) -> Result<usize, ConnectionError> {
        let mut channels = self.channels.lock();
        let entry = channels.entry(channel.clone()).or_default();
        let mut links = Vec::new();
        let mut first_error = None;
        for signal in &entry.signals {
            match signal.target.connect_slot(&slot) {
                Ok(connection) => links.push(Link {
                    signal: (signal.member, signal.owner.clone()),
                    slot: (member, owner.to_string()),
                    connection,
                }),
                Err(e) => record(channel, member, signal.member, e, &mut first_error),
            }
        }
        let joined = links.len();
        entry.links.extend(links);
        entry.slots.push(Endpoint {
            member,
            owner: owner.to_string(),
            target: slot,
        });
        debug!("{} joined channel '{}' with a slot of '{}' ({} link(s))", member, channel, owner, joined);
        first_error.map_or(Ok(joined), Err)
    }

    /// Withdraw every endpoint `member` joined; returns the links severed.
    pub fn leave(&self, member: MemberId) -> usize {
        self.remove(member, None)
    }

    /// Withdraw the endpoints `member` joined on behalf of `owner`.
    pub fn leave_owner(&self, member: MemberId, owner: &str) -> usize {
        self.remove(member, Some(owner))
    }

    /// Live connections `member` takes part in.
    pub fn link_count(&self, member: MemberId) -> usize {
        self.channels
            .lock()
            .values()
            .flat_map(|c| c.links.iter())
            .filter(|l| l.involves(member, None) && l.connection.is_connected())
            .count()
    }

    /// Names of the shared channels currently joined by anyone.
    pub fn names(&self) -> Vec<String> {
        self.channels
            .lock()
            .keys()
            .filter_map(|key| match key {
                ChannelKey::Named(name) => Some(name.clone()),
                ChannelKey::Private(..) => None,
            })
            .collect()
    }

    fn remove(&self, member: MemberId, owner: Option<&str>) -> usize {
        let mut channels = self.channels.lock();
        let mut severed = 0;
        for channel in channels.values_mut() {
            severed += channel.remove(member, owner);
        }
        channels.retain(|_, channel| !channel.is_empty());
        if severed > 0 {
            debug!("{} left its channels ({} connection(s) removed)", member, severed);
        }
        severed
    }
}

fn record(
    channel: &ChannelKey,
    member: MemberId,
    other: MemberId,
    error: ConnectionError,
    first_error: &mut Option<ConnectionError>,
) {
    match error {
        ConnectionError::AlreadyConnected { .. } => debug!("Channel '{}': {}", channel, error),
        error if other == member => {
            first_error.get_or_insert(error);
        }
        error => warn!("Channel '{}' could not link {} to {}: {}", channel, member, other, error),
    }
}

impl fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channels = self.channels.lock();
        f.debug_map()
            .entries(
                channels
                    .iter()
                    .map(|(key, c)| (key.to_string(), (c.signals.len(), c.slots.len(), c.links.len()))),
            )
            .finish()
    }
}
