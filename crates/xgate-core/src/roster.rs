//! Per-user roster manager: the buddy list backends push updates into via
//! `BUDDY_CHANGED`, and the conversation router reads from to resolve a
//! one-to-one sender JID (spec §4.4 case (a)).
//!
//! The storage backend is an external collaborator (spec §1); what's
//! modeled here is the interface `xgate-core` needs plus a DashMap-backed
//! default implementation, in the same style as
//! `ConnectionRegistry`'s wrap-a-DashMap-in-a-newtype pattern.

use dashmap::DashMap;
use jid::BareJid;

use crate::types::LegacyShow;

/// One entry in a user's legacy buddy list.
#[derive(Debug, Clone)]
pub struct Buddy {
    /// Backend-assigned id; `-1` marks a buddy the gateway synthesized on
    /// first sight rather than one the backend's roster already knew
    /// about (spec §4.3 dispatch: "create if absent with synthetic id -1").
    pub id: i64,
    pub legacy_name: String,
    pub alias: Option<String>,
    pub groups: Vec<String>,
    pub status: LegacyShow,
    pub status_message: Option<String>,
    pub icon_hash: Option<String>,
    /// The XMPP JID this buddy appears as to the local user. Computed once
    /// at first sight from `legacy_name` using the configured rewrite rule
    /// and held stable thereafter.
    pub jid: BareJid,
}

/// An incoming `BUDDY_CHANGED` envelope's fields, pre-parsed from the wire
/// type so `RosterManager` impls don't depend on `xgate-wire`.
#[derive(Debug, Clone)]
pub struct BuddyChange {
    pub legacy_name: String,
    pub alias: Option<String>,
    pub groups: Vec<String>,
    pub status: LegacyShow,
    pub status_message: Option<String>,
    pub icon_hash: Option<String>,
}

/// Per-user roster storage, consulted by the conversation router and
/// mutated by backend dispatch (spec §4.3 BUDDY_CHANGED handling).
pub trait RosterManager: Send + Sync + 'static {
    /// Look up a buddy's JID by legacy name, for sender-JID resolution.
    fn buddy_by_legacy_name(&self, legacy_name: &str) -> Option<Buddy>;

    /// Create-or-update a buddy from an incoming `BUDDY_CHANGED` envelope.
    /// Returns the buddy's current state after the upsert.
    fn upsert_buddy(&self, change: BuddyChange, jid: BareJid) -> Buddy;

    /// All buddies currently known, for roster-push/iq-result purposes.
    fn all_buddies(&self) -> Vec<Buddy>;
}

/// Default `RosterManager`: an in-process DashMap keyed by legacy name.
#[derive(Debug, Default)]
pub struct InMemoryRosterManager {
    buddies: DashMap<String, Buddy>,
}

impl InMemoryRosterManager {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RosterManager for InMemoryRosterManager {
    fn buddy_by_legacy_name(&self, legacy_name: &str) -> Option<Buddy> {
        self.buddies.get(legacy_name).map(|entry| entry.clone())
    }

    fn upsert_buddy(&self, change: BuddyChange, jid: BareJid) -> Buddy {
        let buddy = self
            .buddies
            .entry(change.legacy_name.clone())
            .and_modify(|existing| {
                existing.alias = change.alias.clone();
                existing.groups = change.groups.clone();
                existing.status = change.status;
                existing.status_message = change.status_message.clone();
                existing.icon_hash = change.icon_hash.clone();
            })
            .or_insert_with(|| Buddy {
                id: -1,
                legacy_name: change.legacy_name.clone(),
                alias: change.alias.clone(),
                groups: change.groups.clone(),
                status: change.status,
                status_message: change.status_message.clone(),
                icon_hash: change.icon_hash.clone(),
                jid,
            });
        buddy.clone()
    }

    fn all_buddies(&self) -> Vec<Buddy> {
        self.buddies.iter().map(|entry| entry.clone()).collect()
    }
}
