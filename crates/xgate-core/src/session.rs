//! User session (C7) and user manager (C8): the mapping between an XMPP
//! bare JID and an owning backend client, plus the login/logout handshake
//! and MUC join/leave translation (spec §4.5).
//!
//! Grounded on `networkpluginserver.cpp`'s `User` class (`handleConnected`,
//! `handleDisconnected`, `handleRoomJoined`/`handleRoomLeft`) and on
//! `UserManager::getUser`/`removeUser`. The signal/slot wiring
//! (`onReadyToConnect`, `onDestroyed`) the original drives this through
//! becomes direct method calls here, since the gateway itself provides the
//! event loop these used to be posted onto (spec §9 "Callbacks").

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use jid::{BareJid, FullJid};

use xgate_wire::{JoinRoom, LeaveRoom, WrapperType};

use crate::client::ClientId;
use crate::config::{GatewayConfig, UserSettings};
use crate::conversation::{ConversationManager, HandleMessageCtx, InboundMessage, ParticipantChange};
use crate::error::{GatewayError, Result};
use crate::roster::{BuddyChange, InMemoryRosterManager, RosterManager};
use crate::supervisor::{login_envelope, logout_envelope, BackendDispatch, BackendSupervisor};
use crate::transport::{MessageKind, OutboundEvent, OutboundMessage, OutboundSink};
use crate::types::{jid_escape_node, rewrite_legacy_name};

/// Legacy-network login for one XMPP user. The account store that supplies
/// these is an external collaborator (spec §1's roster storage backend);
/// only the lookup surface lives here.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub legacy_name: String,
    pub password: String,
}

pub trait CredentialStore: Send + Sync + 'static {
    fn credentials_for(&self, bare_jid: &BareJid) -> Option<UserCredentials>;
}

/// Reads `[users."<bare-jid>"]` entries out of the loaded `GatewayConfig`.
/// A placeholder account store for deployments with no external one wired
/// in yet (spec §1 lists the real roster/account store as an external
/// collaborator).
pub struct ConfigCredentialStore {
    config: Arc<GatewayConfig>,
}

impl ConfigCredentialStore {
    pub fn new(config: Arc<GatewayConfig>) -> Self {
        Self { config }
    }
}

impl CredentialStore for ConfigCredentialStore {
    fn credentials_for(&self, bare_jid: &BareJid) -> Option<UserCredentials> {
        let entry = self.config.users.get(&bare_jid.to_string())?;
        Some(UserCredentials {
            legacy_name: entry.legacy_name.clone(),
            password: entry.password.clone(),
        })
    }
}

/// Lifecycle state of a `UserSession`, mirroring the original's
/// `readyToConnect`/`onConnected`/`onDisconnected` signal sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    AwaitingClient,
    AwaitingConnected,
    Connected,
}

/// Binds one XMPP bare JID to a backend client (spec §3 "User session").
pub struct UserSession {
    pub bare_jid: BareJid,
    legacy_name: String,
    password: String,
    client_id: Option<ClientId>,
    state: SessionState,
    pub roster: Arc<dyn RosterManager>,
    pub conversations: ConversationManager,
    outbound: Arc<dyn OutboundSink>,
    /// Full JIDs (resources) currently presence-available for this user,
    /// independent of any one conversation's `jids`. Drives the
    /// "should cache messages" predicate (spec §4.4 step 3).
    online_resources: HashSet<FullJid>,
}

impl UserSession {
    pub fn is_online(&self) -> bool {
        !self.online_resources.is_empty()
    }
}

/// Creates/destroys sessions on XMPP presence and routes backend callbacks
/// to the right one (spec §3, §4.5). Implements `BackendDispatch` so the
/// supervisor can hand it envelopes without knowing about sessions or
/// conversations.
pub struct UserManager {
    sessions: DashMap<String, UserSession>,
    supervisor: Arc<BackendSupervisor>,
    credentials: Arc<dyn CredentialStore>,
    settings: Arc<dyn UserSettings>,
    config: Arc<GatewayConfig>,
    gateway_domain: String,
    gateway_bare_jid: BareJid,
}

impl UserManager {
    pub fn new(
        supervisor: Arc<BackendSupervisor>,
        credentials: Arc<dyn CredentialStore>,
        settings: Arc<dyn UserSettings>,
        config: Arc<GatewayConfig>,
        gateway_domain: impl Into<String>,
    ) -> Result<Self> {
        let gateway_domain = gateway_domain.into();
        let gateway_bare_jid = BareJid::from_str(&gateway_domain)
            .map_err(|e| GatewayError::InvalidJid(format!("{gateway_domain}: {e}")))?;
        Ok(Self {
            sessions: DashMap::new(),
            supervisor,
            credentials,
            settings,
            config,
            gateway_domain,
            gateway_bare_jid,
        })
    }

    /// On first presence from a JID, construct its session and immediately
    /// request a backend assignment ("ready-to-connect", spec §4.5).
    /// Presence-unavailable from an already-sessionless JID is a no-op.
    pub async fn handle_presence(
        &self,
        from: FullJid,
        available: bool,
        outbound: Arc<dyn OutboundSink>,
    ) {
        let user = from.to_bare().to_string();

        if available {
            let is_new = !self.sessions.contains_key(&user);
            if is_new {
                let Some(creds) = self.credentials.credentials_for(&from.to_bare()) else {
                    tracing::warn!(%user, "presence from a JID with no legacy credentials on file");
                    return;
                };
                let session = UserSession {
                    bare_jid: from.to_bare(),
                    legacy_name: creds.legacy_name,
                    password: creds.password,
                    client_id: None,
                    state: SessionState::AwaitingClient,
                    roster: Arc::new(InMemoryRosterManager::new()),
                    conversations: ConversationManager::new(
                        from.to_bare(),
                        self.gateway_domain.clone(),
                        Arc::clone(&outbound),
                    ),
                    outbound,
                    online_resources: HashSet::new(),
                };
                self.sessions.insert(user.clone(), session);
                tracing::info!(%user, "user session created; requesting backend assignment");
                if let Some(id) = self.supervisor.request_assignment(&user).await {
                    self.complete_assignment(&user, id);
                }
            }
            if let Some(mut session) = self.sessions.get_mut(&user) {
                session.online_resources.insert(from);
            }
        } else if let Some(mut session) = self.sessions.get_mut(&user) {
            session.online_resources.remove(&from);
            if session.online_resources.is_empty() {
                drop(session);
                self.destroy_session(&user, None);
            }
        }
    }

    fn complete_assignment(&self, user: &str, id: ClientId) {
        let Some(mut session) = self.sessions.get_mut(user) else {
            return;
        };
        session.client_id = Some(id);
        session.state = SessionState::AwaitingConnected;
        let envelope = login_envelope(user, &session.legacy_name, &session.password);
        self.supervisor.send_to(id, envelope);
    }

    /// Explicit or presence-driven teardown: LOGOUT the owning client,
    /// tear down every MUC this user was in, and drop the session (spec
    /// §4.5 "On user unavailability or explicit destruction").
    fn destroy_session(&self, user: &str, reason: Option<&str>) {
        let Some((_, session)) = self.sessions.remove(user) else {
            return;
        };
        if let Err(e) = session.conversations.destroy_all_rooms() {
            tracing::warn!(%user, error = %e, "failed to tear down rooms on session destruction");
        }
        if let Some(id) = session.client_id {
            self.supervisor.send_to(id, logout_envelope(user, &session.legacy_name));
            self.supervisor.remove_user(id, user);
        }
        if let Some(reason) = reason {
            session.outbound.emit(OutboundEvent::Message(OutboundMessage {
                from: jid::Jid::Bare(self.gateway_bare_jid.clone()),
                to: jid::Jid::Bare(session.bare_jid),
                kind: MessageKind::Chat,
                body: reason.to_string(),
                subject: None,
                delay: None,
            }));
        }
    }

    fn buddy_jid(&self, legacy_name: &str) -> Result<BareJid> {
        let node = if self.config.service.jid_escaping {
            jid_escape_node(legacy_name)
        } else {
            rewrite_legacy_name(legacy_name)
        };
        BareJid::from_str(&format!("{node}@{}", self.gateway_domain))
            .map_err(|e| GatewayError::InvalidJid(format!("{node}@{}: {e}", self.gateway_domain)))
    }

    /// Join (or, on `available=false`, leave) a MUC, translating to
    /// JOIN_ROOM/LEAVE_ROOM and eagerly creating the conversation on join
    /// (spec §4.5 "Room join/leave").
    pub fn handle_muc_presence(
        &self,
        from: FullJid,
        room: &str,
        nickname: &str,
        password: Option<String>,
        available: bool,
    ) {
        let user = from.to_bare().to_string();
        let Some(session) = self.sessions.get(&user) else {
            tracing::warn!(%user, room, "MUC presence for a JID with no session");
            return;
        };
        let Some(client_id) = session.client_id else {
            tracing::warn!(%user, room, "MUC presence before backend assignment completed");
            return;
        };

        if available {
            let mut conv = session.conversations.get_or_create(room, true);
            conv.nickname = nickname.to_string();
            conv.join(from.clone());
            if let Err(e) = conv.send_participants(jid::Jid::Full(from)) {
                tracing::warn!(%user, room, error = %e, "failed to send participant roster on join");
            }
            drop(conv);
            self.supervisor.send_to(
                client_id,
                xgate_wire::wrap(
                    WrapperType::JoinRoom,
                    JoinRoom {
                        user: user.clone(),
                        room: room.to_string(),
                        nickname: nickname.to_string(),
                        password,
                    },
                ),
            );
        } else {
            let mut should_remove = false;
            if let Some(mut conv) = session.conversations.get_mut(room) {
                conv.leave(&from);
                should_remove = conv.jids.is_empty();
            }
            if should_remove {
                session.conversations.remove(room);
            }
            self.supervisor.send_to(
                client_id,
                xgate_wire::wrap(
                    WrapperType::LeaveRoom,
                    LeaveRoom {
                        user: user.clone(),
                        room: room.to_string(),
                    },
                ),
            );
        }
    }
}

impl BackendDispatch for UserManager {
    fn on_connected(&self, user: &str, legacy_name: &str) {
        if let Some(mut session) = self.sessions.get_mut(user) {
            session.state = SessionState::Connected;
        }
        tracing::info!(user, legacy_name, "backend session connected");
    }

    fn on_disconnected(&self, user: &str, message: &str) {
        self.destroy_session(user, Some(message));
    }

    fn on_client_dead(&self, user: &str) {
        self.destroy_session(user, Some("Internal Server Error, please reconnect."));
    }

    fn on_client_assigned(&self, user: &str, client_id: ClientId) {
        self.complete_assignment(user, client_id);
    }

    fn on_buddy_changed(&self, user: &str, buddy_name: &str, change: BuddyChange) {
        let Some(session) = self.sessions.get(user) else {
            return;
        };
        let jid = match self.buddy_jid(buddy_name) {
            Ok(jid) => jid,
            Err(e) => {
                tracing::warn!(user, buddy_name, error = %e, "could not derive buddy JID");
                return;
            }
        };
        session.roster.upsert_buddy(change, jid);
    }

    fn on_participant_changed(&self, user: &str, room: &str, change: ParticipantChange) {
        let Some(session) = self.sessions.get(user) else {
            return;
        };
        let Some(mut conv) = session.conversations.get_mut(room) else {
            tracing::debug!(user, room, "participant change for unknown room dropped");
            return;
        };
        if let Err(e) = conv.handle_participant_changed(change) {
            tracing::warn!(user, room, error = %e, "failed to apply participant change");
        }
    }

    fn on_room_nickname_changed(&self, user: &str, room: &str, nickname: &str) {
        let Some(session) = self.sessions.get(user) else {
            return;
        };
        if let Some(mut conv) = session.conversations.get_mut(room) {
            conv.nickname = nickname.to_string();
        }
    }

    fn on_conv_message(
        &self,
        user: &str,
        buddy_name: &str,
        inbound: InboundMessage,
        nickname: Option<String>,
    ) {
        let Some(session) = self.sessions.get(user) else {
            return;
        };
        let mut conv = session.conversations.get_or_create(buddy_name, false);
        let ctx = HandleMessageCtx {
            roster: session.roster.as_ref(),
            user,
            send_headlines: self.settings.send_headlines(user),
            jid_escaping: self.config.service.jid_escaping,
            server_mode: self.config.service.server_mode,
            should_cache_messages: !session.is_online(),
            enable_notifications: self.settings.enable_notifications(user),
        };
        if let Err(e) = conv.handle_message(&ctx, inbound, nickname) {
            tracing::warn!(user, buddy_name, error = %e, "failed to handle inbound conversation message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FeaturesConfig, ServiceConfig};
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct StaticCredentials;
    impl CredentialStore for StaticCredentials {
        fn credentials_for(&self, bare_jid: &BareJid) -> Option<UserCredentials> {
            Some(UserCredentials {
                legacy_name: bare_jid.node().unwrap_or_default().to_string(),
                password: "hunter2".to_string(),
            })
        }
    }

    fn test_manager() -> UserManager {
        let supervisor = Arc::new(BackendSupervisor::new(
            "/bin/true",
            "localhost",
            10000,
            PathBuf::from("/dev/null"),
        ));
        let config = Arc::new(GatewayConfig {
            service: ServiceConfig {
                backend: "/bin/true".into(),
                jid: "gw.example.com".into(),
                ..Default::default()
            },
            features: FeaturesConfig::default(),
        });
        UserManager::new(
            supervisor,
            Arc::new(StaticCredentials),
            Arc::new(crate::config::DefaultUserSettings),
            config,
            "gw.example.com",
        )
        .unwrap()
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<OutboundEvent>>,
    }
    impl OutboundSink for RecordingSink {
        fn emit(&self, event: OutboundEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[tokio::test]
    async fn first_presence_creates_a_session_and_queues_assignment() {
        let manager = test_manager();
        let sink: Arc<dyn OutboundSink> = Arc::new(RecordingSink::default());
        let from = FullJid::from_str("alice@gw.example.com/laptop").unwrap();

        manager.handle_presence(from, true, sink).await;

        assert!(manager.sessions.contains_key("alice@gw.example.com"));
    }

    #[tokio::test]
    async fn losing_the_last_resource_destroys_the_session() {
        let manager = test_manager();
        let sink: Arc<dyn OutboundSink> = Arc::new(RecordingSink::default());
        let from = FullJid::from_str("alice@gw.example.com/laptop").unwrap();

        manager.handle_presence(from.clone(), true, sink).await;
        assert!(manager.sessions.contains_key("alice@gw.example.com"));

        manager.handle_presence(from, false, Arc::new(RecordingSink::default())).await;
        assert!(!manager.sessions.contains_key("alice@gw.example.com"));
    }
}
