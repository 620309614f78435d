//! Backend supervisor (C4): spawns backend child processes, accepts their
//! connections, frames their byte streams, keeps them alive with
//! heartbeats, and demultiplexes inbound envelopes.
//!
//! Grounded on `networkpluginserver.cpp`'s `NetworkPluginServer` class:
//! `exec_`/`handleNewClientConnection`/`handleDataRead`/`pingTimeout`/
//! `getFreeClient`/`handleSessionFinished` map respectively onto
//! `spawn_backend`/`run_client`/the frame-reading loop inside
//! `run_client`/the heartbeat task/`assign_free_client`/`handle_session_finished`
//! below. The callback wiring that file does with Boost signals is done
//! here with the `BackendDispatch` trait (spec §9 "Callbacks").

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

use xgate_wire::{
    unwrap, wrap, BuddyChanged, Connected, ConversationMessage, Disconnected, FrameCodec, Login,
    Logout, ParticipantChanged, Ping, Pong, RoomNicknameChanged, WrapperMessage, WrapperType,
};

use crate::client::{BackendClient, ClientId};
use crate::conversation::{InboundMessage, ParticipantChange};
use crate::error::{GatewayError, Result};
use crate::roster::BuddyChange;
use crate::types::LegacyShow;

/// Gateway→backend heartbeat period (spec §4.3).
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// The dispatch-table side of §4.3: everything the supervisor routes an
/// inbound envelope to, implemented by whatever owns user/conversation
/// state (`UserManager`, C8). Kept as a trait rather than a hard dependency
/// so the supervisor doesn't need to know about sessions or conversations
/// (spec §9 "Callbacks": "a small set of typed listener interfaces").
pub trait BackendDispatch: Send + Sync + 'static {
    fn on_connected(&self, user: &str, legacy_name: &str);
    fn on_disconnected(&self, user: &str, message: &str);
    fn on_buddy_changed(&self, user: &str, buddy_name: &str, change: BuddyChange);
    fn on_participant_changed(&self, user: &str, room: &str, change: ParticipantChange);
    fn on_room_nickname_changed(&self, user: &str, room: &str, nickname: &str);
    fn on_conv_message(
        &self,
        user: &str,
        buddy_name: &str,
        inbound: InboundMessage,
        nickname: Option<String>,
    );
    /// A client that had been assigned to a waiting user (see
    /// `request_assignment`) has connected; the dispatch owner can now
    /// complete the login handshake.
    fn on_client_assigned(&self, user: &str, client_id: ClientId);
    /// A client died (stream closed or heartbeat miss): disconnect every
    /// user it held with the standard user-visible reason.
    fn on_client_dead(&self, user: &str);
}

struct SpawnContract {
    backend_path: String,
    host: String,
    port: u16,
    config_path: PathBuf,
}

/// Accepts backend connections, tracks their liveness, and routes their
/// envelopes. Owns every `BackendClient` by `ClientId` (spec §9 arena
/// ownership note) — nothing outside this module holds a client reference.
pub struct BackendSupervisor {
    spawn_contract: SpawnContract,
    clients: DashMap<ClientId, BackendClient>,
    next_id: AtomicU64,
    pending_logins: Mutex<VecDeque<String>>,
    /// Set once, after construction, by whoever owns the user-session side
    /// (typically a `UserManager`). A plain constructor argument would
    /// force that type to exist before the supervisor does, and the
    /// supervisor to exist before it — `OnceLock` breaks the cycle without
    /// reaching for `Arc::new_cyclic`'s weak-self indirection.
    dispatch: OnceLock<Arc<dyn BackendDispatch>>,
}

impl BackendSupervisor {
    pub fn new(backend_path: impl Into<String>, host: impl Into<String>, port: u16, config_path: PathBuf) -> Self {
        Self {
            spawn_contract: SpawnContract {
                backend_path: backend_path.into(),
                host: host.into(),
                port,
                config_path,
            },
            clients: DashMap::new(),
            next_id: AtomicU64::new(1),
            pending_logins: Mutex::new(VecDeque::new()),
            dispatch: OnceLock::new(),
        }
    }

    /// Bind the dispatch target. Must be called once, before
    /// `run_accept_loop`/`spawn_heartbeat` start producing callbacks.
    pub fn set_dispatch(&self, dispatch: Arc<dyn BackendDispatch>) {
        if self.dispatch.set(dispatch).is_err() {
            tracing::warn!("BackendSupervisor::set_dispatch called more than once; ignoring");
        }
    }

    fn dispatch(&self) -> &Arc<dyn BackendDispatch> {
        self.dispatch.get().expect("BackendSupervisor used before set_dispatch")
    }

    /// `exec <backend-path> --host <host> --port <port> <config-file-path>`
    /// (spec §6 "Backend process spawn contract"). Reaped asynchronously —
    /// the idiomatic equivalent of the original's `SIGCHLD`/`wait3` pair
    /// (spec §9 "Cyclic back-references" is unrelated; this is the
    /// "Blocking DNS"-adjacent discipline of §5: no blocking wait on the
    /// loop).
    pub async fn spawn_backend(&self) -> Result<()> {
        let child = Command::new(&self.spawn_contract.backend_path)
            .arg("--host")
            .arg(&self.spawn_contract.host)
            .arg("--port")
            .arg(self.spawn_contract.port.to_string())
            .arg(&self.spawn_contract.config_path)
            .spawn()
            .map_err(|e| GatewayError::SpawnFailed(e.to_string()))?;

        tokio::spawn(async move {
            let mut child = child;
            match child.wait().await {
                Ok(status) => tracing::info!(%status, "backend process exited"),
                Err(e) => tracing::warn!(error = %e, "failed to await backend process"),
            }
        });
        Ok(())
    }

    /// Accept loop: one task per listener, one reader+writer task pair per
    /// accepted connection (spec §4.3 "Listening").
    pub async fn run_accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::info!(%peer, "backend connected");
                    let supervisor = Arc::clone(&self);
                    tokio::spawn(async move { supervisor.run_client(stream).await });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "backend accept failed");
                }
            }
        }
    }

    /// Spawn the periodic PING/liveness task (spec §4.3 "Heartbeats").
    pub fn spawn_heartbeat(self: &Arc<Self>) {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
            loop {
                interval.tick().await;
                supervisor.heartbeat_tick().await;
            }
        });
    }

    async fn heartbeat_tick(&self) {
        let mut dead: Vec<ClientId> = Vec::new();
        for mut entry in self.clients.iter_mut() {
            if entry.pong_received {
                entry.pong_received = false;
                entry.send(wrap(WrapperType::Ping, Ping {}));
            } else {
                dead.push(*entry.key());
            }
        }
        for id in dead {
            tracing::warn!(client = %id, "heartbeat missed; declaring client dead");
            self.handle_session_finished(id).await;
        }
    }

    async fn run_client(self: Arc<Self>, stream: TcpStream) {
        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let framed = Framed::new(stream, FrameCodec::new());
        let (mut sink, mut source) = framed.split();

        let (tx, mut rx) = mpsc::unbounded_channel::<WrapperMessage>();
        self.clients.insert(id, BackendClient::new(id, tx));

        tokio::spawn(async move {
            while let Some(wrapper) = rx.recv().await {
                if sink.send(wrapper).await.is_err() {
                    break;
                }
            }
        });

        self.assign_pending_login(id);

        loop {
            match source.next().await {
                Some(Ok(wrapper)) => {
                    if let Err(e) = self.dispatch_envelope(id, wrapper) {
                        tracing::warn!(client = %id, error = %e, "protocol violation; terminating stream");
                        break;
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(client = %id, error = %e, "backend stream error");
                    break;
                }
                None => break,
            }
        }

        self.handle_session_finished(id).await;
    }

    /// Route one inbound envelope by tag (spec §4.3 "Dispatch").
    fn dispatch_envelope(&self, id: ClientId, wrapper: WrapperMessage) -> Result<()> {
        let ty = WrapperType::try_from(wrapper.r#type)
            .map_err(|_| GatewayError::ProtocolViolation(format!("unknown tag {}", wrapper.r#type)))?;

        match ty {
            WrapperType::Connected => {
                let payload: Connected = unwrap(&wrapper)?;
                tracing::info!(user = %payload.user, "backend session connected");
                self.dispatch().on_connected(&payload.user, &payload.legacy_name);
            }
            WrapperType::Disconnected => {
                let payload: Disconnected = unwrap(&wrapper)?;
                self.dispatch().on_disconnected(
                    &payload.user,
                    payload.message.as_deref().unwrap_or("backend session ended"),
                );
            }
            WrapperType::BuddyChanged => {
                let payload: BuddyChanged = unwrap(&wrapper)?;
                let change = BuddyChange {
                    legacy_name: payload.buddy_name.clone(),
                    alias: payload.alias,
                    groups: payload.groups,
                    status: LegacyShow::from_status(payload.status),
                    status_message: payload.status_message,
                    icon_hash: payload.icon_hash,
                };
                self.dispatch().on_buddy_changed(&payload.user, &payload.buddy_name, change);
            }
            WrapperType::ParticipantChanged => {
                let payload: ParticipantChanged = unwrap(&wrapper)?;
                let change = crate::conversation::ParticipantChange {
                    nickname: payload.nickname,
                    flag: payload.flag,
                    status: payload.status,
                    status_message: payload.status_message,
                    newname: payload.newname,
                };
                self.dispatch().on_participant_changed(&payload.user, &payload.room, change);
            }
            WrapperType::RoomNicknameChanged => {
                let payload: RoomNicknameChanged = unwrap(&wrapper)?;
                self.dispatch()
                    .on_room_nickname_changed(&payload.user, &payload.room, &payload.nickname);
            }
            WrapperType::ConvMessage => {
                let payload: ConversationMessage = unwrap(&wrapper)?;
                self.dispatch().on_conv_message(
                    &payload.user,
                    &payload.buddy_name,
                    InboundMessage {
                        body: payload.message,
                        subject: None,
                        was_headline: false,
                    },
                    payload.nickname,
                );
            }
            WrapperType::RoomSubjectChanged => {
                let payload: ConversationMessage = unwrap(&wrapper)?;
                self.dispatch().on_conv_message(
                    &payload.user,
                    &payload.buddy_name,
                    InboundMessage {
                        body: String::new(),
                        subject: Some(payload.message),
                        was_headline: false,
                    },
                    payload.nickname,
                );
            }
            WrapperType::Pong => {
                if let Some(mut client) = self.clients.get_mut(&id) {
                    client.pong_received = true;
                }
            }
            WrapperType::Ping => {
                if let Some(client) = self.clients.get(&id) {
                    client.send(wrap(WrapperType::Pong, Pong {}));
                }
            }
            WrapperType::Login | WrapperType::Logout | WrapperType::JoinRoom | WrapperType::LeaveRoom => {
                return Err(GatewayError::ProtocolViolation(format!(
                    "{ty:?} is gateway->backend only"
                )));
            }
        }
        Ok(())
    }

    /// Client stream closed or declared dead: disconnect its users and
    /// respawn if no other client is free (spec §4.3 "Session end").
    async fn handle_session_finished(&self, id: ClientId) {
        if let Some((_, client)) = self.clients.remove(&id) {
            for user in &client.users {
                self.dispatch().on_client_dead(user);
            }
        }

        let any_free = self.clients.iter().any(|entry| entry.user_count() < 1);
        if !any_free {
            if let Err(e) = self.spawn_backend().await {
                tracing::warn!(error = %e, "respawn after client death failed");
            }
        }
    }

    /// Base assignment policy: at most one user per backend (spec §4.3
    /// "Assignment policy", §8 property 6). Returns the client that now
    /// owns `user`, queuing the request and triggering a spawn if none is
    /// free yet.
    pub async fn request_assignment(&self, user: &str) -> Option<ClientId> {
        let free = self
            .clients
            .iter()
            .find(|entry| entry.user_count() < 1)
            .map(|entry| *entry.key());

        match free {
            Some(id) => {
                if let Some(mut client) = self.clients.get_mut(&id) {
                    client.users.insert(user.to_string());
                }
                Some(id)
            }
            None => {
                self.pending_logins.lock().unwrap().push_back(user.to_string());
                if let Err(e) = self.spawn_backend().await {
                    tracing::warn!(error = %e, "spawn-on-demand failed");
                }
                None
            }
        }
    }

    fn assign_pending_login(&self, id: ClientId) {
        let Some(user) = self.pending_logins.lock().unwrap().pop_front() else {
            return;
        };
        if let Some(mut client) = self.clients.get_mut(&id) {
            client.users.insert(user.clone());
        }
        self.dispatch().on_client_assigned(&user, id);
    }

    /// Send a `LOGIN`/`LOGOUT`/`JOIN_ROOM`/`LEAVE_ROOM`/`CONV_MESSAGE`
    /// envelope to a specific client. Used by the user session / user
    /// manager once they know which client owns a user.
    pub fn send_to(&self, id: ClientId, wrapper: WrapperMessage) {
        if let Some(client) = self.clients.get(&id) {
            client.send(wrapper);
        } else {
            tracing::warn!(client = %id, "send to unknown/dead client dropped");
        }
    }

    pub fn remove_user(&self, id: ClientId, user: &str) {
        if let Some(mut client) = self.clients.get_mut(&id) {
            client.users.remove(user);
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}

/// Build the `LOGIN` envelope sent on session creation (spec §4.5,
/// `networkpluginserver.cpp:378-393`).
pub fn login_envelope(user: &str, legacy_name: &str, password: &str) -> WrapperMessage {
    wrap(
        WrapperType::Login,
        Login {
            user: user.to_string(),
            legacy_name: legacy_name.to_string(),
            password: password.to_string(),
        },
    )
}

/// Build the `LOGOUT` envelope sent on session teardown
/// (`networkpluginserver.cpp:442-452`).
pub fn logout_envelope(user: &str, legacy_name: &str) -> WrapperMessage {
    wrap(
        WrapperType::Logout,
        Logout {
            user: user.to_string(),
            legacy_name: legacy_name.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingDispatch {
        dead_users: StdMutex<Vec<String>>,
        assigned: StdMutex<Vec<(String, ClientId)>>,
    }

    impl BackendDispatch for RecordingDispatch {
        fn on_connected(&self, _user: &str, _legacy_name: &str) {}
        fn on_disconnected(&self, _user: &str, _message: &str) {}
        fn on_buddy_changed(&self, _user: &str, _buddy_name: &str, _change: BuddyChange) {}
        fn on_participant_changed(&self, _user: &str, _room: &str, _change: ParticipantChange) {}
        fn on_room_nickname_changed(&self, _user: &str, _room: &str, _nickname: &str) {}
        fn on_conv_message(
            &self,
            _user: &str,
            _buddy_name: &str,
            _inbound: InboundMessage,
            _nickname: Option<String>,
        ) {
        }
        fn on_client_assigned(&self, user: &str, client_id: ClientId) {
            self.assigned.lock().unwrap().push((user.to_string(), client_id));
        }
        fn on_client_dead(&self, user: &str) {
            self.dead_users.lock().unwrap().push(user.to_string());
        }
    }

    fn test_supervisor(dispatch: Arc<RecordingDispatch>) -> BackendSupervisor {
        let supervisor = BackendSupervisor::new("/bin/true", "localhost", 10000, PathBuf::from("/dev/null"));
        supervisor.set_dispatch(dispatch);
        supervisor
    }

    #[test]
    fn login_and_logout_envelopes_carry_expected_fields() {
        let login = login_envelope("alice@gw", "alice_uin", "hunter2");
        let decoded: Login = unwrap(&login).unwrap();
        assert_eq!(decoded.user, "alice@gw");
        assert_eq!(decoded.legacy_name, "alice_uin");

        let logout = logout_envelope("alice@gw", "alice_uin");
        let decoded: Logout = unwrap(&logout).unwrap();
        assert_eq!(decoded.user, "alice@gw");
    }

    #[tokio::test]
    async fn assignment_with_no_clients_queues_and_spawns() {
        let dispatch = Arc::new(RecordingDispatch::default());
        let supervisor = test_supervisor(dispatch.clone());
        let result = supervisor.request_assignment("alice@gw").await;
        assert!(result.is_none());
        assert_eq!(supervisor.pending_logins.lock().unwrap().len(), 1);
    }

    #[test]
    fn dispatching_an_unknown_tag_is_a_protocol_violation() {
        let dispatch = Arc::new(RecordingDispatch::default());
        let supervisor = test_supervisor(dispatch);
        let malformed = WrapperMessage {
            r#type: 999,
            payload: None,
        };
        let id = ClientId(1);
        let err = supervisor.dispatch_envelope(id, malformed).unwrap_err();
        assert!(matches!(err, GatewayError::ProtocolViolation(_)));
    }
}
