//! # xgate-core
//!
//! Backend supervisor, conversation router, and user session model for the
//! XMPP-to-legacy-IM transport gateway.
//!
//! ## Architecture
//!
//! - **Backend supervisor** (`supervisor`): spawns and multiplexes backend
//!   child processes over a framed binary RPC (`xgate-wire`), one user per
//!   backend.
//! - **Conversation router** (`conversation`): translates legacy
//!   one-to-one/MUC chat state into XMPP presence/message stanzas.
//! - **User session model** (`session`): binds an XMPP bare JID to a
//!   backend client and its conversations.
//! - **Transport façade** (`transport`): traits the core consumes to reach
//!   the XMPP side; implemented by `xgate-server` or a test harness.

pub mod client;
pub mod config;
pub mod conversation;
pub mod error;
pub mod roster;
pub mod session;
pub mod supervisor;
pub mod transport;
pub mod types;

pub use client::{BackendClient, ClientId};
pub use config::{GatewayConfig, UserEntryConfig, UserSettings};
pub use conversation::{Conversation, ConversationManager, HandleMessageCtx, InboundMessage, ParticipantChange};
pub use error::{GatewayError, Result};
pub use roster::{Buddy, BuddyChange, InMemoryRosterManager, RosterManager};
pub use session::{ConfigCredentialStore, CredentialStore, UserCredentials, UserManager, UserSession};
pub use supervisor::{login_envelope, logout_envelope, BackendDispatch, BackendSupervisor};
pub use transport::{
    DiscoInfo, GatewayEvents, IncomingPresence, IqRouter, MessageKind, OutboundEvent,
    OutboundMessage, OutboundPresence, OutboundSink, PresenceKind, PresenceOracle, StanzaChannel,
};
pub use types::{
    affiliation_role_for_flags, affiliation_to_muc, jid_escape_node, rewrite_legacy_name,
    role_to_muc, Affiliation, LegacyShow, Role,
};
