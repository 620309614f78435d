//! The XMPP-side seam (C9): thin traits the core consumes but does not
//! implement. A real binary wires these to an embedded XMPP server or
//! component connection; tests wire them to an in-memory recorder.
//!
//! Only the surface named by spec §6 is modeled here — stanza send/receive,
//! IQ registration/dispatch, and subscription callbacks — not a full XMPP
//! stack.

use std::future::Future;

use jid::{BareJid, FullJid, Jid};
use minidom::Element;

/// An outbound message the core wants delivered to an XMPP peer.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub from: Jid,
    pub to: Jid,
    pub kind: MessageKind,
    pub body: String,
    pub subject: Option<String>,
    /// XEP-0203 delayed-delivery timestamp, set when this message is
    /// flushed out of a conversation's cache.
    pub delay: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Chat,
    Groupchat,
    Headline,
}

/// An outbound presence stanza, already carrying any MUC user payload the
/// conversation router attached.
#[derive(Debug, Clone)]
pub struct OutboundPresence {
    pub from: Jid,
    pub to: Jid,
    pub kind: PresenceKind,
    /// `<show/>` value; absent for plain availability or for unavailable
    /// presences.
    pub show: Option<xmpp_parsers::presence::Show>,
    /// `<status/>` human-readable text, if the legacy side supplied one.
    pub status_text: Option<String>,
    pub muc_payload: Option<Element>,
    pub status_codes: Vec<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceKind {
    Available,
    Unavailable,
}

/// Send-side of the XMPP collaborator: the core hands it fully-formed
/// stanzas and never touches the wire itself.
pub trait StanzaChannel: Send + Sync + 'static {
    fn send_message(&self, message: OutboundMessage) -> impl Future<Output = ()> + Send;

    fn send_presence(&self, presence: OutboundPresence) -> impl Future<Output = ()> + Send;
}

/// A stanza a conversation originated, headed for the XMPP side.
///
/// Conversation methods are synchronous (spec §5: "complete and return, or
/// enqueue work for a later loop turn") so they can't `.await` a
/// `StanzaChannel` directly; instead they hand events to an `OutboundSink`,
/// which is typically an `mpsc::UnboundedSender` feeding a task that owns
/// the real `StanzaChannel`. This is the composition-over-inheritance
/// substitute for the original's per-conversation virtual dispatch (spec
/// §9 "Deep inheritance").
#[derive(Debug, Clone)]
pub enum OutboundEvent {
    Message(OutboundMessage),
    Presence(OutboundPresence),
}

pub trait OutboundSink: Send + Sync + 'static {
    fn emit(&self, event: OutboundEvent);
}

impl OutboundSink for tokio::sync::mpsc::UnboundedSender<OutboundEvent> {
    fn emit(&self, event: OutboundEvent) {
        if self.send(event).is_err() {
            tracing::warn!("outbound sink has no receiver; event dropped");
        }
    }
}

/// Registration/dispatch surface for IQ stanzas. The core only needs to
/// reply to IQs addressed to it; it does not own IQ routing policy.
pub trait IqRouter: Send + Sync + 'static {
    fn send_iq_result(
        &self,
        to: Jid,
        id: String,
        payload: Option<Element>,
    ) -> impl Future<Output = ()> + Send;

    fn send_iq_error(
        &self,
        to: Jid,
        id: String,
        condition: &'static str,
    ) -> impl Future<Output = ()> + Send;
}

/// Subscription/presence-policy callbacks the core consults but does not
/// implement (roster storage backend, spec §1).
pub trait PresenceOracle: Send + Sync + 'static {
    fn is_subscribed(
        &self,
        user: &BareJid,
        contact: &BareJid,
    ) -> impl Future<Output = bool> + Send;
}

/// Disco#info identity/feature set returned for `onUserDiscoInfoReceived`.
#[derive(Debug, Clone, Default)]
pub struct DiscoInfo {
    pub identities: Vec<(String, String)>,
    pub features: Vec<String>,
}

/// The inbound-facing events the core exposes to its XMPP collaborator.
/// The collaborator calls these as stanzas/connection events arrive; the
/// core never polls for them.
pub trait GatewayEvents: Send + Sync + 'static {
    /// A raw IQ addressed to the gateway, passed through when
    /// `features.rawxml` is enabled. Returns an optional reply payload.
    fn on_raw_iq_received(
        &self,
        from: FullJid,
        iq: Element,
    ) -> impl Future<Output = Option<Element>> + Send;

    /// The stanza channel has come up (component handshake completed, or
    /// the server listener is accepting).
    fn on_connected(&self) -> impl Future<Output = ()> + Send;

    /// The stanza channel went down; per spec §5 the caller is expected to
    /// retry the connection on its own 3 s schedule.
    fn on_connection_error(&self, reason: String) -> impl Future<Output = ()> + Send;

    /// Presence received from/about a user JID — drives user session
    /// creation/destruction (C8) and MUC join/leave (C5/C6).
    fn on_user_presence_received(
        &self,
        from: FullJid,
        presence: IncomingPresence,
    ) -> impl Future<Output = ()> + Send;

    /// A disco#info query about the gateway or a conversation JID.
    fn on_user_disco_info_received(
        &self,
        from: FullJid,
        node: Option<String>,
    ) -> impl Future<Output = DiscoInfo> + Send;
}

/// A normalized view of an inbound `<presence/>` stanza, independent of
/// whatever concrete parser type the collaborator uses.
#[derive(Debug, Clone)]
pub struct IncomingPresence {
    pub kind: PresenceKind,
    /// MUC room the presence targets, if the `to` JID has a resource and
    /// matches a known conversation (join/leave request).
    pub muc_room: Option<BareJid>,
    pub muc_nickname: Option<String>,
    pub muc_password: Option<String>,
}
