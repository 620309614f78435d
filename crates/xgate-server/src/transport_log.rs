//! A logging stand-in for the real XMPP transport façade (spec §6,
//! `xgate_core::transport`). The stanza parser/serializer, TLS stack, and
//! component/server connection are external collaborators the core
//! doesn't define (spec §1) — this module gives `xgate-server` something
//! concrete to wire the core against until a real one is plugged in,
//! logging every stanza it would have sent instead of sending it.

use std::future::Future;

use jid::{FullJid, Jid};
use minidom::Element;
use xgate_core::{
    DiscoInfo, GatewayEvents, IncomingPresence, IqRouter, OutboundMessage, OutboundPresence,
    PresenceOracle, StanzaChannel,
};

pub struct LoggingTransport;

impl StanzaChannel for LoggingTransport {
    fn send_message(&self, message: OutboundMessage) -> impl Future<Output = ()> + Send {
        async move {
            tracing::info!(from = %message.from, to = %message.to, kind = ?message.kind, "would send message stanza");
        }
    }

    fn send_presence(&self, presence: OutboundPresence) -> impl Future<Output = ()> + Send {
        async move {
            tracing::info!(from = %presence.from, to = %presence.to, kind = ?presence.kind, codes = ?presence.status_codes, "would send presence stanza");
        }
    }
}

impl IqRouter for LoggingTransport {
    fn send_iq_result(&self, to: Jid, id: String, _payload: Option<Element>) -> impl Future<Output = ()> + Send {
        async move {
            tracing::debug!(%to, %id, "would send iq-result");
        }
    }

    fn send_iq_error(&self, to: Jid, id: String, condition: &'static str) -> impl Future<Output = ()> + Send {
        async move {
            tracing::debug!(%to, %id, condition, "would send iq-error");
        }
    }
}

impl PresenceOracle for LoggingTransport {
    fn is_subscribed(&self, _user: &jid::BareJid, _contact: &jid::BareJid) -> impl Future<Output = bool> + Send {
        async move { false }
    }
}

/// Wraps the user manager as the core's `GatewayEvents` consumer. Nothing
/// in this binary drives these methods yet — a real deployment's embedded
/// component/server connection would call them as stanzas arrive.
pub struct GatewayCore {
    pub user_manager: std::sync::Arc<xgate_core::UserManager>,
    pub outbound: std::sync::Arc<dyn xgate_core::OutboundSink>,
}

impl GatewayEvents for GatewayCore {
    fn on_raw_iq_received(&self, _from: FullJid, _iq: Element) -> impl Future<Output = Option<Element>> + Send {
        async move { None }
    }

    fn on_connected(&self) -> impl Future<Output = ()> + Send {
        async move {
            tracing::info!("transport façade connected");
        }
    }

    fn on_connection_error(&self, reason: String) -> impl Future<Output = ()> + Send {
        async move {
            tracing::warn!(reason, "transport façade connection error");
        }
    }

    fn on_user_presence_received(
        &self,
        from: FullJid,
        presence: IncomingPresence,
    ) -> impl Future<Output = ()> + Send {
        let user_manager = std::sync::Arc::clone(&self.user_manager);
        let outbound = std::sync::Arc::clone(&self.outbound);
        async move {
            let available = presence.kind == xgate_core::PresenceKind::Available;
            match presence.muc_room {
                Some(room) => {
                    user_manager.handle_muc_presence(
                        from,
                        &room.to_string(),
                        presence.muc_nickname.as_deref().unwrap_or_default(),
                        presence.muc_password,
                        available,
                    );
                }
                None => {
                    user_manager.handle_presence(from, available, outbound).await;
                }
            }
        }
    }

    fn on_user_disco_info_received(
        &self,
        _from: FullJid,
        _node: Option<String>,
    ) -> impl Future<Output = DiscoInfo> + Send {
        async move { DiscoInfo::default() }
    }
}
