//! Shared value types: legacy status mapping, MUC affiliation/role, and the
//! legacy-name-to-JID-node rewrite rules used throughout the conversation
//! router.

use xmpp_parsers::muc::user::{Affiliation as MucAffiliation, Role as MucRole};
use xmpp_parsers::presence::Show as PresenceShow;

/// Bit-set of per-participant flags carried on `PARTICIPANT_CHANGED`.
///
/// Only `MODERATOR` is defined by the wire contract today; the type is a
/// bit-set (not an enum) so a backend can set multiple flags without the
/// gateway needing to know about all of them.
pub mod flags {
    pub const MODERATOR: i32 = 0x01;
}

/// MUC affiliation, independent of the XMPP-parsers crate's own enum so the
/// conversation router doesn't have to reach into `xmpp-parsers` internals
/// to reason about "is this a moderator".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affiliation {
    Owner,
    Admin,
    Member,
    None,
    Outcast,
}

/// MUC role, session-scoped (lost on leave), as opposed to affiliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Moderator,
    Participant,
    Visitor,
    None,
}

/// Derive affiliation/role from the participant flag bit-set.
///
/// Default is `Member`/`Participant`; the `Moderator` flag raises both, per
/// spec §4.4.
pub fn affiliation_role_for_flags(flag: i32) -> (Affiliation, Role) {
    if flag & flags::MODERATOR != 0 {
        (Affiliation::Admin, Role::Moderator)
    } else {
        (Affiliation::Member, Role::Participant)
    }
}

pub fn affiliation_to_muc(aff: Affiliation) -> MucAffiliation {
    match aff {
        Affiliation::Owner => MucAffiliation::Owner,
        Affiliation::Admin => MucAffiliation::Admin,
        Affiliation::Member => MucAffiliation::Member,
        Affiliation::None => MucAffiliation::None,
        Affiliation::Outcast => MucAffiliation::Outcast,
    }
}

pub fn role_to_muc(role: Role) -> MucRole {
    match role {
        Role::Moderator => MucRole::Moderator,
        Role::Participant => MucRole::Participant,
        Role::Visitor => MucRole::Visitor,
        Role::None => MucRole::None,
    }
}

/// The legacy "show" a buddy/participant status integer maps to.
///
/// `None` is the sentinel the wire contract uses for "offline"/"no
/// presence"; the conversation router turns it into an `Unavailable`
/// presence type rather than an available presence with no `<show/>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyShow {
    None,
    Away,
    Chat,
    Dnd,
    Xa,
    Online,
}

impl LegacyShow {
    /// Map a raw status integer from the wire to a `LegacyShow`.
    ///
    /// The ordering mirrors Swiften's `Swift::StatusShow::Type` enum, which
    /// the original backend casts the raw legacy status int directly into
    /// (`conversation.cpp:222`): `0=Online, 1=Away, 2=FFC, 3=XA, 4=DND,
    /// 5=None`. Values outside that table are treated as `Online`: a
    /// backend reporting an unrecognized status is still evidence the
    /// buddy/participant is present, and the bridge is best-effort (spec §1
    /// Non-goals) rather than a strict validator of backend input.
    pub fn from_status(status: i32) -> Self {
        match status {
            0 => LegacyShow::Online,
            1 => LegacyShow::Away,
            2 => LegacyShow::Chat,
            3 => LegacyShow::Xa,
            4 => LegacyShow::Dnd,
            5 => LegacyShow::None,
            _ => LegacyShow::Online,
        }
    }

    /// The `<show/>` value for an available presence, or `None` when this
    /// maps to `Online` (XMPP omits `<show/>` for plain "available").
    pub fn to_presence_show(self) -> Option<PresenceShow> {
        match self {
            LegacyShow::None => None,
            LegacyShow::Away => Some(PresenceShow::Away),
            LegacyShow::Chat => Some(PresenceShow::Chat),
            LegacyShow::Dnd => Some(PresenceShow::Dnd),
            LegacyShow::Xa => Some(PresenceShow::Xa),
            LegacyShow::Online => None,
        }
    }

    /// Whether this status means the occupant/buddy should be announced as
    /// unavailable rather than available-with-show.
    pub fn is_unavailable(self) -> bool {
        matches!(self, LegacyShow::None)
    }
}

/// Rewrite a legacy name for use as a JID node by replacing the last `@`
/// with `%`, preserving an otherwise valid JID node (spec §3 invariant,
/// `conversation.cpp`'s repeated `find_last_of("@")` dance).
///
/// Idempotent: a name with no `@` is returned unchanged, and a name whose
/// only `@` has already been rewritten to `%` is likewise unchanged.
pub fn rewrite_legacy_name(name: &str) -> String {
    match name.rfind('@') {
        Some(idx) => {
            let mut rewritten = String::with_capacity(name.len());
            rewritten.push_str(&name[..idx]);
            rewritten.push('%');
            rewritten.push_str(&name[idx + '@'.len_utf8()..]);
            rewritten
        }
        None => name.to_string(),
    }
}

/// Escape a legacy name into a valid JID node per XEP-0106 (Jabber ID
/// Escaping). Used when `service.jid_escaping` is enabled instead of the
/// simpler `@`→`%` rewrite.
pub fn jid_escape_node(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            ' ' => out.push_str("\\20"),
            '"' => out.push_str("\\22"),
            '&' => out.push_str("\\26"),
            '\'' => out.push_str("\\27"),
            '/' => out.push_str("\\2f"),
            ':' => out.push_str("\\3a"),
            '<' => out.push_str("\\3c"),
            '>' => out.push_str("\\3e"),
            '@' => out.push_str("\\40"),
            '\\' => out.push_str("\\5c"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrite_replaces_only_the_last_at() {
        assert_eq!(rewrite_legacy_name("room@service"), "room%service");
        assert_eq!(rewrite_legacy_name("a@b@c"), "a@b%c");
        assert_eq!(rewrite_legacy_name("noatsign"), "noatsign");
    }

    #[test]
    fn rewrite_is_idempotent() {
        let once = rewrite_legacy_name("room@service");
        let twice = rewrite_legacy_name(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn jid_escape_roundtrips_reserved_characters() {
        let escaped = jid_escape_node("foo bar@baz");
        assert_eq!(escaped, "foo\\20bar\\40baz");
    }

    #[test]
    fn legacy_show_none_is_unavailable() {
        assert!(LegacyShow::from_status(5).is_unavailable());
        assert!(!LegacyShow::from_status(0).is_unavailable());
    }

    #[test]
    fn legacy_show_zero_is_online() {
        assert_eq!(LegacyShow::from_status(0), LegacyShow::Online);
        assert_eq!(LegacyShow::from_status(5), LegacyShow::None);
    }

    #[test]
    fn moderator_flag_raises_affiliation_and_role() {
        let (aff, role) = affiliation_role_for_flags(flags::MODERATOR);
        assert_eq!(aff, Affiliation::Admin);
        assert_eq!(role, Role::Moderator);

        let (aff, role) = affiliation_role_for_flags(0);
        assert_eq!(aff, Affiliation::Member);
        assert_eq!(role, Role::Participant);
    }
}
