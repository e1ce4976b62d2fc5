use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Kick-vote option that removes the target.
pub const BANISH: &str = "BANISH";
/// Kick-vote option that spares the target. Wins ties.
pub const MERCY: &str = "MERCY";

/// Opaque identity assigned once per session by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(pub String);

impl IdentityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Id of a two-party private room.
///
/// Derived from the two participants, never negotiated: both ends compute the
/// same value independently.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Order-independent room id for a pair of identities.
    ///
    /// The length of the lower id leads, so ids containing `_` cannot collide:
    /// `a_b`+`c` and `a`+`b_c` give `3_a_b_c` and `1_a_b_c`.
    pub fn between(a: &IdentityId, b: &IdentityId) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{}_{}_{}", lo.as_str().len(), lo.as_str(), hi.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The channel a client is currently looking at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "room")]
pub enum ChannelId {
    Public,
    Private(RoomId),
}

impl ChannelId {
    /// Key used for this channel under the typing subtree.
    pub fn typing_key(&self) -> &str {
        match self {
            Self::Public => "public",
            Self::Private(room) => room.as_str(),
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => f.write_str("public"),
            Self::Private(room) => write!(f, "private:{}", room),
        }
    }
}

/// Snapshot of the message being replied to, frozen at send time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRef {
    pub id: String,
    pub sender_name: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollVariant {
    #[default]
    Standard,
    Kick,
}

/// A vote embedded in a message. Counts live under `poll/options/{label}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub question: String,
    #[serde(default)]
    pub options: BTreeMap<String, u64>,
    /// Absolute skew-corrected instant, in milliseconds.
    pub deadline: i64,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub variant: PollVariant,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl Poll {
    pub fn standard<I, S>(question: impl Into<String>, options: I, deadline: i64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            question: question.into(),
            options: options.into_iter().map(|o| (o.into(), 0)).collect(),
            deadline,
            resolved: false,
            variant: PollVariant::Standard,
            target: None,
        }
    }

    pub fn kick(target: impl Into<String>, deadline: i64) -> Self {
        let target = target.into();
        Self {
            question: format!("Banish {}?", target),
            options: [(BANISH.to_string(), 0), (MERCY.to_string(), 0)]
                .into_iter()
                .collect(),
            deadline,
            resolved: false,
            variant: PollVariant::Kick,
            target: Some(target),
        }
    }

    pub fn count(&self, option: &str) -> u64 {
        self.options.get(option).copied().unwrap_or(0)
    }

    pub fn total_votes(&self) -> u64 {
        self.options.values().sum()
    }

    pub fn is_kick(&self) -> bool {
        self.variant == PollVariant::Kick
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameKind {
    #[serde(rename = "DICE")]
    Dice,
    #[serde(rename = "COIN")]
    Coin,
    #[serde(rename = "TOD")]
    TruthOrDare,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameResult {
    pub kind: GameKind,
    /// Rendered outcome. Truth-or-dare carries none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Structured payload a message may carry. At most one per message.
#[derive(Debug, Clone, PartialEq)]
pub enum Embed {
    Poll(Poll),
    Game(GameResult),
}

/// Borrowed view over whichever embed a stored message carries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Attachment<'a> {
    None,
    Poll(&'a Poll),
    Game(&'a GameResult),
}

/// A message record as stored under a channel's message collection.
///
/// The id is the store key and is not part of the record body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(skip)]
    pub id: String,
    #[serde(default)]
    pub text: String,
    pub sender_id: IdentityId,
    #[serde(default)]
    pub sender_name: String,
    #[serde(default)]
    pub sender_color: String,
    /// Server-assigned write time in milliseconds. Sole ordering key.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub ephemeral: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ReplyRef>,
    /// emoji -> set of voter ids (stored as `{id: true}`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub reactions: BTreeMap<String, BTreeMap<IdentityId, bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll: Option<Poll>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game: Option<GameResult>,
}

fn is_false(v: &bool) -> bool {
    !*v
}

impl Message {
    /// Decode a store entry, attaching its key as the id.
    pub fn from_entry(id: &str, value: &serde_json::Value) -> serde_json::Result<Self> {
        let mut msg: Message = serde_json::from_value(value.clone())?;
        msg.id = id.to_string();
        Ok(msg)
    }

    pub fn attachment(&self) -> Attachment<'_> {
        match (&self.poll, &self.game) {
            (Some(poll), _) => Attachment::Poll(poll),
            (None, Some(game)) => Attachment::Game(game),
            (None, None) => Attachment::None,
        }
    }

    pub fn reaction_count(&self, emoji: &str) -> usize {
        self.reactions
            .get(emoji)
            .map(|voters| voters.values().filter(|v| **v).count())
            .unwrap_or(0)
    }

    pub fn has_reacted(&self, emoji: &str, identity: &IdentityId) -> bool {
        self.reactions
            .get(emoji)
            .and_then(|voters| voters.get(identity))
            .copied()
            .unwrap_or(false)
    }

    pub fn is_from(&self, identity: &IdentityId) -> bool {
        &self.sender_id == identity
    }
}

/// Phase-1 record, stored in the target's single-slot mailbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    pub from_id: IdentityId,
    pub from_name: String,
    pub room_id: RoomId,
    pub timestamp: i64,
}

/// Phase-2 record, stored in the inviter's response slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationResponse {
    pub accepted: bool,
    pub room_id: RoomId,
    pub responder_id: IdentityId,
    pub responder_name: String,
    pub timestamp: i64,
}

/// Per-channel, per-identity typing heartbeat. Absence means not typing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingState {
    pub name: String,
    pub timestamp: i64,
}

/// Transient reaction burst, animated by every client that sees it in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloatingReaction {
    pub emoji: String,
    pub sender_id: IdentityId,
    pub timestamp: i64,
}

/// Local view of the pairing handshake.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PairingState {
    #[default]
    Idle,
    InviteSent {
        target: IdentityId,
        room_id: RoomId,
        sent_at: i64,
    },
    InviteReceived {
        invitation: Invitation,
    },
    Paired {
        room_id: RoomId,
        peer_id: IdentityId,
        peer_name: String,
    },
}

impl PairingState {
    pub fn is_paired(&self) -> bool {
        matches!(self, Self::Paired { .. })
    }
}
