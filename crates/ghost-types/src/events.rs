use serde::{Deserialize, Serialize};

use crate::models::{ChannelId, FloatingReaction, IdentityId, PairingState, RoomId};

/// Events the coordination core hands to whatever front-end is attached.
///
/// All are transient and dismissible; none is fatal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientEvent {
    /// Passive, dismissible notice ("Failed to broadcast.", ...)
    Notice { text: String },

    /// Connectivity signal changed. Drops during a channel switch are not reported.
    ConnectivityChanged { online: bool },

    /// The active channel changed.
    ChannelSwitched { channel: ChannelId },

    /// A fresh invitation landed in our mailbox.
    InvitationReceived {
        from_id: IdentityId,
        from_name: String,
        room_id: RoomId,
    },

    /// Handshake state moved.
    PairingChanged { state: PairingState },

    /// A floating reaction should be animated.
    FloatingReaction(FloatingReaction),

    /// A kick vote against this client passed. The profile has been cleared.
    Banished { poll_id: String },
}
