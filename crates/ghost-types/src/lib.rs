//! Shared data model for the ghost chat workspace.
//!
//! These types mirror the records held in the realtime store and the events
//! the coordination core hands to a front-end. They carry no behaviour beyond
//! small accessors; all coordination lives in `ghost-core`.

pub mod events;
pub mod models;
pub mod profile;

pub use events::ClientEvent;
pub use models::{
    Attachment, ChannelId, Embed, FloatingReaction, GameKind, GameResult, IdentityId, Invitation,
    InvitationResponse, Message, PairingState, Poll, PollVariant, ReplyRef, RoomId, TypingState,
    BANISH, MERCY,
};
pub use profile::Profile;
