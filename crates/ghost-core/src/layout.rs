use ghost_store::StorePath;
use ghost_types::{ChannelId, IdentityId};

/// Where each record lives, below `artifacts/{app}/public/data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: StorePath,
}

impl Layout {
    pub fn new(app_id: &str) -> Self {
        let root = StorePath::root()
            .child_sanitized("artifacts")
            .child_sanitized(app_id)
            .child_sanitized("public")
            .child_sanitized("data");
        Self { root }
    }

    pub fn root(&self) -> &StorePath {
        &self.root
    }

    pub fn messages(&self, channel: &ChannelId) -> StorePath {
        match channel {
            ChannelId::Public => self.root.child_sanitized("public_messages"),
            ChannelId::Private(room) => self
                .root
                .child_sanitized("private_channels")
                .child_sanitized(room.as_str()),
        }
    }

    pub fn message(&self, channel: &ChannelId, id: &str) -> StorePath {
        self.messages(channel).child_sanitized(id)
    }

    pub fn reaction_voters(&self, channel: &ChannelId, id: &str, emoji: &str) -> StorePath {
        self.message(channel, id)
            .child_sanitized("reactions")
            .child_sanitized(emoji)
    }

    pub fn poll_option(&self, channel: &ChannelId, id: &str, option: &str) -> StorePath {
        self.message(channel, id)
            .child_sanitized("poll")
            .child_sanitized("options")
            .child_sanitized(option)
    }

    /// Floating reaction bursts.
    pub fn floating_reactions(&self) -> StorePath {
        self.root.child_sanitized("reactions")
    }

    /// Single-slot invitation mailbox of `target`.
    pub fn invitation(&self, target: &IdentityId) -> StorePath {
        self.root
            .child_sanitized("invitations")
            .child_sanitized(target.as_str())
    }

    /// Single-slot response mailbox of the inviting `sender`.
    pub fn invitation_response(&self, sender: &IdentityId) -> StorePath {
        self.root
            .child_sanitized("invitation_responses")
            .child_sanitized(sender.as_str())
    }

    pub fn typing(&self, channel: &ChannelId) -> StorePath {
        self.root
            .child_sanitized("typing")
            .child_sanitized(channel.typing_key())
    }

    pub fn typing_entry(&self, channel: &ChannelId, identity: &IdentityId) -> StorePath {
        self.typing(channel).child_sanitized(identity.as_str())
    }
}
