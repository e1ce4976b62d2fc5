use thiserror::Error;

use ghost_store::StoreError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("malformed record: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Local(#[from] anyhow::Error),

    #[error("already in a private room")]
    AlreadyPaired,

    #[error("cannot invite yourself")]
    SelfInvite,

    #[error("no pending invitation")]
    NoPendingInvitation,

    #[error("invitation expired")]
    InvitationStale,

    #[error("already voted in this poll")]
    AlreadyVoted,

    #[error("poll is closed")]
    PollClosed,

    #[error("poll has no option {0:?}")]
    UnknownOption(String),

    #[error("message {0} carries no poll")]
    NotAPoll(String),

    #[error("message {0} is not in the current view")]
    UnknownMessage(String),

    #[error("message is empty")]
    EmptyMessage,
}
