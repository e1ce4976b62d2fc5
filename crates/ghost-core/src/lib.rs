//! Ephemeral channel synchronization and coordination core.
//!
//! ```text
//! ChannelRouter ──► MessageSynchronizer ──► LifecycleSweeper
//!       ▲                   │           ├─► ReactionCoordinator
//!       │                   │           ├─► PollEngine
//!       │                   ▼           └─► DirectiveParser (assistant replies)
//! PairingProtocol      MessageView
//! PresenceTracker
//! ```
//!
//! Every component talks to the store through [`ghost_store::RealtimeStore`]
//! and compares times only against [`SkewClock`], never raw local time.
//! [`ChatSession`] wires them together for one signed-in identity.

pub mod assistant;
pub mod bus;
pub mod clock;
pub mod config;
pub mod directive;
pub mod error;
pub mod floating;
pub mod layout;
pub mod lifecycle;
pub mod pairing;
pub mod polls;
pub mod presence;
pub mod reactions;
pub mod router;
pub mod session;
pub mod sync;

pub use assistant::AssistantBridge;
pub use bus::EventBus;
pub use clock::SkewClock;
pub use config::CoreConfig;
pub use directive::{DirectiveParser, Parsed};
pub use error::CoreError;
pub use floating::{FloatingFeed, FloatingReactions};
pub use layout::Layout;
pub use lifecycle::{LifecycleSweeper, RetentionPolicy, SweepReport};
pub use pairing::PairingProtocol;
pub use polls::{KickVerdict, PollEngine, PollStatus, Verdict};
pub use presence::PresenceTracker;
pub use reactions::ReactionCoordinator;
pub use router::ChannelRouter;
pub use session::{ChatSession, SendOptions};
pub use sync::{MessageSynchronizer, MessageView};

use std::time::Duration;

/// Milliseconds in a `Duration`, as the store's time unit.
pub(crate) fn ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}
