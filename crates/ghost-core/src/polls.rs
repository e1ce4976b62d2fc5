use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use ghost_local::LocalDb;
use ghost_store::{RealtimeStore, TxDecision};
use ghost_types::{BANISH, ChannelId, MERCY, Message, Poll, Profile};

use crate::clock::SkewClock;
use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::layout::Layout;
use crate::ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KickVerdict {
    Banish,
    Mercy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Kick(KickVerdict),
    /// Options sharing the highest count. Empty when nobody voted.
    Standard { leaders: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    Open { remaining_ms: i64 },
    Closed(Verdict),
}

/// Verdict from the current counts alone. Kick ties go to mercy.
pub fn verdict(poll: &Poll) -> Verdict {
    if poll.is_kick() {
        return if poll.count(BANISH) > poll.count(MERCY) {
            Verdict::Kick(KickVerdict::Banish)
        } else {
            Verdict::Kick(KickVerdict::Mercy)
        };
    }
    let top = poll.options.values().copied().max().unwrap_or(0);
    let leaders = if top == 0 {
        Vec::new()
    } else {
        poll.options
            .iter()
            .filter(|(_, count)| **count == top)
            .map(|(label, _)| label.clone())
            .collect()
    };
    Verdict::Standard { leaders }
}

/// Read-time resolution. Nothing is written when a poll closes.
pub fn resolve(poll: &Poll, now: i64) -> PollStatus {
    if poll.resolved || now >= poll.deadline {
        PollStatus::Closed(verdict(poll))
    } else {
        PollStatus::Open {
            remaining_ms: poll.deadline - now,
        }
    }
}

/// Vote tallying plus the kick side effect on the local identity.
pub struct PollEngine<S> {
    store: Arc<S>,
    layout: Layout,
    local: Arc<LocalDb>,
    clock: SkewClock,
    grace_ms: i64,
}

impl<S: RealtimeStore> PollEngine<S> {
    pub fn new(
        store: Arc<S>,
        layout: Layout,
        local: Arc<LocalDb>,
        clock: SkewClock,
        config: &CoreConfig,
    ) -> Self {
        Self {
            store,
            layout,
            local,
            clock,
            grace_ms: ms(config.kick_grace),
        }
    }

    /// Option this device already voted for, if any.
    pub fn my_vote(&self, poll_id: &str) -> Result<Option<String>, CoreError> {
        Ok(self.local.voted_option(poll_id)?)
    }

    /// Add one vote to `option`. The device-local marker is the only guard
    /// against voting twice; it is released again if the write fails.
    pub async fn cast_vote(
        &self,
        channel: &ChannelId,
        message: &Message,
        option: &str,
    ) -> Result<(), CoreError> {
        let poll = message
            .poll
            .as_ref()
            .ok_or_else(|| CoreError::NotAPoll(message.id.clone()))?;
        if let PollStatus::Closed(_) = resolve(poll, self.clock.now_ms()) {
            return Err(CoreError::PollClosed);
        }
        if !poll.options.contains_key(option) {
            return Err(CoreError::UnknownOption(option.to_string()));
        }
        // Swept since the last snapshot: don't recreate the option counter.
        if self
            .store
            .get(&self.layout.message(channel, &message.id))
            .await?
            .is_none()
        {
            return Err(CoreError::UnknownMessage(message.id.clone()));
        }
        // Claim the marker before writing so overlapping votes from this
        // device cannot both count.
        if !self.local.record_vote(&message.id, option)? {
            return Err(CoreError::AlreadyVoted);
        }

        let path = self.layout.poll_option(channel, &message.id, option);
        let outcome = match self
            .store
            .transaction(&path, |current| {
                let count = current.as_ref().and_then(Value::as_u64).unwrap_or(0);
                TxDecision::Commit(Some(Value::from(count + 1)))
            })
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                if let Err(release) = self.local.forget_vote(&message.id) {
                    warn!(poll = %message.id, "could not release vote marker: {}", release);
                }
                return Err(e.into());
            }
        };
        info!(
            poll = %message.id,
            option,
            count = ?outcome.snapshot,
            "vote cast"
        );
        Ok(())
    }

    /// Act on a kick poll that banished `profile`. Fires at most once per
    /// poll, and only inside the grace window after the deadline. Returns
    /// true if the local profile was cleared.
    pub fn check_banishment(
        &self,
        message: &Message,
        profile: &Profile,
        now: i64,
    ) -> Result<bool, CoreError> {
        let Some(poll) = message.poll.as_ref().filter(|p| p.is_kick()) else {
            return Ok(false);
        };
        let Some(target) = poll.target.as_deref() else {
            return Ok(false);
        };
        if !profile.answers_to(target) {
            return Ok(false);
        }
        if resolve(poll, now) != PollStatus::Closed(Verdict::Kick(KickVerdict::Banish)) {
            return Ok(false);
        }
        if now >= poll.deadline.saturating_add(self.grace_ms) {
            return Ok(false);
        }
        if !self.local.mark_kick_handled(&message.id)? {
            return Ok(false);
        }
        warn!(poll = %message.id, kick_target = target, "banished by vote");
        self.local.clear_profile()?;
        Ok(true)
    }

    /// First kick poll in `messages` that banishes `profile` right now.
    pub fn scan(
        &self,
        messages: &[Message],
        profile: &Profile,
        now: i64,
    ) -> Result<Option<String>, CoreError> {
        for message in messages {
            if self.check_banishment(message, profile, now)? {
                return Ok(Some(message.id.clone()));
            }
        }
        Ok(None)
    }
}
