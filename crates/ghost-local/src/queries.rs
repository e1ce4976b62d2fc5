use anyhow::Result;
use chrono::Utc;
use rusqlite::OptionalExtension;

use ghost_types::{IdentityId, Profile};

use crate::LocalDb;

impl LocalDb {
    // -- Profile --

    pub fn load_profile(&self) -> Result<Option<Profile>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT identity_id, name, color FROM profile WHERE slot = 1",
                    [],
                    |row| {
                        Ok(Profile {
                            id: IdentityId::new(row.get::<_, String>(0)?),
                            name: row.get(1)?,
                            color: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn save_profile(&self, profile: &Profile) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO profile (slot, identity_id, name, color, saved_at)
                 VALUES (1, ?1, ?2, ?3, ?4)
                 ON CONFLICT(slot) DO UPDATE SET
                    identity_id = excluded.identity_id,
                    name = excluded.name,
                    color = excluded.color,
                    saved_at = excluded.saved_at",
                rusqlite::params![
                    profile.id.as_str(),
                    profile.name,
                    profile.color,
                    Utc::now().to_rfc3339()
                ],
            )?;
            Ok(())
        })
    }

    pub fn clear_profile(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM profile", [])?;
            Ok(())
        })
    }

    // -- Poll markers --

    pub fn voted_option(&self, poll_id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let option = conn
                .query_row(
                    "SELECT option FROM poll_votes WHERE poll_id = ?1",
                    [poll_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(option)
        })
    }

    /// Returns false if a vote for this poll was already recorded.
    pub fn record_vote(&self, poll_id: &str, option: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO poll_votes (poll_id, option, voted_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![poll_id, option, Utc::now().to_rfc3339()],
            )?;
            Ok(inserted == 1)
        })
    }

    /// Release a marker whose vote never reached the store.
    pub fn forget_vote(&self, poll_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM poll_votes WHERE poll_id = ?1", [poll_id])?;
            Ok(())
        })
    }

    // -- Kick markers --

    /// Returns false if the kick was already handled on this device.
    pub fn mark_kick_handled(&self, poll_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO handled_kicks (poll_id, handled_at) VALUES (?1, ?2)",
                rusqlite::params![poll_id, Utc::now().to_rfc3339()],
            )?;
            Ok(inserted == 1)
        })
    }
}
