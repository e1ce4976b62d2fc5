use std::time::Duration;

/// Longest duration any `GHOST_*` override may set.
const MAX_OVERRIDE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Timers cannot tick at zero and deadlines must stay far from `i64::MAX`.
fn usable(d: &Duration) -> bool {
    !d.is_zero() && *d <= MAX_OVERRIDE
}

/// Tunables of the coordination core.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreConfig {
    /// Application namespace; sanitized before use as a path segment.
    pub app_id: String,
    /// Most recent messages kept in a synchronized view.
    pub message_window: usize,
    pub sweep_interval: Duration,
    /// Lifetime of ephemeral or image-carrying messages.
    pub ephemeral_ttl: Duration,
    /// Lifetime of ordinary text messages.
    pub retention_ttl: Duration,
    pub invitation_freshness: Duration,
    pub typing_window: Duration,
    /// Minimum gap between typing heartbeats on keystrokes.
    pub typing_throttle: Duration,
    pub poll_window: Duration,
    pub kick_window: Duration,
    /// How long after a kick deadline the target still acts on it.
    pub kick_grace: Duration,
    pub floating_window: Duration,
    pub floating_keep: usize,
    /// Cadence of the vote-window, handshake and heartbeat checks.
    pub watch_interval: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            app_id: "ghost-d48ab".into(),
            message_window: 50,
            sweep_interval: Duration::from_secs(5),
            ephemeral_ttl: Duration::from_secs(45),
            retention_ttl: Duration::from_secs(3600),
            invitation_freshness: Duration::from_secs(30),
            typing_window: Duration::from_millis(3000),
            typing_throttle: Duration::from_secs(1),
            poll_window: Duration::from_secs(60),
            kick_window: Duration::from_secs(15),
            kick_grace: Duration::from_secs(10),
            floating_window: Duration::from_secs(10),
            floating_keep: 10,
            watch_interval: Duration::from_secs(1),
        }
    }
}

impl CoreConfig {
    /// Defaults overridden by `GHOST_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns. Unparseable, zero
    /// and out-of-range values are ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let secs = |key: &str| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .filter(usable)
        };
        let millis = |key: &str| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
                .filter(usable)
        };
        let count = |key: &str| lookup(key).and_then(|v| v.trim().parse::<usize>().ok());

        if let Some(app_id) = lookup("GHOST_APP_ID").filter(|v| !v.trim().is_empty()) {
            cfg.app_id = app_id.trim().to_string();
        }
        if let Some(n) = count("GHOST_MESSAGE_WINDOW").filter(|n| *n > 0) {
            cfg.message_window = n;
        }
        if let Some(d) = secs("GHOST_SWEEP_INTERVAL_SECS") {
            cfg.sweep_interval = d;
        }
        if let Some(d) = secs("GHOST_EPHEMERAL_TTL_SECS") {
            cfg.ephemeral_ttl = d;
        }
        if let Some(d) = secs("GHOST_RETENTION_TTL_SECS") {
            cfg.retention_ttl = d;
        }
        if let Some(d) = secs("GHOST_INVITATION_FRESHNESS_SECS") {
            cfg.invitation_freshness = d;
        }
        if let Some(d) = millis("GHOST_TYPING_WINDOW_MS") {
            cfg.typing_window = d;
        }
        if let Some(d) = secs("GHOST_POLL_WINDOW_SECS") {
            cfg.poll_window = d;
        }
        if let Some(d) = secs("GHOST_KICK_WINDOW_SECS") {
            cfg.kick_window = d;
        }
        if let Some(d) = secs("GHOST_KICK_GRACE_SECS") {
            cfg.kick_grace = d;
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_protocol_constants() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.message_window, 50);
        assert_eq!(cfg.sweep_interval, Duration::from_secs(5));
        assert_eq!(cfg.ephemeral_ttl, Duration::from_secs(45));
        assert_eq!(cfg.retention_ttl, Duration::from_secs(3600));
        assert_eq!(cfg.invitation_freshness, Duration::from_secs(30));
        assert_eq!(cfg.typing_window, Duration::from_millis(3000));
        assert_eq!(cfg.poll_window, Duration::from_secs(60));
        assert_eq!(cfg.kick_window, Duration::from_secs(15));
    }

    #[test]
    fn lookup_overrides_and_ignores_garbage() {
        let vars: HashMap<&str, &str> = [
            ("GHOST_APP_ID", " my.app "),
            ("GHOST_MESSAGE_WINDOW", "20"),
            ("GHOST_EPHEMERAL_TTL_SECS", "not-a-number"),
            ("GHOST_TYPING_WINDOW_MS", "1500"),
            ("GHOST_SWEEP_INTERVAL_SECS", "0"),
            ("GHOST_POLL_WINDOW_SECS", "18446744073709551615"),
            ("GHOST_KICK_WINDOW_SECS", "30"),
        ]
        .into_iter()
        .collect();
        let cfg = CoreConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.app_id, "my.app");
        assert_eq!(cfg.message_window, 20);
        assert_eq!(cfg.ephemeral_ttl, Duration::from_secs(45));
        assert_eq!(cfg.typing_window, Duration::from_millis(1500));
        assert_eq!(cfg.sweep_interval, Duration::from_secs(5));
        assert_eq!(cfg.poll_window, Duration::from_secs(60));
        assert_eq!(cfg.kick_window, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn overridden_sweep_interval_can_drive_a_timer() {
        let cfg = CoreConfig::from_lookup(|k| {
            (k == "GHOST_SWEEP_INTERVAL_SECS").then(|| "0".to_string())
        });
        let mut ticker = tokio::time::interval(cfg.sweep_interval);
        ticker.tick().await;
    }
}
