//! Bracketed directives embedded in assistant replies.
//!
//! ```text
//! [POLL: "Question", "Option A", "Option B", ...]
//! [VOTE_KICK: Name]
//! [GAME: DICE|COIN|TOD]
//! ```
//!
//! Keywords are case-sensitive, the game kind is not. The first well-formed
//! token (by position) is lifted out of the text; any other token, and any
//! malformed one, stays in the body verbatim.

use rand::Rng;

use ghost_store::path::sanitize_key;
use ghost_types::{Embed, GameKind, GameResult, Poll};

use crate::config::CoreConfig;
use crate::ms;

/// Text to display plus the structured payload lifted out of it.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub body: String,
    pub embed: Option<Embed>,
}

#[derive(Debug, Clone, Copy)]
pub struct DirectiveParser {
    poll_window_ms: i64,
    kick_window_ms: i64,
}

impl DirectiveParser {
    pub fn new(poll_window_ms: i64, kick_window_ms: i64) -> Self {
        Self {
            poll_window_ms,
            kick_window_ms,
        }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(ms(config.poll_window), ms(config.kick_window))
    }

    /// Never fails: text without a usable token comes back unchanged.
    pub fn parse<R: Rng + ?Sized>(&self, text: &str, now: i64, rng: &mut R) -> Parsed {
        for (open, _) in text.match_indices('[') {
            let Some(close) = closing_bracket(text, open) else {
                continue;
            };
            if let Some(embed) = self.parse_token(&text[open + 1..close], now, rng) {
                let before = text[..open].trim_end();
                let after = &text[close + 1..];
                return Parsed {
                    body: format!("{before}{after}").trim().to_string(),
                    embed: Some(embed),
                };
            }
        }
        Parsed {
            body: text.to_string(),
            embed: None,
        }
    }

    fn parse_token<R: Rng + ?Sized>(&self, inner: &str, now: i64, rng: &mut R) -> Option<Embed> {
        if let Some(rest) = inner.strip_prefix("POLL:") {
            let (question, options) = parse_poll_items(rest)?;
            Some(Embed::Poll(Poll::standard(
                question,
                options,
                now.saturating_add(self.poll_window_ms),
            )))
        } else if let Some(rest) = inner.strip_prefix("VOTE_KICK:") {
            let name = rest.trim().trim_start_matches('@').trim();
            if name.is_empty() || name.contains(['"', '[']) {
                return None;
            }
            Some(Embed::Poll(Poll::kick(name, now.saturating_add(self.kick_window_ms))))
        } else if let Some(rest) = inner.strip_prefix("GAME:") {
            roll(rest.trim(), rng).map(Embed::Game)
        } else {
            None
        }
    }
}

/// Index of the `]` closing the token opened at `open`, skipping brackets
/// inside quoted strings.
fn closing_bracket(text: &str, open: usize) -> Option<usize> {
    let mut quoted = false;
    for (i, c) in text[open + 1..].char_indices() {
        match c {
            '"' => quoted = !quoted,
            ']' if !quoted => return Some(open + 1 + i),
            _ => {}
        }
    }
    None
}

/// `"Q", "A", "B"` into the question and cleaned, de-duplicated option
/// labels. Needs a question and at least one option.
fn parse_poll_items(raw: &str) -> Option<(String, Vec<String>)> {
    let mut items = Vec::new();
    let mut rest = raw.trim();
    while !rest.is_empty() {
        let body = rest.strip_prefix('"')?;
        let end = body.find('"')?;
        items.push(body[..end].trim().to_string());
        rest = body[end + 1..].trim_start();
        if let Some(next) = rest.strip_prefix(',') {
            rest = next.trim_start();
            if rest.is_empty() {
                return None;
            }
        } else if !rest.is_empty() {
            return None;
        }
    }

    let mut items = items.into_iter();
    let question = items.next().filter(|q| !q.is_empty())?;
    let mut options: Vec<String> = Vec::new();
    for label in items.filter(|o| !o.is_empty()).map(|o| sanitize_key(&o)) {
        if !options.contains(&label) {
            options.push(label);
        }
    }
    if options.is_empty() {
        return None;
    }
    Some((question, options))
}

fn roll<R: Rng + ?Sized>(kind: &str, rng: &mut R) -> Option<GameResult> {
    match kind.to_ascii_uppercase().as_str() {
        "DICE" => Some(GameResult {
            kind: GameKind::Dice,
            value: Some(rng.random_range(1..=6u8).to_string()),
        }),
        "COIN" => Some(GameResult {
            kind: GameKind::Coin,
            value: Some(if rng.random_bool(0.5) { "HEADS" } else { "TAILS" }.to_string()),
        }),
        "TOD" => Some(GameResult {
            kind: GameKind::TruthOrDare,
            value: None,
        }),
        _ => None,
    }
}
