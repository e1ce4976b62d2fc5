use std::collections::HashSet;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use ghost_core::polls::PollStatus;
use ghost_core::{AssistantBridge, ChatSession, SendOptions};
use ghost_store::RealtimeStore;
use ghost_types::{Attachment, ClientEvent, IdentityId, Message};

const HELP: &str = "\
commands:
  <text>                  broadcast to the current channel
  /eph <text>             ephemeral message (45s)
  /reply <id> <text>      quote a message
  /react <id> <emoji>     toggle a reaction
  /float <emoji>          floating reaction burst
  /vote <id> <option>     vote in a poll
  /invite <identity>      invite someone to a private room
  /accept | /decline      answer a pending invitation
  /leave                  back to the public channel
  /typing                 send a typing heartbeat
  /ls                     list visible messages
  /me                     show your identity
  /logout | /quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Say(String),
    Ephemeral(String),
    Reply { id: String, text: String },
    React { id: String, emoji: String },
    Float(String),
    Vote { id: String, option: String },
    Invite(String),
    Accept,
    Decline,
    Leave,
    Typing,
    List,
    WhoAmI,
    Help,
    Logout,
    Quit,
}

/// Split off the first whitespace-delimited word.
fn word(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if s.is_empty() {
        return None;
    }
    Some(match s.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (s, ""),
    })
}

impl Command {
    /// `None` for blank lines. Unknown or incomplete commands show help.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Some(Self::Say(line.to_string()));
        };
        let (name, args) = word(rest)?;
        let pair = |args: &str| {
            word(args)
                .filter(|(_, tail)| !tail.is_empty())
                .map(|(head, tail)| (head.to_string(), tail.to_string()))
        };
        let cmd = match name {
            "eph" if !args.is_empty() => Self::Ephemeral(args.to_string()),
            "reply" => pair(args).map(|(id, text)| Self::Reply { id, text })?,
            "react" => pair(args).map(|(id, emoji)| Self::React { id, emoji })?,
            "float" if !args.is_empty() => Self::Float(args.to_string()),
            "vote" => pair(args).map(|(id, option)| Self::Vote { id, option })?,
            "invite" if !args.is_empty() => Self::Invite(args.to_string()),
            "accept" => Self::Accept,
            "decline" => Self::Decline,
            "leave" => Self::Leave,
            "typing" => Self::Typing,
            "ls" => Self::List,
            "me" => Self::WhoAmI,
            "logout" => Self::Logout,
            "quit" | "exit" => Self::Quit,
            _ => Self::Help,
        };
        Some(cmd)
    }
}

pub fn render(message: &Message, now: i64, remaining_ms: i64) -> String {
    let mut line = format!("[{}] {}: {}", message.id, message.sender_name, message.text);
    if let Some(reply) = &message.reply_to {
        line = format!("{}  (re {}: \"{}\")", line, reply.sender_name, reply.text);
    }
    match message.attachment() {
        Attachment::Poll(poll) => {
            let counts: Vec<String> = poll
                .options
                .iter()
                .map(|(label, n)| format!("{label}={n}"))
                .collect();
            let state = match ghost_core::polls::resolve(poll, now) {
                PollStatus::Open { remaining_ms } => format!("{}s left", remaining_ms / 1000),
                PollStatus::Closed(verdict) => format!("closed: {:?}", verdict),
            };
            line = format!("{}\n    poll \"{}\" {} [{}]", line, poll.question, counts.join(" "), state);
        }
        Attachment::Game(game) => {
            line = format!(
                "{}\n    game {:?} {}",
                line,
                game.kind,
                game.value.as_deref().unwrap_or("")
            );
        }
        Attachment::None => {}
    }
    let reactions: Vec<String> = message
        .reactions
        .keys()
        .map(|emoji| format!("{}{}", emoji, message.reaction_count(emoji)))
        .collect();
    if !reactions.is_empty() {
        line = format!("{}\n    {}", line, reactions.join(" "));
    }
    if message.ephemeral || message.image.is_some() {
        line = format!("{}  ({}s)", line, remaining_ms / 1000);
    }
    line
}

fn describe(event: &ClientEvent) -> String {
    match event {
        ClientEvent::Notice { text } => format!("! {}", text),
        ClientEvent::ConnectivityChanged { online } => {
            format!("! {}", if *online { "back online" } else { "offline" })
        }
        ClientEvent::ChannelSwitched { channel } => format!("-- now in {} --", channel),
        ClientEvent::InvitationReceived { from_id, from_name, .. } => {
            format!("! {} ({}) wants a private room. /accept or /decline", from_name, from_id)
        }
        ClientEvent::PairingChanged { state } => format!("~ pairing: {:?}", state),
        ClientEvent::FloatingReaction(reaction) => format!("  {0}  {0}  {0}", reaction.emoji),
        ClientEvent::Banished { .. } => "!! the group voted you out. your ghost fades.".into(),
    }
}

/// Print events and new messages until the session is dropped.
pub async fn print_updates<S: RealtimeStore, B: AssistantBridge>(session: ChatSession<S, B>) {
    let mut events = session.events();
    let mut view = session.watch_view();
    let mut typists = session.typists();
    let mut shown: HashSet<String> = HashSet::new();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => println!("{}", describe(&event)),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("dropped {} events", n);
                }
                Err(_) => return,
            },
            changed = view.changed() => {
                if changed.is_err() {
                    return;
                }
                let now = session.now_ms();
                let current = view.borrow_and_update().clone();
                if current.messages.is_empty() {
                    shown.clear();
                }
                for message in current.messages.iter() {
                    if shown.insert(message.id.clone()) {
                        println!("{}", render(message, now, session.remaining_ms(message)));
                    }
                }
            }
            changed = typists.changed() => {
                if changed.is_err() {
                    return;
                }
                let names = typists.borrow_and_update().clone();
                if !names.is_empty() {
                    println!("  ...{} typing", names.join(", "));
                }
            }
        }
    }
}

/// Returns when the user quits or logs out.
pub async fn run<S: RealtimeStore, B: AssistantBridge>(session: ChatSession<S, B>) -> anyhow::Result<()> {
    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let Some(cmd) = Command::parse(&line) else {
            continue;
        };
        let result = match cmd {
            Command::Say(text) => session.send(&text, SendOptions::default()).await.map(drop),
            Command::Ephemeral(text) => session
                .send(
                    &text,
                    SendOptions {
                        ephemeral: true,
                        ..SendOptions::default()
                    },
                )
                .await
                .map(drop),
            Command::Reply { id, text } => session
                .send(
                    &text,
                    SendOptions {
                        reply_to: Some(id),
                        ..SendOptions::default()
                    },
                )
                .await
                .map(drop),
            Command::React { id, emoji } => session.toggle_reaction(&id, &emoji).await,
            Command::Float(emoji) => session.react_floating(&emoji).await,
            Command::Vote { id, option } => session.vote(&id, &option).await,
            Command::Invite(target) => session.invite(&IdentityId::new(target)).await.map(drop),
            Command::Accept => session.accept().await.map(drop),
            Command::Decline => session.decline().await,
            Command::Leave => {
                if !session.leave_room() {
                    println!("! not in a private room");
                }
                Ok(())
            }
            Command::Typing => session.keystroke().await,
            Command::List => {
                let now = session.now_ms();
                for message in session.messages() {
                    println!("{}", render(&message, now, session.remaining_ms(&message)));
                }
                Ok(())
            }
            Command::WhoAmI => {
                let p = session.profile();
                println!("{} ({}, {}) in {}", p.name, p.id, p.color, session.channel());
                Ok(())
            }
            Command::Help => {
                println!("{}", HELP);
                Ok(())
            }
            Command::Logout => {
                session.logout().await?;
                return Ok(());
            }
            Command::Quit => return Ok(()),
        };
        if let Err(e) = result {
            println!("! {}", e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_messages() {
        assert_eq!(Command::parse("  boo  "), Some(Command::Say("boo".into())));
        assert_eq!(Command::parse("   "), None);
    }

    #[test]
    fn commands_take_their_arguments() {
        assert_eq!(
            Command::parse("/reply -N1 no way"),
            Some(Command::Reply {
                id: "-N1".into(),
                text: "no way".into()
            })
        );
        assert_eq!(
            Command::parse("/vote -N2 BANISH"),
            Some(Command::Vote {
                id: "-N2".into(),
                option: "BANISH".into()
            })
        );
        assert_eq!(Command::parse("/float 🔥"), Some(Command::Float("🔥".into())));
        assert_eq!(Command::parse("/accept"), Some(Command::Accept));
    }

    #[test]
    fn incomplete_commands_show_help() {
        assert_eq!(Command::parse("/react -N1"), Some(Command::Help));
        assert_eq!(Command::parse("/eph"), Some(Command::Help));
        assert_eq!(Command::parse("/dance"), Some(Command::Help));
    }
}
