//! `$`-prefixed admin/mod commands that manage the settings at runtime.
//!
//! - `$url list|add <domain>|remove <domain>`: admins and mods
//! - `$mods list|add <user>|remove <user>`: admins only

use std::sync::Arc;

use crate::{
    domain::{Identity, RoomId},
    errors::CommandError,
    settings::{Settings, SettingsStore},
    transport::{send_notice, RoomTransport},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandKind {
    Url,
    Mods,
}

impl CommandKind {
    fn name(self) -> &'static str {
        match self {
            CommandKind::Url => "url",
            CommandKind::Mods => "mods",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub args: Vec<String>,
}

/// Parse a message body into a recognized command.
///
/// The first word must be exactly `$url` or `$mods`: bodies that merely
/// start with the sigil (`$5 off!`) or with whitespace are not commands.
pub fn parse_command(body: &str) -> Option<Command> {
    let (head, rest) = body.split_once(char::is_whitespace).unwrap_or((body, ""));
    let kind = match head {
        "$url" => CommandKind::Url,
        "$mods" => CommandKind::Mods,
        _ => return None,
    };
    Some(Command {
        kind,
        args: rest.split_whitespace().map(str::to_string).collect(),
    })
}

enum Sub<'a> {
    List,
    Add(&'a str),
    Remove(&'a str),
}

fn parse_sub<'a>(
    kind: CommandKind,
    args: &'a [String],
    add_usage: &'static str,
    remove_usage: &'static str,
) -> Result<Sub<'a>, CommandError> {
    let Some(first) = args.first() else {
        return Err(CommandError::MissingArguments {
            command: kind.name(),
        });
    };
    let target = args.get(1).map(String::as_str);
    match (first.as_str(), target) {
        ("list", _) => Ok(Sub::List),
        ("add", Some(t)) => Ok(Sub::Add(t)),
        ("add", None) => Err(CommandError::Usage(add_usage)),
        ("remove", Some(t)) => Ok(Sub::Remove(t)),
        ("remove", None) => Err(CommandError::Usage(remove_usage)),
        (other, _) => Err(CommandError::UnknownSubcommand {
            command: kind.name(),
            sub: other.to_string(),
        }),
    }
}

pub struct CommandDispatcher {
    store: Arc<SettingsStore>,
    transport: Arc<dyn RoomTransport>,
}

impl CommandDispatcher {
    pub fn new(store: Arc<SettingsStore>, transport: Arc<dyn RoomTransport>) -> Self {
        Self { store, transport }
    }

    /// Run `cmd` and answer in `room` with a plaintext notice.
    pub async fn dispatch(&self, room: &RoomId, sender: &Identity, cmd: Command) {
        let reply = match self.execute(sender, &cmd).await {
            Ok(text) => text,
            Err(e) => {
                tracing::info!(
                    room = %room,
                    sender = %sender,
                    command = cmd.kind.name(),
                    error = %e,
                    "command rejected"
                );
                e.to_string()
            }
        };
        if let Err(e) = send_notice(self.transport.as_ref(), room, &reply).await {
            tracing::warn!(room = %room, error = %e, "failed to send command reply");
        }
    }

    /// Execute `cmd` on behalf of `sender`, returning the confirmation text.
    ///
    /// Errors carry the notice to show; no mutation happens on error.
    pub async fn execute(&self, sender: &Identity, cmd: &Command) -> Result<String, CommandError> {
        match cmd.kind {
            CommandKind::Url => self.url(sender, &cmd.args).await,
            CommandKind::Mods => self.mods(sender, &cmd.args).await,
        }
    }

    async fn url(&self, sender: &Identity, args: &[String]) -> Result<String, CommandError> {
        let sub = parse_sub(CommandKind::Url, args, "$url add <url>", "$url remove <url>")?;
        let authorize = |s: &Settings| {
            if s.can_moderate(sender) {
                Ok(())
            } else {
                Err(CommandError::Unauthorized {
                    command: "url",
                    required: "admin or mod",
                })
            }
        };

        match sub {
            Sub::List => {
                let s = self.store.get().await;
                authorize(&s)?;
                if s.url_whitelist.is_empty() {
                    Ok("No URLs are whitelisted".to_string())
                } else {
                    Ok(format!("URL whitelist: {}", s.url_whitelist.join(",")))
                }
            }
            Sub::Add(domain) => {
                self.store
                    .update(|s| -> Result<(), CommandError> {
                        authorize(&*s)?;
                        if s.is_whitelisted(domain) {
                            return Err(CommandError::DomainExists(domain.to_string()));
                        }
                        s.url_whitelist.push(domain.to_string());
                        Ok(())
                    })
                    .await?;
                self.persist_after(sender, "url add").await;
                Ok(format!("Added {domain}"))
            }
            Sub::Remove(domain) => {
                self.store
                    .update(|s| -> Result<(), CommandError> {
                        authorize(&*s)?;
                        let idx = s
                            .whitelist_position(domain)
                            .ok_or_else(|| CommandError::DomainNotFound(domain.to_string()))?;
                        s.url_whitelist.remove(idx);
                        Ok(())
                    })
                    .await?;
                self.persist_after(sender, "url remove").await;
                Ok(format!("Removed {domain}"))
            }
        }
    }

    async fn mods(&self, sender: &Identity, args: &[String]) -> Result<String, CommandError> {
        let sub = parse_sub(
            CommandKind::Mods,
            args,
            "$mods add @user:example.com",
            "$mods remove @user:example.com",
        )?;
        let authorize = |s: &Settings| {
            if s.is_admin(sender) {
                Ok(())
            } else {
                Err(CommandError::Unauthorized {
                    command: "mods",
                    required: "admin",
                })
            }
        };

        match sub {
            Sub::List => {
                let s = self.store.get().await;
                authorize(&s)?;
                if s.mods.is_empty() {
                    Ok("No moderators".to_string())
                } else {
                    let names: Vec<&str> = s.mods.iter().map(Identity::as_str).collect();
                    Ok(format!("moderators: {}", names.join(",")))
                }
            }
            Sub::Add(user) => {
                let user = Identity::new(user);
                self.store
                    .update(|s| -> Result<(), CommandError> {
                        authorize(&*s)?;
                        if !s.mods.insert(user.clone()) {
                            return Err(CommandError::ModeratorExists(user.to_string()));
                        }
                        Ok(())
                    })
                    .await?;
                self.persist_after(sender, "mods add").await;
                Ok(format!("{user} is now a moderator"))
            }
            Sub::Remove(user) => {
                let user = Identity::new(user);
                self.store
                    .update(|s| -> Result<(), CommandError> {
                        authorize(&*s)?;
                        if !s.mods.remove(&user) {
                            return Err(CommandError::ModeratorNotFound(user.to_string()));
                        }
                        Ok(())
                    })
                    .await?;
                self.persist_after(sender, "mods remove").await;
                Ok(format!("{user} is no longer a moderator"))
            }
        }
    }

    async fn persist_after(&self, sender: &Identity, action: &str) {
        tracing::info!(sender = %sender, action, "settings changed by command");
        // Already logged by the store; chat users never see persistence errors.
        let _ = self.store.persist().await;
    }
}
