//! Operator commands.
//!
//! Every command the approval channel can deliver is one variant of
//! [`Command`]; the engine dispatches them through a single `match`.

use thiserror::Error;

use super::card::InboundCommand;

/// Default number of posts for resend/summary
pub const DEFAULT_LIST_LIMIT: usize = 5;

/// Upper bound for resend/summary
pub const MAX_LIST_LIMIT: usize = 50;

/// Errors produced while parsing an inbound command
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Unknown command: /{0}")]
    UnknownCommand(String),

    #[error("/{0} needs a request reference (reply to an approval card or pass the token)")]
    MissingReference(String),

    #[error("Invalid argument for /{command}: {reason}")]
    InvalidArgument { command: String, reason: String },
}

/// A parsed operator command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Publish with the stored commentary
    Approve { token: String },

    /// Skip the post permanently
    Reject { token: String },

    /// Generate new commentary and re-send the card
    Regenerate { token: String },

    /// Like the post, no status change
    LikeOnly { token: String },

    /// Publish without any commentary
    PublishPlain { token: String },

    /// Publish with operator-supplied commentary
    Revise { token: String, commentary: String },

    /// Re-send the newest posts as cards
    Resend { limit: usize },

    /// Re-send all pending posts as cards
    ResendPending,

    /// Condensed newest-first listing
    Summary { limit: usize },

    /// Counts by status
    Statistics,

    /// Command reference
    Help,
}

impl Command {
    /// Parse a raw inbound command
    pub fn parse(inbound: &InboundCommand) -> Result<Self, CommandError> {
        let name = inbound.name.trim_start_matches('/').to_lowercase();

        match name.as_str() {
            "approve" | "repost" => Ok(Command::Approve {
                token: reference(&name, inbound)?.0,
            }),
            "reject" | "skip" => Ok(Command::Reject {
                token: reference(&name, inbound)?.0,
            }),
            "regenerate" | "redo" => Ok(Command::Regenerate {
                token: reference(&name, inbound)?.0,
            }),
            "like" | "just_like" | "like_only" => Ok(Command::LikeOnly {
                token: reference(&name, inbound)?.0,
            }),
            "publish_plain" | "just_repost" => Ok(Command::PublishPlain {
                token: reference(&name, inbound)?.0,
            }),
            "revise" => {
                let (token, rest) = reference(&name, inbound)?;
                let commentary = rest.join(" ").trim().to_string();
                if commentary.is_empty() {
                    return Err(CommandError::InvalidArgument {
                        command: name,
                        reason: "provide the commentary text after the command".to_string(),
                    });
                }
                Ok(Command::Revise { token, commentary })
            }
            "resend" | "send" => Ok(Command::Resend {
                limit: list_limit(&name, &inbound.args)?,
            }),
            "resend_pending" | "send_pending" => Ok(Command::ResendPending),
            "summary" => Ok(Command::Summary {
                limit: list_limit(&name, &inbound.args)?,
            }),
            "statistics" | "stats" => Ok(Command::Statistics),
            "help" | "start" => Ok(Command::Help),
            _ => Err(CommandError::UnknownCommand(name)),
        }
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Approve { .. } => "approve",
            Command::Reject { .. } => "reject",
            Command::Regenerate { .. } => "regenerate",
            Command::LikeOnly { .. } => "like",
            Command::PublishPlain { .. } => "publish_plain",
            Command::Revise { .. } => "revise",
            Command::Resend { .. } => "resend",
            Command::ResendPending => "resend_pending",
            Command::Summary { .. } => "summary",
            Command::Statistics => "statistics",
            Command::Help => "help",
        }
    }

    /// Correlation token, for commands that target one post
    pub fn token(&self) -> Option<&str> {
        match self {
            Command::Approve { token }
            | Command::Reject { token }
            | Command::Regenerate { token }
            | Command::LikeOnly { token }
            | Command::PublishPlain { token }
            | Command::Revise { token, .. } => Some(token),
            _ => None,
        }
    }
}

/// Resolve the correlation reference and return the remaining arguments.
///
/// A channel-supplied reference wins; otherwise the first argument is the token.
fn reference(name: &str, inbound: &InboundCommand) -> Result<(String, Vec<String>), CommandError> {
    if let Some(reference) = inbound.reference.as_deref().map(str::trim) {
        if !reference.is_empty() {
            return Ok((reference.to_string(), inbound.args.clone()));
        }
    }

    match inbound.args.split_first() {
        Some((first, rest)) if is_token_like(first) => Ok((first.clone(), rest.to_vec())),
        Some((first, _)) => Err(CommandError::InvalidArgument {
            command: name.to_string(),
            reason: format!("'{}' is not a request reference", first),
        }),
        None => Err(CommandError::MissingReference(name.to_string())),
    }
}

fn is_token_like(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 64
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn list_limit(name: &str, args: &[String]) -> Result<usize, CommandError> {
    let Some(raw) = args.first() else {
        return Ok(DEFAULT_LIST_LIMIT);
    };

    let invalid = |reason: String| CommandError::InvalidArgument {
        command: name.to_string(),
        reason,
    };

    let limit: usize = raw
        .parse()
        .map_err(|_| invalid(format!("'{}' is not a number", raw)))?;

    if limit < 1 {
        return Err(invalid("number of posts must be at least 1".to_string()));
    }
    if limit > MAX_LIST_LIMIT {
        return Err(invalid(format!("maximum {} posts allowed", MAX_LIST_LIMIT)));
    }

    Ok(limit)
}
