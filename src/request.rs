//! Boost request validation and target normalization.

use thiserror::Error;

use crate::types::TargetKind;

/// Rejections raised before any external call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Target string is not a recognised link, code, or id.
    #[error("invalid {kind} target: {value:?}")]
    InvalidTarget {
        /// Expected target kind.
        kind: &'static str,
        /// Offending input.
        value: String,
    },
    /// Recipient list is empty.
    #[error("recipient list is empty")]
    NoRecipients,
    /// Recipient list exceeds the configured bound.
    #[error("{count} recipients exceeds the limit of {limit}")]
    TooManyRecipients {
        /// Submitted count.
        count: usize,
        /// Configured maximum.
        limit: usize,
    },
    /// A recipient entry is blank.
    #[error("recipient at index {0} is blank")]
    BlankRecipient(usize),
}

/// A validated request to drive recipients at one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoostRequest {
    /// Channel or group.
    pub kind: TargetKind,
    /// Normalized target identifier.
    pub target: String,
    /// Recipients in submission order.
    pub recipients: Vec<String>,
}

impl BoostRequest {
    /// Validates `recipients` and normalizes `target` for `kind`.
    ///
    /// Recipients are otherwise left untouched; order is preserved.
    pub fn new(
        kind: TargetKind,
        target: &str,
        recipients: Vec<String>,
        max_recipients: usize,
    ) -> Result<Self, ValidationError> {
        let target = normalize_target(kind, target)?;
        if recipients.is_empty() {
            return Err(ValidationError::NoRecipients);
        }
        if recipients.len() > max_recipients {
            return Err(ValidationError::TooManyRecipients {
                count: recipients.len(),
                limit: max_recipients,
            });
        }
        if let Some(idx) = recipients.iter().position(|r| r.trim().is_empty()) {
            return Err(ValidationError::BlankRecipient(idx));
        }
        Ok(Self {
            kind,
            target,
            recipients,
        })
    }
}

const CHANNEL_PATH: &str = "whatsapp.com/channel/";
const INVITE_HOST: &str = "chat.whatsapp.com/";
const GROUP_JID_SUFFIX: &str = "@g.us";

/// Reduces a link or bare identifier to the identifier the client expects.
///
/// Channels: `https://whatsapp.com/channel/ID`, `www.` and scheme-less forms,
/// or a bare alphanumeric newsletter id. Groups: a `...@g.us` JID, an invite
/// link on `chat.whatsapp.com`, or a bare invite code.
pub fn normalize_target(kind: TargetKind, raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    let invalid = || ValidationError::InvalidTarget {
        kind: kind.as_str(),
        value: raw.to_string(),
    };

    match kind {
        TargetKind::Channel => {
            let id = link_tail(trimmed, CHANNEL_PATH).unwrap_or(trimmed);
            if is_alphanumeric_token(id) {
                Ok(id.to_string())
            } else {
                Err(invalid())
            }
        }
        TargetKind::Group => {
            if let Some(user) = trimmed.strip_suffix(GROUP_JID_SUFFIX) {
                let valid = !user.is_empty()
                    && user.chars().all(|c| c.is_ascii_digit() || c == '-');
                return if valid {
                    Ok(trimmed.to_string())
                } else {
                    Err(invalid())
                };
            }
            let code = link_tail(trimmed, INVITE_HOST).unwrap_or(trimmed);
            if is_alphanumeric_token(code) {
                Ok(code.to_string())
            } else {
                Err(invalid())
            }
        }
    }
}

fn link_tail<'a>(input: &'a str, marker: &str) -> Option<&'a str> {
    let rest = input
        .strip_prefix("https://")
        .or_else(|| input.strip_prefix("http://"))
        .unwrap_or(input);
    let rest = rest.strip_prefix("www.").unwrap_or(rest);
    let lower = rest.to_ascii_lowercase();
    if !lower.starts_with(marker) {
        return None;
    }
    let tail = &rest[marker.len()..];
    Some(tail.split(['?', '#', '/']).next().unwrap_or(tail))
}

fn is_alphanumeric_token(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric())
}
