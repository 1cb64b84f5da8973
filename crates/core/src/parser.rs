//! Text utilities for Slack mention markup.
//!
//! Mentions arrive as `<@U123>` or `<@U123|display_name>`. Everything here is
//! stateless; only [`extract_recipient`] can fail.

use std::sync::LazyLock;

use regex::{NoExpand, Regex};

use crate::domain::user::UserId;
use crate::errors::DomainError;

const MENTION_OPEN: &str = "<@";

static MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<@([[:alnum:]]+)(\|[^>]+)?>").expect("mention pattern is valid")
});

/// ASCII whitespace only: tab, newline, form feed, carriage return, space.
/// Non-breaking spaces and other Unicode blanks are message content.
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\t\n\f\r ]{2,}").expect("whitespace pattern is valid"));

/// Counts mention openers. A cheap pre-check, not a strict parse.
pub fn count_mentions(text: &str) -> usize {
    text.matches(MENTION_OPEN).count()
}

/// Returns the user id of the first well-formed mention token.
pub fn extract_recipient(text: &str) -> Result<UserId, DomainError> {
    MENTION
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|id| UserId(id.as_str().to_owned()))
        .ok_or(DomainError::NoRecipientFound)
}

/// Replaces every mention of `user_id` (with or without a display-name suffix)
/// by the literal `display_name`.
pub fn substitute_mention(text: &str, user_id: &UserId, display_name: &str) -> String {
    let pattern = format!(r"<@{}(\|[^>]+)?>", regex::escape(&user_id.0));
    match Regex::new(&pattern) {
        Ok(mention) => mention.replace_all(text, NoExpand(display_name)).into_owned(),
        Err(_) => text.to_owned(),
    }
}

/// Deletes every run of two or more whitespace characters, then trims.
///
/// Runs are removed outright rather than collapsed to a single space, so
/// `"a  b"` becomes `"ab"` while `"a b"` is left alone.
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text, "").trim().to_owned()
}

pub fn format_mention(user_id: &UserId) -> String {
    format!("{MENTION_OPEN}{}>", user_id.0)
}
