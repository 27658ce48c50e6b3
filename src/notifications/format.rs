// Notification text helpers — display names and token substitution.
//
// Mirrors what the mobile app renders: token links written as
// `eip155:<chain>/erc20:<address>` show as `$SYMBOL`, and authors are
// shown by ENS name, Farcaster username, or a shortened address.

use regex_lite::{Captures, Regex};
use std::sync::LazyLock;

use crate::ecp::models::{Author, Reference};

/// CAIP-19 style ERC-20 token link embedded in comment text.
static EIP155_TOKEN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)eip155:(\d+)/erc20:(0x[a-f0-9]{40})").expect("token regex should compile")
});

/// Shorten an address to `0x1234...abcd` (first 6 + "..." + last 4 characters).
///
/// Works on characters, so non-ASCII input can't cause a slicing panic.
/// Inputs of 10 characters or fewer are returned unchanged.
pub fn truncate_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 10 {
        return address.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// The name shown for an author: ENS name, then Farcaster username, then
/// the truncated address.
pub fn author_display_name(author: &Author) -> String {
    if let Some(name) = author.ens.as_ref().map(|e| e.name.trim()) {
        if !name.is_empty() {
            return name.to_string();
        }
    }
    if let Some(username) = author
        .farcaster
        .as_ref()
        .and_then(|f| f.username.as_deref())
        .map(str::trim)
    {
        if !username.is_empty() {
            return username.to_string();
        }
    }
    truncate_address(&author.address)
}

/// Replace embedded ERC-20 token links with their ticker.
///
/// The matching reference is found by case-insensitive address. Symbol wins
/// over name; with neither (or no matching reference) the token address is
/// shortened instead. Text without token links is returned unchanged.
pub fn format_comment_content(content: &str, references: &[Reference]) -> String {
    if content.is_empty() {
        return String::new();
    }

    EIP155_TOKEN_REGEX
        .replace_all(content, |caps: &Captures| {
            let token_address = &caps[2];
            let token = references.iter().find_map(|r| match r {
                Reference::Erc20 {
                    address,
                    symbol,
                    name,
                } if address.eq_ignore_ascii_case(token_address) => Some((symbol, name)),
                _ => None,
            });

            let label = token.and_then(|(symbol, name)| {
                non_empty(symbol.as_deref()).or_else(|| non_empty(name.as_deref()))
            });

            match label {
                Some(label) => format!("${label}"),
                None => truncate_address(token_address),
            }
        })
        .into_owned()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
