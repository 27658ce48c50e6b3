// Shapes returned by the comment read API.
//
// These are read-only copies of indexer state. They are also what we write
// into the comment/profile cache, so they must round-trip through serde_json.

use serde::{Deserialize, Deserializer, Serialize};

/// Comment type value for reactions (likes and other lightweight responses).
pub const COMMENT_TYPE_REACTION: u8 = 1;

/// A comment identifier (bytes32 hex), normalized to trimmed lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct CommentId(String);

impl CommentId {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_lowercase())
    }

    /// Parse a parent id, mapping every "no parent" representation to `None`.
    ///
    /// The contract emits an all-zero bytes32 for top-level comments, the API
    /// may return `null`, and older payloads carry zero strings of other
    /// widths. Any hex string made only of zeros (or an empty one) counts.
    pub fn parent(raw: &str) -> Option<Self> {
        if is_zero_sentinel(raw) {
            None
        } else {
            Some(Self::new(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CommentId {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<CommentId> for String {
    fn from(id: CommentId) -> Self {
        id.0
    }
}

impl std::fmt::Display for CommentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// True for "", "0x", and any all-zero hex string regardless of width.
pub fn is_zero_sentinel(raw: &str) -> bool {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    digits.chars().all(|c| c == '0')
}

/// A resolved comment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub author: Author,
    #[serde(default, deserialize_with = "deserialize_parent_id")]
    pub parent_id: Option<CommentId>,
    #[serde(default)]
    pub content: String,
    #[serde(default, deserialize_with = "deserialize_null_as_empty")]
    pub references: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_type: Option<u8>,
}

impl Comment {
    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// The comment author's identity and optional social profiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ens: Option<EnsProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub farcaster: Option<FarcasterProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsProfile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FarcasterProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fid: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pfp_url: Option<String>,
}

/// A structured annotation on a comment's content.
///
/// Only the three types the pipeline acts on are modeled; anything else the
/// indexer attaches (webpages, images, quoted comments) becomes `Other`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Reference {
    Erc20 {
        address: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        symbol: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Ens {
        address: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Farcaster {
        address: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
    },
    #[serde(other)]
    Other,
}

impl Reference {
    /// The lower-cased address this reference mentions, if it is a mention.
    ///
    /// ENS and Farcaster references are identities; ERC-20 references are
    /// tokens and never notify anyone.
    pub fn mention_address(&self) -> Option<String> {
        match self {
            Reference::Ens { address, .. } | Reference::Farcaster { address, .. } => {
                Some(address.trim().to_lowercase())
            }
            Reference::Erc20 { .. } | Reference::Other => None,
        }
    }
}

fn deserialize_parent_id<'de, D>(deserializer: D) -> Result<Option<CommentId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| CommentId::parent(&s)))
}

fn deserialize_null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let raw: Option<Vec<T>> = Option::deserialize(deserializer)?;
    Ok(raw.unwrap_or_default())
}
