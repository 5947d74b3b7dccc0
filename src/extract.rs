//! Pulls candidate links out of a submitted email.
//!
//! Anchors and attachments arrive as loosely shaped JSON objects.  An entry
//! without the expected link field (or that is not an object at all) still
//! deserializes, it just carries no link and is skipped here.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A hyperlink found in the email body.
#[derive(Debug, Serialize, Default, Clone, PartialEq, Eq)]
pub struct Anchor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A link to a file attached to (or referenced by) the email.
#[derive(Debug, Serialize, Default, Clone, PartialEq, Eq)]
pub struct Attachment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

impl Anchor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
        }
    }
}

impl Attachment {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: Some(href.into()),
        }
    }
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    value
        .as_object()
        .and_then(|obj| obj.get(field))
        .and_then(|v| v.as_str())
        .map(str::to_owned)
}

impl<'de> Deserialize<'de> for Anchor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Anchor {
            url: string_field(&value, "url"),
        })
    }
}

impl<'de> Deserialize<'de> for Attachment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Attachment {
            href: string_field(&value, "href"),
        })
    }
}

/// URLs of all anchors that have one, in input order.  Duplicates are kept.
pub fn extract_urls(anchors: &[Anchor]) -> Vec<String> {
    anchors.iter().filter_map(|a| a.url.clone()).collect()
}

/// File references of all attachments that have one, in input order.
pub fn extract_file_refs(attachments: &[Attachment]) -> Vec<String> {
    attachments.iter().filter_map(|a| a.href.clone()).collect()
}
