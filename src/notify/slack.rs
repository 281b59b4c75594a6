//! Slack incoming-webhook message formats.
//!
//! Two layouts are supported: legacy colored attachments and block kit
//! sections. Both carry the same title text so clients without block support
//! still show something.

use serde::{Deserialize, Serialize};

/// Title of every notification.
pub const TITLE: &str = "SSL certificate status";

pub const GOOD: &str = "good";
pub const WARNING: &str = "warning";
pub const DANGER: &str = "danger";
pub const DEFAULT: &str = "";

/// Maps a numeric severity to an attachment color. Unknown values are neutral.
pub fn status_to_color(status: i32) -> &'static str {
    match status {
        0 => GOOD,
        1 => WARNING,
        2 => DANGER,
        _ => DEFAULT,
    }
}

/// Maps a numeric severity to the emoji shown in a block section.
pub fn status_to_emoji(status: i32) -> &'static str {
    match status {
        0 => ":large_green_circle:",
        1 => ":large_orange_circle:",
        2 => ":red_circle:",
        _ => ":white_circle:",
    }
}

/// A message attachment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub text: String,
    pub color: String,
}

impl Attachment {
    pub fn new(text: impl Into<String>, status: i32) -> Attachment {
        Attachment {
            text: text.into(),
            color: status_to_color(status).to_string(),
        }
    }
}

/// Text object used inside blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Text {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl Text {
    pub fn plain(text: impl Into<String>) -> Text {
        Text {
            kind: "plain_text".to_string(),
            text: text.into(),
        }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Text {
        Text {
            kind: "mrkdwn".to_string(),
            text: text.into(),
        }
    }
}

/// A block kit layout block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Block {
    Header { text: Text },
    Section { fields: Vec<Text> },
}

impl Block {
    pub fn header(title: &str) -> Block {
        Block::Header {
            text: Text::plain(title),
        }
    }

    /// One host line: the host in bold, then severity emoji and remaining time.
    pub fn status(host: &str, remaining: &str, status: i32) -> Block {
        Block::Section {
            fields: vec![
                Text::mrkdwn(format!("*{}*", host)),
                Text::mrkdwn(format!("{} {}", status_to_emoji(status), remaining)),
            ],
        }
    }
}

/// A webhook message, in either layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Msg {
    Attachments {
        text: String,
        attachments: Vec<Attachment>,
    },
    Blocks {
        text: String,
        blocks: Vec<Block>,
    },
}

impl Msg {
    pub fn with_attachments(attachments: Vec<Attachment>) -> Msg {
        Msg::Attachments {
            text: TITLE.to_string(),
            attachments,
        }
    }

    /// Prepends the header block to `sections`.
    pub fn with_blocks(sections: Vec<Block>) -> Msg {
        let mut blocks = Vec::with_capacity(sections.len() + 1);
        blocks.push(Block::header(TITLE));
        blocks.extend(sections);
        Msg::Blocks {
            text: TITLE.to_string(),
            blocks,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Msg::Attachments { text, .. } | Msg::Blocks { text, .. } => text,
        }
    }
}
