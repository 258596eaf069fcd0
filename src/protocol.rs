//! Application-level JSON message shapes carried inside `GAME`/`CHAT`
//! frames.

use serde::{Deserialize, Serialize};

/// A `GAME`-frame payload, distinguished by its `type` tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GameMessage {
    /// Sent to the active slot at the start of its turn.
    Prompt,
    /// The result of a resolved shot.
    Shot {
        /// Coordinate fired at, in wire form (e.g. `"E5"`).
        coord: String,
        /// `"HIT"`, `"MISS"`, `"SUNK"`, or `"ALREADY_SHOT"`.
        result: String,
        /// Name of the ship sunk, if `result` was `"SUNK"`.
        #[serde(skip_serializing_if = "Option::is_none")]
        sunk: Option<String>,
    },
    /// A recipient's own board.
    Grid {
        /// Row strings, top to bottom.
        rows: Vec<String>,
    },
    /// A recipient's view of the opponent's board.
    Oppgrid {
        /// Row strings, top to bottom.
        rows: Vec<String>,
    },
    /// Free-form informational text.
    Info {
        /// Message text.
        text: String,
    },
    /// A local protocol/command error.
    Err {
        /// Machine-readable error code, e.g. `"bad_command"` or `"duplicate_token"`.
        code: String,
        /// Human-readable text.
        text: String,
    },
    /// Match termination.
    End {
        /// `"A_win"`, `"B_win"`, or `"abandoned"`.
        outcome: String,
        /// Why the match ended, when not a plain win (e.g. `"timeout"`,
        /// `"concession"`).
        #[serde(skip_serializing_if = "Option::is_none")]
        cause: Option<String>,
    },
}

impl GameMessage {
    /// Build an `err` message for `code`.
    pub fn err(code: &str, text: impl Into<String>) -> Self {
        GameMessage::Err {
            code: code.to_string(),
            text: text.into(),
        }
    }
}

/// A `CHAT`-frame payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub struct ChatMessage {
    /// Discriminant kept for wire compatibility with other `type`-tagged
    /// payloads; always `"chat"`.
    #[serde(rename = "type")]
    pub kind: ChatKind,
    /// Display name of the sender.
    pub name: String,
    /// Message text.
    pub msg: String,
}

/// The single valid value of [`ChatMessage::kind`], kept as its own type
/// so serialization always emits the literal string `"chat"`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    /// Chat message marker.
    Chat,
}

impl ChatMessage {
    /// Build a chat message from `name` and `msg`.
    pub fn new(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            kind: ChatKind::Chat,
            name: name.into(),
            msg: msg.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_message_tags_round_trip() {
        let msg = GameMessage::Shot {
            coord: "E5".into(),
            result: "HIT".into(),
            sunk: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"shot\""));
        let back: GameMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, GameMessage::Shot { .. }));
    }

    #[test]
    fn chat_message_serializes_type_field() {
        let chat = ChatMessage::new("alice", "hi");
        let json = serde_json::to_string(&chat).unwrap();
        assert!(json.contains("\"type\":\"chat\""));
        assert!(json.contains("\"name\":\"alice\""));
    }

    #[test]
    fn err_message_has_code_and_text() {
        let msg = GameMessage::err("duplicate_token", "token already bound");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"code\":\"duplicate_token\""));
    }
}
