//! Inbound player commands (the "Dynamic command dispatch").
//!
//! Commands are parsed once at the edge, from whichever frame the reader
//! loop just pulled off the wire, and dispatched by tag inside the
//! session loop.

use serde::Deserialize;

use crate::core::error::BeerError;
use crate::core::traits::Coord;
use crate::frame::{Frame, FrameType};
use crate::net::Transport;
use crate::protocol::ChatMessage;

/// One parsed inbound command.
#[derive(Debug, Clone)]
pub enum Command {
    /// Free-form chat text, forwarded verbatim.
    Chat(ChatMessage),
    /// A shot at a parsed board coordinate.
    Fire(Coord),
    /// Concede the match.
    Quit,
}

/// The `GAME`-frame shape a player sends to fire or quit. Distinct from
/// [`crate::protocol::GameMessage`], which is server-to-client only.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum InboundGame {
    Fire { coord: String },
    Quit,
}

impl Command {
    /// Parse `frame` into a [`Command`], honoring `board_size` for
    /// coordinate grammar (`^[A-J](10|[1-9])$`).
    ///
    /// Fails with [`BeerError::Command`] (wire code `bad_command`) on
    /// anything out of grammar; the caller is expected to answer that
    /// locally rather than let it escalate.
    pub fn parse(frame: &Frame, board_size: usize) -> Result<Command, BeerError> {
        match frame.frame_type {
            FrameType::Chat => {
                let chat: ChatMessage = Transport::parse_payload(frame)?;
                Ok(Command::Chat(chat))
            }
            FrameType::Game => {
                let inbound: InboundGame = Transport::parse_payload(frame)
                    .map_err(|_| BeerError::Command("bad_command".to_string()))?;
                match inbound {
                    InboundGame::Quit => Ok(Command::Quit),
                    InboundGame::Fire { coord } => Coord::parse(&coord, board_size)
                        .map(Command::Fire)
                        .ok_or_else(|| BeerError::Command("bad_command".to_string())),
                }
            }
            FrameType::Ack | FrameType::Nak => {
                // Handled transparently by `Transport::recv_application_frame`;
                // should never reach command parsing.
                Err(BeerError::Command("bad_command".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame;

    fn game_frame(json: &str) -> Frame {
        let bytes = frame::pack(FrameType::Game, 1, json.as_bytes(), None).unwrap();
        frame::unpack(&bytes, None).unwrap()
    }

    fn chat_frame(json: &str) -> Frame {
        let bytes = frame::pack(FrameType::Chat, 1, json.as_bytes(), None).unwrap();
        frame::unpack(&bytes, None).unwrap()
    }

    #[test]
    fn parses_fire_with_valid_coordinate() {
        let frame = game_frame(r#"{"type":"fire","coord":"E5"}"#);
        let cmd = Command::parse(&frame, 10).unwrap();
        assert!(matches!(cmd, Command::Fire(Coord { row: 4, col: 4 })));
    }

    #[test]
    fn rejects_fire_with_out_of_grammar_coordinate() {
        let frame = game_frame(r#"{"type":"fire","coord":"Z99"}"#);
        assert!(matches!(
            Command::parse(&frame, 10).unwrap_err(),
            BeerError::Command(code) if code == "bad_command"
        ));
    }

    #[test]
    fn parses_quit() {
        let frame = game_frame(r#"{"type":"quit"}"#);
        assert!(matches!(Command::parse(&frame, 10).unwrap(), Command::Quit));
    }

    #[test]
    fn parses_chat_from_chat_frame() {
        let frame = chat_frame(r#"{"type":"chat","name":"alice","msg":"gl hf"}"#);
        let cmd = Command::parse(&frame, 10).unwrap();
        match cmd {
            Command::Chat(chat) => {
                assert_eq!(chat.name, "alice");
                assert_eq!(chat.msg, "gl hf");
            }
            _ => panic!("expected chat"),
        }
    }

    #[test]
    fn rejects_malformed_game_payload() {
        let frame = game_frame(r#"{"type":"nonsense"}"#);
        assert!(Command::parse(&frame, 10).is_err());
    }
}
