//! The rules-engine collaborator interface.
//!
//! The match session (C4) drives a match purely through this trait. The
//! concrete Battleship rules engine (board representation, ship
//! placement, shot resolution) is an external collaborator; [`crate::board`]
//! provides one concrete, intentionally simple implementation so the crate
//! is runnable end to end.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncWrite};

use crate::core::error::BeerError;

/// Result of a single shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotResult {
    /// The shot hit an un-hit ship cell.
    Hit,
    /// The shot hit an empty cell.
    Miss,
    /// The shot sank the last cell of a ship.
    Sunk,
    /// That coordinate was already fired upon.
    AlreadyShot,
}

impl ShotResult {
    /// The wire name used in `shot` / `oppgrid` messages.
    pub fn as_wire_str(self) -> &'static str {
        match self {
            ShotResult::Hit => "HIT",
            ShotResult::Miss => "MISS",
            ShotResult::Sunk => "SUNK",
            ShotResult::AlreadyShot => "ALREADY_SHOT",
        }
    }
}

/// Outcome of an interactive placement phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceOutcome {
    /// All ships placed successfully.
    Ok,
    /// The per-ship timeout elapsed before placement completed.
    Timeout,
    /// The transport died mid-placement.
    Error,
}

/// A zero-based board coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coord {
    /// Zero-based row.
    pub row: usize,
    /// Zero-based column.
    pub col: usize,
}

impl Coord {
    /// Parse a coordinate string matching `^[A-J](10|[1-9])$` (case-insensitive).
    pub fn parse(s: &str, board_size: usize) -> Option<Coord> {
        let s = s.trim();
        if s.is_empty() || board_size == 0 || board_size > 26 {
            return None;
        }
        let mut chars = s.chars();
        let letter = chars.next()?.to_ascii_uppercase();
        if !letter.is_ascii_uppercase() {
            return None;
        }
        let row = (letter as u8 - b'A') as usize;
        if row >= board_size {
            return None;
        }
        let rest: String = chars.collect();
        let col: usize = rest.parse().ok()?;
        if col == 0 || col > board_size {
            return None;
        }
        Some(Coord {
            row,
            col: col - 1,
        })
    }

    /// Render back to wire form, e.g. `row=4,col=4` → `"E5"`.
    pub fn to_wire(self) -> String {
        let letter = (b'A' + self.row as u8) as char;
        format!("{letter}{}", self.col + 1)
    }
}

/// Narrow interface the session (C4) uses to drive one player's board.
///
/// Coordinates are always zero-based; parsing the wire grammar is the
/// caller's job (see [`Coord::parse`]).
#[async_trait]
pub trait Board: Send + Sync {
    /// Place the fleet at uniformly random, non-overlapping positions.
    fn place_ships_randomly(&mut self);

    /// Interactively collect ship placements from the player over the
    /// given reader/writer, honoring whatever per-ship timeout the caller
    /// has already wrapped the call in.
    async fn place_ships_manually(
        &mut self,
        reader: &mut (dyn AsyncBufRead + Send + Unpin),
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<PlaceOutcome, BeerError>;

    /// Resolve a shot at `coord`, returning the result and, if the shot
    /// sank a ship, that ship's name.
    fn fire_at(&mut self, coord: Coord) -> (ShotResult, Option<String>);

    /// Whether every ship on this board has been sunk.
    fn all_ships_sunk(&self) -> bool;

    /// Render this board as seen by its owner (ships visible).
    fn render_self(&self) -> Vec<String>;

    /// Render this board as seen by the opponent (ships hidden).
    fn render_opponent_view(&self) -> Vec<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_coordinates_case_insensitively() {
        assert_eq!(Coord::parse("e5", 10), Some(Coord { row: 4, col: 4 }));
        assert_eq!(Coord::parse("A1", 10), Some(Coord { row: 0, col: 0 }));
        assert_eq!(Coord::parse("J10", 10), Some(Coord { row: 9, col: 9 }));
    }

    #[test]
    fn rejects_out_of_grammar_coordinates() {
        assert_eq!(Coord::parse("K1", 10), None);
        assert_eq!(Coord::parse("A11", 10), None);
        assert_eq!(Coord::parse("A0", 10), None);
        assert_eq!(Coord::parse("", 10), None);
    }

    #[test]
    fn to_wire_round_trips_through_parse() {
        let coord = Coord { row: 4, col: 4 };
        assert_eq!(coord.to_wire(), "E5");
        assert_eq!(Coord::parse(&coord.to_wire(), 10), Some(coord));
    }
}
