//! `SimpleBoard`: the reference rules-engine collaborator.
//!
//! Deliberately minimal: the actual Battleship rules engine is out of
//! scope, and this exists only so the match session (C4) has something
//! real to drive end to end.

use async_trait::async_trait;
use rand::Rng;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::core::error::BeerError;
use crate::core::traits::{Board, Coord, PlaceOutcome, ShotResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Orientation {
    Horizontal,
    Vertical,
}

struct Ship {
    name: String,
    cells: Vec<(usize, usize)>,
    hits: usize,
}

impl Ship {
    fn is_sunk(&self) -> bool {
        self.hits >= self.cells.len()
    }
}

#[derive(Clone, Copy)]
struct Cell {
    ship: Option<usize>,
    fired: bool,
}

/// A square-grid Battleship board with a fixed fleet.
pub struct SimpleBoard {
    size: usize,
    grid: Vec<Vec<Cell>>,
    ships: Vec<Ship>,
}

/// Default fleet: carrier(5), battleship(4), cruiser(3), submarine(3), destroyer(2).
const DEFAULT_FLEET: &[(&str, usize)] = &[
    ("carrier", 5),
    ("battleship", 4),
    ("cruiser", 3),
    ("submarine", 3),
    ("destroyer", 2),
];

impl SimpleBoard {
    /// A board of `size x size` with the standard five-ship fleet.
    pub fn new(size: usize) -> Self {
        Self::with_fleet(size, DEFAULT_FLEET.iter().map(|(n, l)| (n.to_string(), *l)).collect())
    }

    /// A board with a single ship spanning the shorter dimension
    /// (`--one-ship`).
    pub fn new_one_ship(size: usize) -> Self {
        Self::with_fleet(size, vec![("the-one".to_string(), size)])
    }

    fn with_fleet(size: usize, fleet: Vec<(String, usize)>) -> Self {
        let grid = vec![
            vec![
                Cell {
                    ship: None,
                    fired: false
                };
                size
            ];
            size
        ];
        let ships = fleet
            .into_iter()
            .map(|(name, len)| Ship {
                name,
                cells: Vec::with_capacity(len),
                hits: 0,
            })
            .collect();
        Self { size, grid, ships }
    }

    fn fits(&self, row: usize, col: usize, len: usize, orient: Orientation) -> Option<Vec<(usize, usize)>> {
        let mut cells = Vec::with_capacity(len);
        for i in 0..len {
            let (r, c) = match orient {
                Orientation::Horizontal => (row, col + i),
                Orientation::Vertical => (row + i, col),
            };
            if r >= self.size || c >= self.size || self.grid[r][c].ship.is_some() {
                return None;
            }
            cells.push((r, c));
        }
        Some(cells)
    }

    fn place(&mut self, ship_idx: usize, cells: Vec<(usize, usize)>) {
        for &(r, c) in &cells {
            self.grid[r][c].ship = Some(ship_idx);
        }
        self.ships[ship_idx].cells = cells;
    }
}

#[async_trait]
impl Board for SimpleBoard {
    fn place_ships_randomly(&mut self) {
        let lengths: Vec<usize> = (0..self.ships.len()).map(|i| self.pending_len(i)).collect();

        let mut rng = rand::thread_rng();
        for (idx, len) in lengths.into_iter().enumerate() {
            loop {
                let orient = if rng.gen_bool(0.5) {
                    Orientation::Horizontal
                } else {
                    Orientation::Vertical
                };
                let row = rng.gen_range(0..self.size);
                let col = rng.gen_range(0..self.size);
                if let Some(cells) = self.fits(row, col, len, orient) {
                    self.place(idx, cells);
                    break;
                }
            }
        }
    }

    async fn place_ships_manually(
        &mut self,
        reader: &mut (dyn AsyncBufRead + Send + Unpin),
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<PlaceOutcome, BeerError> {
        let lengths: Vec<usize> = (0..self.ships.len()).map(|i| self.pending_len(i)).collect();
        for (idx, len) in lengths.into_iter().enumerate() {
            let prompt = format!(
                "place {} (len {}): bow coordinate and orientation, e.g. \"A1 H\"\n",
                self.ships[idx].name, len
            );
            writer.write_all(prompt.as_bytes()).await?;
            writer.flush().await?;

            let mut line = String::new();
            let n = reader.read_line(&mut line).await?;
            if n == 0 {
                return Ok(PlaceOutcome::Error);
            }
            let mut parts = line.trim().split_whitespace();
            let coord_str = match parts.next() {
                Some(c) => c,
                None => return Ok(PlaceOutcome::Error),
            };
            let orient_str = parts.next().unwrap_or("H");
            let orient = match orient_str.to_ascii_uppercase().as_str() {
                "H" => Orientation::Horizontal,
                "V" => Orientation::Vertical,
                _ => return Ok(PlaceOutcome::Error),
            };
            let coord = match Coord::parse(coord_str, self.size) {
                Some(c) => c,
                None => return Ok(PlaceOutcome::Error),
            };
            match self.fits(coord.row, coord.col, len, orient) {
                Some(cells) => self.place(idx, cells),
                None => return Ok(PlaceOutcome::Error),
            }
        }
        Ok(PlaceOutcome::Ok)
    }

    fn fire_at(&mut self, coord: Coord) -> (ShotResult, Option<String>) {
        let cell = &mut self.grid[coord.row][coord.col];
        if cell.fired {
            return (ShotResult::AlreadyShot, None);
        }
        cell.fired = true;
        match cell.ship {
            None => (ShotResult::Miss, None),
            Some(idx) => {
                self.ships[idx].hits += 1;
                if self.ships[idx].is_sunk() {
                    (ShotResult::Sunk, Some(self.ships[idx].name.clone()))
                } else {
                    (ShotResult::Hit, None)
                }
            }
        }
    }

    fn all_ships_sunk(&self) -> bool {
        self.ships.iter().all(|s| s.is_sunk())
    }

    fn render_self(&self) -> Vec<String> {
        self.grid
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| match (cell.ship, cell.fired) {
                        (Some(_), true) => 'X',
                        (Some(_), false) => '#',
                        (None, true) => 'o',
                        (None, false) => '.',
                    })
                    .collect()
            })
            .collect()
    }

    fn render_opponent_view(&self) -> Vec<String> {
        self.grid
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| match (cell.ship, cell.fired) {
                        (Some(_), true) => 'X',
                        (None, true) => 'o',
                        (_, false) => '.',
                    })
                    .collect()
            })
            .collect()
    }
}

impl SimpleBoard {
    /// Length in cells of ship `idx`, valid before placement happens
    /// (after which `cells.len()` itself is authoritative).
    fn pending_len(&self, idx: usize) -> usize {
        if !self.ships[idx].cells.is_empty() {
            return self.ships[idx].cells.len();
        }
        self.fleet_length_by_name(&self.ships[idx].name)
    }

    fn fleet_length_by_name(&self, name: &str) -> usize {
        DEFAULT_FLEET
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, l)| *l)
            .unwrap_or(self.size) // the one-ship fleet spans the board
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, BufReader};

    #[test]
    fn random_placement_fills_entire_fleet() {
        let mut board = SimpleBoard::new(10);
        board.place_ships_randomly();
        let placed: usize = board.ships.iter().map(|s| s.cells.len()).sum();
        let expected: usize = DEFAULT_FLEET.iter().map(|(_, l)| l).sum();
        assert_eq!(placed, expected);
    }

    #[test]
    fn one_ship_mode_spans_board() {
        let mut board = SimpleBoard::new_one_ship(6);
        board.place_ships_randomly();
        assert_eq!(board.ships.len(), 1);
        assert_eq!(board.ships[0].cells.len(), 6);
    }

    #[test]
    fn fire_at_classifies_hit_miss_sunk_already_shot() {
        let mut board = SimpleBoard::new_one_ship(2);
        board.place(0, vec![(0, 0), (0, 1)]);
        board.ships[0].name = "the-one".into();

        let (r, _) = board.fire_at(Coord { row: 1, col: 1 });
        assert_eq!(r, ShotResult::Miss);

        let (r, _) = board.fire_at(Coord { row: 0, col: 0 });
        assert_eq!(r, ShotResult::Hit);

        let (r, sunk) = board.fire_at(Coord { row: 0, col: 1 });
        assert_eq!(r, ShotResult::Sunk);
        assert_eq!(sunk.as_deref(), Some("the-one"));

        let (r, _) = board.fire_at(Coord { row: 0, col: 0 });
        assert_eq!(r, ShotResult::AlreadyShot);

        assert!(board.all_ships_sunk());
    }

    #[test]
    fn opponent_view_hides_unhit_ships() {
        let mut board = SimpleBoard::new_one_ship(2);
        board.place(0, vec![(0, 0), (0, 1)]);
        board.fire_at(Coord { row: 0, col: 0 });

        let opp = board.render_opponent_view();
        assert_eq!(opp[0].chars().nth(0), Some('X'));
        assert_eq!(opp[0].chars().nth(1), Some('.'), "unhit ship cell must stay hidden");

        let own = board.render_self();
        assert_eq!(own[0].chars().nth(1), Some('#'), "owner sees the unhit ship cell");
    }

    #[tokio::test]
    async fn manual_placement_reads_bow_and_orientation() {
        let mut board = SimpleBoard::new_one_ship(4);
        let (mut client, server) = duplex(256);
        let (read_half, mut write_half) = tokio::io::split(server);
        let mut reader = BufReader::new(read_half);

        let placing = tokio::spawn(async move {
            board
                .place_ships_manually(&mut reader, &mut write_half)
                .await
                .map(|outcome| (outcome, board))
        });

        let mut prompt = [0u8; 256];
        let n = client.read(&mut prompt).await.unwrap();
        assert!(String::from_utf8_lossy(&prompt[..n]).contains("place"));

        client.write_all(b"A1 H\n").await.unwrap();

        let (outcome, board) = placing.await.unwrap().unwrap();
        assert_eq!(outcome, PlaceOutcome::Ok);
        assert_eq!(board.ships[0].cells.len(), 4);
    }
}
