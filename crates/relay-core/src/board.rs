//! Canonical board rendering
//!
//! Every engine prints its board differently. Adapters parse the native
//! output into a [`Board`] and render it with [`Board::render`], so callers
//! always see the same grid:
//!
//! ```text
//!    +---+---+---+---+---+---+---+---+
//! 8  |<R>|<N>|<B>|<Q>|<K>|<B>|<N>|<R>|
//!    +---+---+---+---+---+---+---+---+
//! ...
//!    +---+---+---+---+---+---+---+---+
//! 1  |-R-|-N-|-B-|-Q-|-K-|-B-|-N-|-R-|
//!    +---+---+---+---+---+---+---+---+
//!      a   b   c   d   e   f   g   h
//! ```

use crate::session::Side;

const ROW_SEPARATOR: &str = "   +---+---+---+---+---+---+---+---+";
const FILE_LABELS: &str = "     a   b   c   d   e   f   g   h  ";

/// A piece on the board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Piece {
    pub side: Side,
    /// Uppercase piece letter, one of `RNBQKP`
    pub kind: char,
}

impl Piece {
    /// Parse a FEN-style letter: uppercase is white, lowercase is black
    pub fn from_letter(letter: char) -> Option<Self> {
        let kind = letter.to_ascii_uppercase();
        if !"RNBQKP".contains(kind) {
            return None;
        }
        let side = if letter.is_ascii_uppercase() {
            Side::White
        } else {
            Side::Black
        };
        Some(Self { side, kind })
    }

    fn cell(self) -> String {
        match self.side {
            Side::White => format!("-{}-", self.kind),
            Side::Black => format!("<{}>", self.kind),
        }
    }
}

fn parse_cell(cell: &str) -> Option<Option<Piece>> {
    let bytes = cell.as_bytes();
    if bytes.len() != 3 {
        return None;
    }
    let side = match (bytes[0], bytes[2]) {
        (b'<', b'>') => Side::Black,
        (b'-', b'-') => Side::White,
        _ if cell.trim().is_empty() || cell == " . " => return Some(None),
        _ => return None,
    };
    let kind = bytes[1] as char;
    "RNBQKP".contains(kind).then_some(Some(Piece { side, kind }))
}

/// 8x8 position, row 0 is rank 8 and column 0 is file a
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Board {
    squares: [[Option<Piece>; 8]; 8],
}

impl Board {
    /// Empty board
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard starting position
    pub fn starting() -> Self {
        let rows = [
            "rnbqkbnr", "pppppppp", "........", "........", "........", "........", "PPPPPPPP",
            "RNBQKBNR",
        ];
        // Literal rows are always well formed.
        Self::from_compact_rows(&rows).unwrap_or_default()
    }

    /// Parse eight rows of `.`/piece letters, rank 8 first. Whitespace
    /// between squares is ignored, as printed by `show board` style output.
    pub fn from_compact_rows<S: AsRef<str>>(rows: &[S]) -> Option<Self> {
        if rows.len() != 8 {
            return None;
        }
        let mut board = Self::new();
        for (row, line) in rows.iter().enumerate() {
            let squares: Vec<char> = line
                .as_ref()
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            if squares.len() != 8 {
                return None;
            }
            for (file, square) in squares.into_iter().enumerate() {
                match square {
                    '.' => {}
                    letter => board.place(row, file, Some(Piece::from_letter(letter)?)),
                }
            }
        }
        Some(board)
    }

    /// Parse rank lines of the canonical grid (`8  |<R>|<N>|...`), in any
    /// order. Separators and labels must already be filtered out.
    pub fn from_grid_rows<S: AsRef<str>>(rows: &[S]) -> Option<Self> {
        if rows.len() != 8 {
            return None;
        }
        let mut board = Self::new();
        for line in rows {
            let (label, cells) = line.as_ref().split_once('|')?;
            let rank: usize = label.trim().parse().ok()?;
            if !(1..=8).contains(&rank) {
                return None;
            }
            let cells: Vec<&str> = cells.split('|').take(8).collect();
            if cells.len() != 8 {
                return None;
            }
            for (file, cell) in cells.into_iter().enumerate() {
                board.place(8 - rank, file, parse_cell(cell)?);
            }
        }
        Some(board)
    }

    /// Put or clear a piece; out of range coordinates are ignored
    pub fn place(&mut self, row: usize, file: usize, piece: Option<Piece>) {
        if let Some(square) = self.squares.get_mut(row).and_then(|r| r.get_mut(file)) {
            *square = piece;
        }
    }

    pub fn piece_at(&self, row: usize, file: usize) -> Option<Piece> {
        self.squares.get(row).and_then(|r| r.get(file)).copied().flatten()
    }

    /// Render the canonical grid
    pub fn render(&self) -> String {
        let mut lines = vec![ROW_SEPARATOR.to_string()];
        for (row, squares) in self.squares.iter().enumerate() {
            let rank = 8 - row;
            let mut line = format!("{}  |", rank);
            for (file, square) in squares.iter().enumerate() {
                let cell = match square {
                    Some(piece) => piece.cell(),
                    None if (file + rank) % 2 == 1 => " . ".to_string(),
                    None => "   ".to_string(),
                };
                line.push_str(&cell);
                line.push('|');
            }
            lines.push(line);
            lines.push(ROW_SEPARATOR.to_string());
        }
        lines.push(FILE_LABELS.to_string());
        lines.join("\n")
    }
}
