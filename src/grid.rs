//! Editable cell grids and their text form.
//!
//! A [`Grid`] is the decoded 2D form of one map component: row-major u16
//! cell codes. Dimensioned components carry their width and height as a
//! u16 pair at the front of the binary payload; the minimap is headerless
//! and fixed-size. The text form is the on-disk editable source of truth:
//! a hex dimension header (when dimensioned), then one line per row of
//! zero-padded hex cells, every cell followed by a single space.

use std::fmt::Write as _;
use std::io::Cursor;

use crate::binary_utils::{read_u16_le, read_u8};
use crate::error::GridTextError;

/// Upper bound on either grid dimension; headers past this are treated as
/// corrupt rather than allocated.
const MAX_DIM: usize = 0x1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<u16>,
}

impl Grid {
    /// A zero-filled grid.
    pub fn new(width: usize, height: usize) -> Self {
        Grid {
            width,
            height,
            cells: vec![0; width * height],
        }
    }

    pub fn from_cells(width: usize, height: usize, cells: Vec<u16>) -> Self {
        assert_eq!(cells.len(), width * height, "cell count mismatch");
        Grid {
            width,
            height,
            cells,
        }
    }

    pub fn empty() -> Self {
        Grid::new(0, 0)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn cells(&self) -> &[u16] {
        &self.cells
    }

    pub fn get(&self, x: usize, y: usize) -> u16 {
        self.cells[y * self.width + x]
    }

    pub fn set(&mut self, x: usize, y: usize, value: u16) {
        self.cells[y * self.width + x] = value;
    }

    /// Decode a dimensioned payload: u16 width, u16 height, then cells.
    ///
    /// Extraction has to survive whatever a truncated decompression left
    /// behind, so this never fails: short payloads zero-fill their missing
    /// cells and a corrupt or absent header yields the empty grid.
    pub fn from_payload(payload: &[u8]) -> Self {
        let mut cursor = Cursor::new(payload);

        let (width, height) = match (read_u16_le(&mut cursor), read_u16_le(&mut cursor)) {
            (Ok(w), Ok(h)) => (w as usize, h as usize),
            _ => return Grid::empty(),
        };
        if width > MAX_DIM || height > MAX_DIM {
            return Grid::empty();
        }

        let mut cells = Vec::with_capacity(width * height);
        while cells.len() < width * height {
            match read_u16_le(&mut cursor) {
                Ok(v) => cells.push(v),
                Err(_) => break,
            }
        }
        cells.resize(width * height, 0);

        Grid {
            width,
            height,
            cells,
        }
    }

    /// Encode the dimensioned payload; the empty grid encodes to nothing.
    pub fn to_payload(&self) -> Vec<u8> {
        if self.is_empty() {
            return Vec::new();
        }

        let mut out = Vec::with_capacity(4 + self.cells.len() * 2);
        out.extend_from_slice(&(self.width as u16).to_le_bytes());
        out.extend_from_slice(&(self.height as u16).to_le_bytes());
        for &cell in &self.cells {
            out.extend_from_slice(&cell.to_le_bytes());
        }
        out
    }

    /// Decode a headerless fixed-size payload of one-byte cells, short
    /// payloads zero-filled.
    pub fn from_fixed_payload(width: usize, height: usize, payload: &[u8]) -> Self {
        let mut cursor = Cursor::new(payload);
        let mut cells = Vec::with_capacity(width * height);
        while cells.len() < width * height {
            match read_u8(&mut cursor) {
                Ok(v) => cells.push(v as u16),
                Err(_) => break,
            }
        }
        cells.resize(width * height, 0);

        Grid {
            width,
            height,
            cells,
        }
    }

    /// Encode one-byte cells, no header. Values are masked to 8 bits.
    pub fn to_fixed_payload(&self) -> Vec<u8> {
        self.cells.iter().map(|&c| (c & 0xFF) as u8).collect()
    }

    /// Format the grid as editable text: an optional `"{w:x} {h:x}"` header
    /// line, then one line per row of hex cells zero-padded to `pad`
    /// columns, each followed by a trailing space.
    pub fn to_text(&self, pad: usize, with_header: bool) -> String {
        let mut out = String::new();
        if with_header {
            let _ = writeln!(out, "{:x} {:x}", self.width, self.height);
        }
        for y in 0..self.height {
            for x in 0..self.width {
                let _ = write!(out, "{:0pad$x} ", self.get(x, y), pad = pad);
            }
            out.push('\n');
        }
        out
    }

    /// Parse the text form back into a grid; the exact inverse of
    /// [`Grid::to_text`] for every legal cell value. `fixed_dims` supplies
    /// the dimensions of headerless component kinds.
    ///
    /// Extra whitespace and blank lines are tolerated; missing rows, short
    /// rows and non-hex tokens are errors, never defaulted.
    pub fn parse_text(
        text: &str,
        fixed_dims: Option<(usize, usize)>,
    ) -> Result<Self, GridTextError> {
        let mut lines = text
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty());

        let (width, height) = match fixed_dims {
            Some(dims) => dims,
            None => {
                let (_, header) = lines.next().ok_or(GridTextError::MissingHeader)?;
                parse_header(header)?
            }
        };

        let mut cells = Vec::with_capacity(width * height);
        for row in 0..height {
            let (line_idx, line) = lines.next().ok_or(GridTextError::MissingRows {
                expected: height,
                found: row,
            })?;
            let line_no = line_idx + 1;

            let mut found = 0;
            for token in line.split_whitespace() {
                let value =
                    u32::from_str_radix(token, 16).map_err(|_| GridTextError::BadToken {
                        line: line_no,
                        token: token.to_string(),
                    })?;
                if value > u16::MAX as u32 {
                    return Err(GridTextError::CellRange {
                        line: line_no,
                        value,
                    });
                }
                cells.push(value as u16);
                found += 1;
            }

            if found != width {
                return Err(GridTextError::ShortRow {
                    line: line_no,
                    expected: width,
                    found,
                });
            }
        }

        Ok(Grid {
            width,
            height,
            cells,
        })
    }
}

fn parse_header(line: &str) -> Result<(usize, usize), GridTextError> {
    let bad = || GridTextError::BadHeader(line.trim().to_string());

    let mut tokens = line.split_whitespace();
    let width = tokens
        .next()
        .and_then(|t| usize::from_str_radix(t, 16).ok())
        .ok_or_else(bad)?;
    let height = tokens
        .next()
        .and_then(|t| usize::from_str_radix(t, 16).ok())
        .ok_or_else(bad)?;
    if tokens.next().is_some() || width > MAX_DIM || height > MAX_DIM {
        return Err(bad());
    }
    Ok((width, height))
}
