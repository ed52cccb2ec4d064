use glam;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum BoardError {
    #[error("board needs at least 2x2 squares, got {squares_x}x{squares_y}")]
    TooFewSquares { squares_x: usize, squares_y: usize },
    #[error("marker length {marker_length} must be positive and shorter than square length {square_length}")]
    InvalidMarkerLength {
        square_length: f32,
        marker_length: f32,
    },
    #[error("board uses {needed} markers but {dictionary:?} only has {available}")]
    DictionaryTooSmall {
        dictionary: MarkerDictionary,
        needed: usize,
        available: usize,
    },
}

/// 4x4 ArUco dictionaries. Smaller dictionaries are prefixes of the larger ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerDictionary {
    #[serde(rename = "DICT_4X4_50")]
    Dict4x4_50,
    #[serde(rename = "DICT_4X4_100")]
    Dict4x4_100,
    #[serde(rename = "DICT_4X4_250")]
    Dict4x4_250,
    #[serde(rename = "DICT_4X4_1000")]
    Dict4x4_1000,
}

impl MarkerDictionary {
    pub fn marker_count(&self) -> usize {
        match self {
            MarkerDictionary::Dict4x4_50 => 50,
            MarkerDictionary::Dict4x4_100 => 100,
            MarkerDictionary::Dict4x4_250 => 250,
            MarkerDictionary::Dict4x4_1000 => 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub squares_x: usize,
    pub squares_y: usize,
    pub square_length: f32,
    pub marker_length: f32,
    pub dictionary: MarkerDictionary,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            squares_x: 8,
            squares_y: 5,
            square_length: 0.36,
            marker_length: 0.27,
            dictionary: MarkerDictionary::Dict4x4_250,
        }
    }
}

impl BoardConfig {
    /// Markers sit on every other square.
    pub fn marker_count(&self) -> usize {
        self.squares_x * self.squares_y / 2
    }

    pub fn validate(&self) -> Result<(), BoardError> {
        if self.squares_x < 2 || self.squares_y < 2 {
            return Err(BoardError::TooFewSquares {
                squares_x: self.squares_x,
                squares_y: self.squares_y,
            });
        }
        if !(self.marker_length > 0.0 && self.marker_length < self.square_length) {
            return Err(BoardError::InvalidMarkerLength {
                square_length: self.square_length,
                marker_length: self.marker_length,
            });
        }
        let needed = self.marker_count();
        let available = self.dictionary.marker_count();
        if needed > available {
            return Err(BoardError::DictionaryTooSmall {
                dictionary: self.dictionary,
                needed,
                available,
            });
        }
        Ok(())
    }
}

/// ChArUco board: chessboard inner corners keyed by their ChArUco id.
pub struct Board {
    pub config: BoardConfig,
    pub id_to_3d: BTreeMap<u32, glam::Vec3>,
}

impl Board {
    pub fn from_config(board_config: &BoardConfig) -> Result<Board, BoardError> {
        board_config.validate()?;
        Ok(Self::init_charuco(board_config.clone()))
    }

    /// Inner corner `(row, col)` gets id `row * (squares_x - 1) + col` and
    /// sits at `((col + 1) * square, (row + 1) * square, 0)`.
    fn init_charuco(config: BoardConfig) -> Board {
        let corner_cols = config.squares_x - 1;
        let corner_rows = config.squares_y - 1;
        let mut id_to_3d = BTreeMap::new();
        for r in 0..corner_rows {
            for c in 0..corner_cols {
                let id = (r * corner_cols + c) as u32;
                id_to_3d.insert(
                    id,
                    glam::Vec3 {
                        x: (c + 1) as f32 * config.square_length,
                        y: (r + 1) as f32 * config.square_length,
                        z: 0.0,
                    },
                );
            }
        }
        Board { config, id_to_3d }
    }

    pub fn corner_count(&self) -> usize {
        self.id_to_3d.len()
    }
}

pub fn create_default_8x5_board() -> Board {
    Board::init_charuco(BoardConfig::default())
}
