use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, Position};
use thiserror::Error;

use super::shape::MoveShape;

#[derive(Debug, Error)]
pub enum RulesError {
    #[error("invalid FEN '{fen}': {reason}")]
    InvalidFen { fen: String, reason: String },
    #[error("invalid move '{mov}': {reason}")]
    InvalidMove { mov: String, reason: String },
    #[error("move '{mov}' is illegal in position {fen}")]
    IllegalMove { mov: String, fen: String },
    #[error("move '{mov}' lacks an origin square")]
    NoOrigin { mov: String },
}

/// Canonical, clock-independent identifier for a chess position.
///
/// Two move sequences reaching the same position (a transposition) produce
/// equal fingerprints; the halfmove clock and fullmove number are reset so
/// they never split identity.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Side to move encoded in the fingerprint.
    pub fn side_to_move(&self) -> Color {
        match self.0.split_whitespace().nth(1) {
            Some("b") => Color::Black,
            _ => Color::White,
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonicalize an arbitrary FEN, validating it describes a legal position.
pub fn canonical_fen(fen: &str) -> Result<Fingerprint, RulesError> {
    Ok(Board::from_fen(fen)?.fingerprint())
}

fn reset_move_counters(fen: &str) -> String {
    let mut parts: Vec<&str> = fen.split_whitespace().collect();
    if parts.len() == 6 {
        parts[4] = "0";
        parts[5] = "1";
        return parts.join(" ");
    }
    fen.to_string()
}

/// A legal move within the position it was resolved against, carrying both
/// its UCI and SAN renderings.
#[derive(Clone, Debug)]
pub struct PlayedMove {
    mv: Move,
    uci: String,
    san: String,
}

impl PlayedMove {
    pub fn uci(&self) -> &str {
        &self.uci
    }

    pub fn san(&self) -> &str {
        &self.san
    }

    pub fn shape(&self) -> Result<MoveShape, RulesError> {
        let from = self.mv.from().ok_or_else(|| RulesError::NoOrigin {
            mov: self.uci.clone(),
        })?;
        Ok(MoveShape {
            role: self.mv.role(),
            from,
            to: self.mv.to(),
        })
    }
}

/// A chess position wrapping the rules engine.
#[derive(Clone, Debug)]
pub struct Board {
    inner: Chess,
}

impl Board {
    pub fn initial() -> Self {
        Self {
            inner: Chess::default(),
        }
    }

    pub fn from_fen(fen: &str) -> Result<Self, RulesError> {
        let parsed = Fen::from_str(fen).map_err(|err| RulesError::InvalidFen {
            fen: fen.to_string(),
            reason: err.to_string(),
        })?;
        let inner: Chess =
            parsed
                .into_position(CastlingMode::Standard)
                .map_err(|err| RulesError::InvalidFen {
                    fen: fen.to_string(),
                    reason: err.to_string(),
                })?;
        Ok(Self { inner })
    }

    pub fn from_fingerprint(fingerprint: &Fingerprint) -> Result<Self, RulesError> {
        Self::from_fen(fingerprint.as_str())
    }

    pub fn turn(&self) -> Color {
        self.inner.turn()
    }

    pub fn fullmove_number(&self) -> u32 {
        self.inner.fullmoves().get()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        let fen = Fen::from_position(self.inner.clone(), EnPassantMode::Legal).to_string();
        Fingerprint(reset_move_counters(&fen))
    }

    pub fn legal_moves(&self) -> Vec<PlayedMove> {
        self.inner
            .legal_moves()
            .iter()
            .map(|mv| self.describe(mv.clone()))
            .collect()
    }

    pub fn parse_uci(&self, uci: &str) -> Result<PlayedMove, RulesError> {
        let parsed = UciMove::from_str(uci).map_err(|err| RulesError::InvalidMove {
            mov: uci.to_string(),
            reason: err.to_string(),
        })?;
        let mv = parsed
            .to_move(&self.inner)
            .map_err(|_| RulesError::IllegalMove {
                mov: uci.to_string(),
                fen: self.fingerprint().to_string(),
            })?;
        Ok(self.describe(mv))
    }

    pub fn parse_san(&self, san: &str) -> Result<PlayedMove, RulesError> {
        let parsed = SanPlus::from_str(san).map_err(|err| RulesError::InvalidMove {
            mov: san.to_string(),
            reason: err.to_string(),
        })?;
        let mv = parsed
            .san
            .to_move(&self.inner)
            .map_err(|_| RulesError::IllegalMove {
                mov: san.to_string(),
                fen: self.fingerprint().to_string(),
            })?;
        Ok(self.describe(mv))
    }

    pub fn play(&self, mv: &PlayedMove) -> Board {
        let mut inner = self.inner.clone();
        inner.play_unchecked(&mv.mv);
        Board { inner }
    }

    fn describe(&self, mv: Move) -> PlayedMove {
        let uci = mv.to_uci(CastlingMode::Standard).to_string();
        let san = SanPlus::from_move(self.inner.clone(), &mv).to_string();
        PlayedMove { mv, uci, san }
    }
}
