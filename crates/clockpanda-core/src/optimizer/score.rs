//! Hard/medium/soft scores. Constraints add penalties per band and
//! scores compare band by band, hard first.

use std::fmt;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// Band a constraint contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreLevel {
    Hard,
    Medium,
    Soft,
}

impl fmt::Display for ScoreLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScoreLevel::Hard => "hard",
            ScoreLevel::Medium => "medium",
            ScoreLevel::Soft => "soft",
        })
    }
}

/// Lexicographic hard/medium/soft score. Penalties are negative, so a larger
/// score is better and zero is perfect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HardMediumSoftScore {
    pub hard: i64,
    pub medium: i64,
    pub soft: i64,
}

impl HardMediumSoftScore {
    pub const ZERO: Self = Self {
        hard: 0,
        medium: 0,
        soft: 0,
    };

    pub fn of(hard: i64, medium: i64, soft: i64) -> Self {
        Self { hard, medium, soft }
    }

    /// A penalty of `amount` in `level`.
    pub fn penalty(level: ScoreLevel, amount: i64) -> Self {
        match level {
            ScoreLevel::Hard => Self::of(-amount, 0, 0),
            ScoreLevel::Medium => Self::of(0, -amount, 0),
            ScoreLevel::Soft => Self::of(0, 0, -amount),
        }
    }

    pub fn is_feasible(&self) -> bool {
        self.hard >= 0
    }
}

impl Add for HardMediumSoftScore {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::of(self.hard + rhs.hard, self.medium + rhs.medium, self.soft + rhs.soft)
    }
}

impl AddAssign for HardMediumSoftScore {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl fmt::Display for HardMediumSoftScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}hard/{}medium/{}soft", self.hard, self.medium, self.soft)
    }
}
