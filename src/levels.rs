use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Progression tier derived from a user's stoic points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoicLevel {
    Principiante,
    BasicoIntermedio,
    Intermedio,
    IntermedioAvanzado,
    Avanzado,
}

/// Ascending (threshold, tier) table. Thresholds are strictly increasing.
pub static LEVEL_THRESHOLDS: &[(i64, StoicLevel)] = &[
    (0, StoicLevel::Principiante),
    (20, StoicLevel::BasicoIntermedio),
    (50, StoicLevel::Intermedio),
    (100, StoicLevel::IntermedioAvanzado),
    (200, StoicLevel::Avanzado),
];

impl StoicLevel {
    pub const ALL: [StoicLevel; 5] = [
        StoicLevel::Principiante,
        StoicLevel::BasicoIntermedio,
        StoicLevel::Intermedio,
        StoicLevel::IntermedioAvanzado,
        StoicLevel::Avanzado,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Principiante => "principiante",
            Self::BasicoIntermedio => "basico_intermedio",
            Self::Intermedio => "intermedio",
            Self::IntermedioAvanzado => "intermedio_avanzado",
            Self::Avanzado => "avanzado",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Principiante => "Principiante",
            Self::BasicoIntermedio => "Básico Intermedio",
            Self::Intermedio => "Intermedio",
            Self::IntermedioAvanzado => "Intermedio Avanzado",
            Self::Avanzado => "Avanzado",
        }
    }

    pub fn threshold(self) -> i64 {
        LEVEL_THRESHOLDS
            .iter()
            .find(|(_, level)| *level == self)
            .map(|(t, _)| *t)
            .unwrap_or(0)
    }
}

impl fmt::Display for StoicLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLevel(pub String);

impl fmt::Display for UnknownLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown stoic level `{}`", self.0)
    }
}

impl std::error::Error for UnknownLevel {}

impl FromStr for StoicLevel {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StoicLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| UnknownLevel(s.to_string()))
    }
}

impl TryFrom<String> for StoicLevel {
    type Error = UnknownLevel;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextLevel {
    pub next_level: StoicLevel,
    pub next_level_label: &'static str,
    pub points_needed: i64,
    pub current_points: i64,
    pub threshold: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressInfo {
    pub current_level: StoicLevel,
    pub current_level_label: &'static str,
    pub current_points: i64,
    pub next_level: Option<NextLevel>,
}

/// Highest tier whose threshold is <= `points`. Negative input is treated as zero.
pub fn calculate_level(points: i64) -> StoicLevel {
    LEVEL_THRESHOLDS
        .iter()
        .rev()
        .find(|(threshold, _)| points >= *threshold)
        .map(|(_, level)| *level)
        .unwrap_or(StoicLevel::Principiante)
}

/// `None` once the top tier is reached.
pub fn points_for_next_level(points: i64) -> Option<NextLevel> {
    let current = calculate_level(points).threshold();
    LEVEL_THRESHOLDS
        .iter()
        .find(|(threshold, _)| *threshold > current)
        .map(|&(threshold, level)| NextLevel {
            next_level: level,
            next_level_label: level.label(),
            points_needed: (threshold - points).max(0),
            current_points: points,
            threshold,
        })
}

pub fn progress_info(points: i64) -> ProgressInfo {
    let level = calculate_level(points);
    ProgressInfo {
        current_level: level,
        current_level_label: level.label(),
        current_points: points,
        next_level: points_for_next_level(points),
    }
}
