use std::cmp::Ordering;

use crate::models::{Observation, EMOJI_DOWN, EMOJI_FLAT, EMOJI_UP};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl Trend {
    fn from_delta(delta: i64) -> Self {
        match delta.cmp(&0) {
            Ordering::Greater => Trend::Up,
            Ordering::Less => Trend::Down,
            Ordering::Equal => Trend::Flat,
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            Trend::Up => EMOJI_UP,
            Trend::Down => EMOJI_DOWN,
            Trend::Flat => EMOJI_FLAT,
        }
    }
}

/// Comparison of a link's two most recent observations.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkDiff {
    Comparison {
        previous: i64,
        current: i64,
        delta: i64,
        percent: f64,
        trend: Trend,
    },
    /// Only one observation exists so far.
    InsufficientData { latest: i64 },
}

/// Diffs a newest-first slice of observations. `None` when there is no
/// history at all.
pub fn diff(history: &[Observation]) -> Option<LinkDiff> {
    match history {
        [] => None,
        [latest] => Some(LinkDiff::InsufficientData {
            latest: latest.value.amount(),
        }),
        [latest, previous, ..] => {
            let current = latest.value.amount();
            let previous = previous.value.amount();
            let delta = current - previous;
            let percent = if previous == 0 {
                0.0
            } else {
                delta as f64 / previous as f64 * 100.0
            };

            Some(LinkDiff::Comparison {
                previous,
                current,
                delta,
                percent,
                trend: Trend::from_delta(delta),
            })
        }
    }
}
