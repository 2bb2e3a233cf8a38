use crate::domain::market::candle::CandleTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A support or resistance price point with a recurrence strength.
///
/// A null level (strength 0) marks "no level assigned" and must never be
/// selected as an active support or resistance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub begin: CandleTime,
    pub price: f64,
    pub strength: u32,
}

impl Level {
    pub fn new(begin: CandleTime, price: f64) -> Self {
        Self {
            begin,
            price,
            strength: 1,
        }
    }

    pub fn null() -> Self {
        Self {
            begin: CandleTime::default(),
            price: 0.0,
            strength: 0,
        }
    }

    pub fn is_null(&self) -> bool {
        self.strength == 0
    }
}

impl Default for Level {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for Level {
    /// `year,month,day,price,strength` — the supports/resistances file row.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{:02},{:02},{:.6},{}",
            self.begin.year, self.begin.month, self.begin.day, self.price, self.strength
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_level_is_never_active() {
        assert!(Level::null().is_null());
        assert!(!Level::new(CandleTime::from_raw(20240102, 0), 250.0).is_null());
    }

    #[test]
    fn test_display_matches_file_row() {
        let level = Level {
            begin: CandleTime::from_raw(20240102, 0),
            price: 250.5,
            strength: 3,
        };
        assert_eq!(level.to_string(), "2024,01,02,250.500000,3");
    }
}
