use crate::domain::errors::EngineError;
use crate::domain::market::level::Level;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Calendar timestamp of one candle.
///
/// Equality is field-wise; ordering goes through the calendar-correct epoch
/// conversion so that e.g. month boundaries compare correctly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandleTime {
    pub year: u32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl CandleTime {
    /// Builds a timestamp from the raw `YYYYMMDD` and `HHMMSS` integers of a
    /// candle file row.
    pub fn from_raw(raw_date: u32, raw_time: u32) -> Self {
        Self {
            year: raw_date / 100 / 100,
            month: raw_date / 100 % 100,
            day: raw_date % 100,
            hour: raw_time / 100 / 100,
            minute: raw_time / 100 % 100,
            second: raw_time % 100,
        }
    }

    /// Seconds since the Unix epoch, or `None` for calendar-invalid fields.
    pub fn epoch_seconds(&self) -> Option<i64> {
        let date = NaiveDate::from_ymd_opt(self.year as i32, self.month, self.day)?;
        let time = date.and_hms_opt(self.hour, self.minute, self.second)?;
        Some(time.and_utc().timestamp())
    }

    pub fn epoch_or_min(&self) -> i64 {
        self.epoch_seconds().unwrap_or(i64::MIN)
    }

    /// Trading-day index, Monday = 0 .. Friday = 4. Weekends yield `None`.
    pub fn weekday_index(&self) -> Option<u32> {
        let date = NaiveDate::from_ymd_opt(self.year as i32, self.month, self.day)?;
        let index = date.weekday().num_days_from_monday();
        (index < 5).then_some(index)
    }

    pub fn same_date(&self, other: &CandleTime) -> bool {
        self.year == other.year && self.month == other.month && self.day == other.day
    }

    pub fn raw_date(&self) -> u32 {
        self.year * 10_000 + self.month * 100 + self.day
    }

    pub fn raw_time(&self) -> u32 {
        self.hour * 10_000 + self.minute * 100 + self.second
    }
}

impl Ord for CandleTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch_or_min().cmp(&other.epoch_or_min())
    }
}

impl PartialOrd for CandleTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CandleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}.{:02}.{:02}", self.year, self.month, self.day)
    }
}

/// One OHLCV bar plus every derived field filled in by the pipeline stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub time: CandleTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,

    // Filled by the deviation stage.
    pub price_deviation: f64,
    pub price_deviation_open: f64,
    pub price_deviation_max: f64,
    pub price_deviation_min: f64,
    pub volume_deviation: f64,

    // Filled by the tagging stage.
    pub regression_tags: Vec<f64>,
    pub classification_tag: String,
    pub movement_tag: i32,
    pub support: Level,
    pub resistance: Level,

    pub indicators: Vec<f64>,
    pub oscillators: Vec<f64>,
}

impl Candle {
    pub fn new(time: CandleTime, open: f64, high: f64, low: f64, close: f64, volume: u64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume,
            price_deviation: 0.0,
            price_deviation_open: 0.0,
            price_deviation_max: 0.0,
            price_deviation_min: 0.0,
            volume_deviation: 0.0,
            regression_tags: Vec::new(),
            classification_tag: String::new(),
            movement_tag: 0,
            support: Level::null(),
            resistance: Level::null(),
            indicators: Vec::new(),
            oscillators: Vec::new(),
        }
    }

    /// Parses one candle-file row: `YYYYMMDD,HHMMSS,open,high,low,close,volume`.
    pub fn parse_line(line: &str) -> Result<Self, EngineError> {
        let parse_err = |reason: &str| EngineError::Parse {
            line: line.to_string(),
            reason: reason.to_string(),
        };

        let fields: Vec<&str> = line.trim().split(',').map(str::trim).collect();
        if fields.len() != 7 {
            return Err(parse_err("expected 7 comma-separated fields"));
        }

        let raw_date: u32 = fields[0].parse().map_err(|_| parse_err("bad date field"))?;
        let raw_time: u32 = fields[1].parse().map_err(|_| parse_err("bad time field"))?;

        let time = CandleTime::from_raw(raw_date, raw_time);
        if time.epoch_seconds().is_none() {
            return Err(parse_err("calendar-invalid date or time"));
        }

        let open: f64 = fields[2].parse().map_err(|_| parse_err("bad open field"))?;
        let high: f64 = fields[3].parse().map_err(|_| parse_err("bad high field"))?;
        let low: f64 = fields[4].parse().map_err(|_| parse_err("bad low field"))?;
        let close: f64 = fields[5].parse().map_err(|_| parse_err("bad close field"))?;
        let volume: u64 = fields[6]
            .parse()
            .map_err(|_| parse_err("bad volume field"))?;

        Ok(Candle::new(time, open, high, low, close, volume))
    }

    /// Serializes the raw OHLCV fields back into the candle-file grammar.
    pub fn serialize_line(&self) -> String {
        format!(
            "{:08},{:06},{},{},{},{},{}",
            self.time.raw_date(),
            self.time.raw_time(),
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume
        )
    }
}
