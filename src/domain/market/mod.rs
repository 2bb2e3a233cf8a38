pub mod candle;
pub mod chart;
pub mod level;
pub mod matrix;
pub mod scale;

pub use candle::{Candle, CandleTime};
pub use chart::ChartKey;
pub use level::Level;
pub use matrix::Matrix;
