pub mod classification;
pub mod dataset;
pub mod deviation;
pub mod indicators;
pub mod levels;
pub mod pipeline;
pub mod similarity;
