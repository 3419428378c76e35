//! Market data sources that feed the engine queue

pub mod replay;

pub use replay::{parse_line, ReplayFeed, ReplayRecord};
