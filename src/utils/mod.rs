pub mod time;

// Re-export time utilities
pub use time::{current_time, format_duration, format_timestamp, time_until};
