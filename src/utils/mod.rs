pub mod logging;
pub mod time;

pub use logging::init_logging;
pub use time::{format_clock, seconds_between};
