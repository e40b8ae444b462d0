pub mod clock;
pub mod controller;
pub mod state;

pub use clock::{Clock, SystemClock};
pub use controller::{SessionTracker, StartRequest, StopOptions, StopOutcome, TrackerSnapshot};
pub use state::{ActiveState, AutoStop, SessionMode, TrackerState, TrackerStatus};
