pub mod session;

pub use session::{ActiveSession, NewSession, SessionUpdate, SourceType, StudySession};
