mod provider;
mod search;
mod session;
mod state;

pub use search::SearchHit;
pub use session::{override_for, DiffSession, SessionPhase, SessionRequest};
pub use state::{App, InputMode};
