pub mod category;
pub mod focus_session;
pub mod interval;

pub use category::AppCategory;
pub use focus_session::{FocusSession, SessionStatus};
pub use interval::{OpenInterval, UsageInterval};
