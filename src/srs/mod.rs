pub mod review;
pub mod scheduler;

pub use review::{apply_review_answer, build_review_session, ReviewItem, ReviewKind, ReviewSession};
pub use scheduler::{next_review, ScheduleResult};
