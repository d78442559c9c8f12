//! Request middleware.

pub mod deadline;

pub use deadline::{enforce_deadlines, DeadlineBody, DeadlineElapsed, Deadlines, Expiry};
