//! Time-off approval workflow.
//!
//! Decisions are computed as pure [`Transition`] values from the request, the
//! requester's place in the hierarchy and the acting member. Handlers persist
//! a transition and its notifications in a single transaction.

pub mod member;
pub mod time_off;

pub use member::Member;
pub use time_off::{Decision, Stage, Transition, WorkflowError, cancel, decide};
