//! Herald: a bulk outbound-message dispatcher
//!
//! Takes a list of recipients and a message template, and delivers
//! personalized messages through a rotating pool of sender identities,
//! each subject to a daily quota, surfacing live progress and surviving
//! restarts without losing state or re-sending completed work.

pub mod controller;

pub use controller::Herald;
