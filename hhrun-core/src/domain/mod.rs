//! Core domain types
//!
//! These types are shared between the submission tooling (which writes job
//! specifications) and the runner (which executes them on a worker node).

pub mod job;
pub mod layout;
pub mod report;
pub mod site;
