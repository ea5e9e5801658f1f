//! Dynamic application forms and the applicant review pipeline.
//!
//! Operators define per-activity form schemas, applicants submit answers validated against
//! them, and reviewers move applicants through staged review to a terminal decision.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
