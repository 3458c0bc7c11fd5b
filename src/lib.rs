//! repairloop library crate
//!
//! Decision core of an iterative C program-repair loop: feedback
//! classification, the four-section repair-instruction contract, guarded
//! application of repairs, reward scoring and preference-pair mining.
//! Model inference is reached only through [`model::RepairModel`].

pub mod classify;
pub mod config;
pub mod error;
pub mod feedback;
pub mod guard;
pub mod layout;
pub mod logging;
pub mod mining;
pub mod model;
pub mod pipeline;
pub mod prompts;
pub mod protocol;
pub mod reward;
pub mod source;
pub mod util;
