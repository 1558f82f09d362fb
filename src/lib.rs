// src/lib.rs
//! Policy gate for terraform plans.
//!
//! Reads a plan (JSON export, or a binary plan rendered through the
//! toolchain) and denies it when it schedules create, update or delete
//! actions that were not explicitly allowed.

pub mod error;
pub mod gate;
pub mod materializer;
pub mod policy;
pub mod protocol;
pub mod runtime;
pub mod source;
pub mod toolchain;

pub use error::{GateError, Result};
pub use gate::Gate;
pub use policy::{Decision, PermissionPolicy};
