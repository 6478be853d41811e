//! CLI command implementations.
//!
//! Each submodule implements a specific CLI command:
//! - [`policy`] - Policy file validation and resolution
//! - [`simulate`] - Real-time escalation of a single alert

pub mod policy;
pub mod simulate;

pub use policy::PolicyCommand;
pub use simulate::SimulateCommand;
