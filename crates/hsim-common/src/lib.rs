//! ---
//! hsim_section: "01-core-functionality"
//! hsim_subsection: "module"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "Shared primitives for the hsim harness."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Shared building blocks used by every hsim crate: the tracing bootstrap and
//! the identifier sanitizers that keep simulation ids and build keys safe to
//! use as file names and process arguments.

pub mod ident;
pub mod logging;

pub use ident::{sanitize_token, SimulationId};
pub use logging::{init_tracing, LogFormat, LoggingConfig};
