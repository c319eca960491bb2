//! Generation Engine backends.
//!
//! The core talks to engines only through [`crate::GenerationEngine`] and
//! [`crate::EngineLoader`]. Backends shipped with the crate:
//!
//! - [`command`] - drives an external generator program over stdin/stdout

pub mod command;
