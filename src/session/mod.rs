//! Session hosting: serialized coordinator access and the acting loop.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rust_online_trainer::session::{InteractionLoop, LoopConfig, Session};
//!
//! let session = Session::new(agent, config)?;
//! let stats = InteractionLoop::new(&session, env, LoopConfig::new().with_max_steps(10_000)).run()?;
//! let report = session.shutdown_and_drain();
//! ```

pub mod driver;
pub mod host;

pub use driver::{Environment, InteractionLoop, LoopConfig, LoopStats, StopReason};
pub use host::{Session, SessionBuilder, ShutdownReport};
