//! Reference agents.
//!
//! `TabularAgent` keeps one running value estimate per discrete action and
//! acts epsilon-greedily. It exercises the full `Agent` contract
//! (training, hyper-parameters, reset, checkpoints, KPIs) without any
//! numeric library.

mod tabular;

pub use tabular::{TabularAgent, TabularAgentBuilder, CRITIC_ALPHA};
