pub mod auth;
pub mod launch_gate;
pub mod rate_limit;
