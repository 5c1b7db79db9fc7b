pub mod attempt;
pub mod authorization;
pub mod exam;
pub mod launch_session;
pub mod user;
