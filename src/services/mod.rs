pub mod attempt_service;
pub mod authorization_service;
pub mod identity_service;
pub mod launch_session_service;
pub mod token_service;
