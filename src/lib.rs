pub mod client;
pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod lockdown;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;

use crate::config::Config;
use crate::database::SharedStore;
use crate::middleware::rate_limit::KeyedRateLimiter;
use crate::services::{
    attempt_service::AttemptService, authorization_service::AuthorizationService,
    identity_service::IdentityService, launch_session_service::LaunchSessionService,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: SharedStore,
    pub identity_service: IdentityService,
    pub authorization_service: AuthorizationService,
    pub attempt_service: AttemptService,
    pub launch_session_service: LaunchSessionService,
    pub authorize_limiter: KeyedRateLimiter,
}

impl AppState {
    pub fn new(store: SharedStore, config: Config) -> Self {
        let policy = config.policy.clone();

        let identity_service = IdentityService::new(store.clone(), policy.clone());
        let authorization_service =
            AuthorizationService::new(store.clone(), identity_service.clone(), policy.clone());
        let attempt_service = AttemptService::new(store.clone());
        let launch_session_service =
            LaunchSessionService::new(store.clone(), attempt_service.clone(), policy);
        let authorize_limiter = KeyedRateLimiter::per_minute(config.authorize_attempts_per_minute);

        Self {
            config: Arc::new(config),
            store,
            identity_service,
            authorization_service,
            attempt_service,
            launch_session_service,
            authorize_limiter,
        }
    }
}
