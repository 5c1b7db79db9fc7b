use serde::{Deserialize, Serialize};
use validator::Validate;

/// Form body of `POST /Account/ProcessLogin`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginForm {
    #[validate(length(min = 1, max = 320))]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
    #[serde(default)]
    pub remember_me: Option<String>,
}

impl LoginForm {
    pub fn remember(&self) -> bool {
        matches!(
            self.remember_me.as_deref().map(str::trim),
            Some("true") | Some("on") | Some("1")
        )
    }
}
