use std::time::Duration;

use reqwest::{redirect::Policy, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;
use uuid::Uuid;
use validator::Validate;

use crate::config::ClientConfig;
use crate::dto::account_dto::LoginForm;
use crate::dto::exam_app_dto::{
    AuthorizeRequest, AuthorizeResponse, ExamInfoResponse, LaunchQuery, SessionStatusResponse,
    StartRequest, StartResponse, SubmitRequest, SubmitResponse, ViolationReportRequest,
    ViolationReportResponse,
};
use crate::error::{Error, Result};
use crate::lockdown::Violation;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// What a proctored request must carry, as returned by start.
#[derive(Clone)]
pub struct LaunchCredentials {
    pub attempt_id: Uuid,
    pub launch_token: String,
    pub programming: bool,
}

impl LaunchCredentials {
    pub fn from_start(response: &StartResponse) -> Option<Self> {
        if !response.success {
            return None;
        }
        Some(Self {
            attempt_id: response.attempt_id?,
            launch_token: response.launch_token.clone()?,
            programming: response.is_programming_exam,
        })
    }

    fn query(&self) -> LaunchQuery {
        LaunchQuery {
            attempt_id: self.attempt_id,
            launch_token: self.launch_token.clone(),
            programming: self.programming,
        }
    }
}

impl std::fmt::Debug for LaunchCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchCredentials")
            .field("attempt_id", &self.attempt_id)
            .field("launch_token", &"<redacted>")
            .field("programming", &self.programming)
            .finish()
    }
}

/// Cookie-session client. Redirects are not followed: a login succeeds
/// exactly when the server answers with one.
#[derive(Clone)]
pub struct ExamApiClient {
    client: Client,
    base_url: Url,
}

impl ExamApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Self::with_base_url(config.server_url.clone(), config.http_timeout)
    }

    pub fn with_base_url(mut base_url: Url, timeout: Duration) -> Result<Self> {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = Client::builder()
            .cookie_store(true)
            .redirect(Policy::none())
            .timeout(timeout)
            .build()?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("Invalid endpoint {}: {}", path, e)))
    }

    pub async fn login(&self, email: &str, password: &str, remember: bool) -> Result<()> {
        let form = LoginForm {
            email: email.trim().to_string(),
            password: password.to_string(),
            remember_me: remember.then(|| "true".to_string()),
        };
        form.validate()?;

        let response = self
            .client
            .post(self.endpoint("Account/ProcessLogin")?)
            .form(&form)
            .send()
            .await?;

        if response.status().is_redirection() {
            tracing::info!(email = %form.email, "signed in");
            Ok(())
        } else {
            tracing::warn!(status = %response.status(), "sign-in rejected");
            Err(Error::Unauthorized("Invalid email or password.".to_string()))
        }
    }

    pub async fn logout(&self) -> Result<()> {
        self.client
            .post(self.endpoint("Account/Logout")?)
            .send()
            .await?;
        Ok(())
    }

    pub async fn get_exam(&self, code: &str) -> Result<ExamInfoResponse> {
        let code = code.trim();
        if code.is_empty() {
            return Err(Error::BadRequest("Exam code is required".to_string()));
        }
        let mut url = self.endpoint("api/exam-app/code")?;
        url.path_segments_mut()
            .map_err(|_| Error::Config("Server URL cannot carry a path".to_string()))?
            .push(code);

        let response = self.client.get(url).send().await?;
        read_json(response).await
    }

    pub async fn authorize(&self, code: &str, teacher_password: &str) -> Result<AuthorizeResponse> {
        let request = AuthorizeRequest {
            code: code.trim().to_string(),
            teacher_password: teacher_password.to_string(),
        };
        request.validate()?;

        let response = self
            .client
            .post(self.endpoint("api/exam-app/authorize")?)
            .json(&request)
            .send()
            .await?;
        read_json(response).await
    }

    pub async fn start(&self, authorization_token: &str) -> Result<StartResponse> {
        let request = StartRequest {
            authorization_token: authorization_token.trim().to_string(),
        };
        request.validate()?;

        let response = self
            .client
            .post(self.endpoint("api/exam-app/start")?)
            .json(&request)
            .send()
            .await?;
        read_json(response).await
    }

    pub async fn submit(&self, attempt_id: Uuid) -> Result<SubmitResponse> {
        let response = self
            .client
            .post(self.endpoint("api/exam-app/submit")?)
            .json(&SubmitRequest { attempt_id })
            .send()
            .await?;
        read_json(response).await
    }

    pub async fn session_status(&self, launch: &LaunchCredentials) -> Result<SessionStatusResponse> {
        let response = self
            .client
            .get(self.endpoint("api/exam-app/session")?)
            .query(&launch.query())
            .send()
            .await?;
        read_json(response).await
    }

    pub async fn report_violation(
        &self,
        launch: &LaunchCredentials,
        violation: &Violation,
    ) -> Result<ViolationReportResponse> {
        let request = ViolationReportRequest {
            kind: violation.kind.as_str().to_string(),
            detail: Some(violation.detail.chars().take(1024).collect()),
        };
        request.validate()?;

        let response = self
            .client
            .post(self.endpoint("api/exam-app/violations")?)
            .query(&launch.query())
            .json(&request)
            .send()
            .await?;
        read_json(response).await
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }

    let message = response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| body.error)
        .unwrap_or_else(|| status.to_string());

    Err(match status {
        StatusCode::BAD_REQUEST => Error::BadRequest(message),
        StatusCode::UNAUTHORIZED => Error::Unauthorized(message),
        StatusCode::FORBIDDEN => Error::Forbidden(message),
        StatusCode::NOT_FOUND => Error::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => Error::TooManyRequests,
        other => Error::Internal(format!("{}: {}", other, message)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[test]
    fn base_url_gains_trailing_slash_so_paths_nest() {
        let client = assert_ok!(ExamApiClient::with_base_url(
            Url::parse("http://exams.local/portal").unwrap(),
            Duration::from_secs(5),
        ));
        assert_eq!(
            assert_ok!(client.endpoint("api/exam-app/start")).as_str(),
            "http://exams.local/portal/api/exam-app/start"
        );
    }

    #[test]
    fn credentials_come_only_from_successful_start() {
        let mut response = StartResponse {
            success: true,
            error: None,
            attempt_id: Some(Uuid::new_v4()),
            launch_token: Some("tok".to_string()),
            expires_at_utc: None,
            is_programming_exam: true,
        };
        let creds = LaunchCredentials::from_start(&response).unwrap();
        assert!(creds.programming);
        assert!(!format!("{:?}", creds).contains("tok"));

        response.success = false;
        assert!(LaunchCredentials::from_start(&response).is_none());
    }
}
