use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::exam::ExamInfo;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamInfoResponse {
    pub success: bool,
    pub error: Option<String>,
    pub exam: Option<ExamInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeRequest {
    #[validate(length(min = 1, max = 64, message = "Exam code is required"))]
    pub code: String,
    #[validate(length(min = 1, message = "Teacher password is required"))]
    pub teacher_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeResponse {
    pub success: bool,
    pub error: Option<String>,
    pub authorization_token: Option<String>,
    pub expires_at_utc: Option<DateTime<Utc>>,
    pub exam: Option<ExamInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    #[validate(length(min = 1, max = 128, message = "Authorization token is required"))]
    pub authorization_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub success: bool,
    pub error: Option<String>,
    pub attempt_id: Option<Uuid>,
    pub launch_token: Option<String>,
    pub expires_at_utc: Option<DateTime<Utc>>,
    pub is_programming_exam: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub attempt_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub success: bool,
    pub error: Option<String>,
}

/// Query parameters every proctored request carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchQuery {
    pub attempt_id: Uuid,
    pub launch_token: String,
    #[serde(default)]
    pub programming: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusResponse {
    pub success: bool,
    pub valid: bool,
    pub status: String,
    pub remaining_seconds: i64,
    pub violation_count: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ViolationReportRequest {
    #[validate(length(min = 1, max = 64))]
    pub kind: String,
    #[validate(length(max = 1024))]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationReportResponse {
    pub success: bool,
    pub violation_count: i32,
}
