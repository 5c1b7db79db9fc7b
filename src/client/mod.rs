//! Desktop client side: the exam-app API client and the console the
//! binary talks through.

pub mod console;
pub mod exam_api;

pub use exam_api::{ExamApiClient, LaunchCredentials};
