pub mod account_dto;
pub mod exam_app_dto;
