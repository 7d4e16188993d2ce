pub mod config_dto;
pub mod makeflow_dto;
pub mod parameter_dto;
