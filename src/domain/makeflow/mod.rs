pub mod from_stages;
pub mod jx_makeflow;
