pub mod config;
pub mod localization;
pub mod retry;
