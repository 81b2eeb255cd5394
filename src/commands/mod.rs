pub mod config;
pub mod rollback;
pub mod run;
