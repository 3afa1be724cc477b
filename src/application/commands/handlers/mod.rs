//! Command Handlers 实现

mod run_job_handler;
mod synthesis_handlers;

pub use run_job_handler::*;
pub use synthesis_handlers::*;
