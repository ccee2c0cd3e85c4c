//! CLI domain: parse, route and output only.
//! No orchestration logic; the route table dispatches to the orchestrator.

mod output;
mod parse;
mod route;

pub use output::{format_config_validation, format_task_text, map_error};
pub use parse::{Cli, Commands, ConfigCommands, OutputFormat};
pub use route::RunContext;
