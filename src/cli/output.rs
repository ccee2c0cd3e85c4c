//! CLI output: error mapping and text rendering.

use crate::config::ValidationError;
use crate::error::OrchestratorError;
use crate::task::TaskView;
use std::fmt::Write;

/// Map orchestrator errors to a string for CLI output.
pub fn map_error(e: &OrchestratorError) -> String {
    match e {
        OrchestratorError::WaitTimeout(id) => format!(
            "Task {} is still running; raise --wait-secs to wait longer",
            id
        ),
        other => other.to_string(),
    }
}

pub fn format_task_text(view: &TaskView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Task:    {}", view.id);
    let _ = writeln!(out, "Status:  {} ({})", view.status, view.message);
    let _ = writeln!(out, "Created: {}", view.timestamps.created.to_rfc3339());
    if let Some(completed) = view.timestamps.completed {
        let _ = writeln!(out, "Ended:   {}", completed.to_rfc3339());
    }
    if let Some(artifacts) = &view.artifacts {
        let _ = writeln!(out, "Artifacts:");
        for (kind, locator) in artifacts.iter() {
            let _ = writeln!(out, "  {:<12} {}", kind, locator);
        }
    }
    if let Some(error) = &view.error {
        let _ = writeln!(out, "Error:   {} [{}]", error.message, error.code);
    }
    out.trim_end().to_string()
}

pub fn format_config_validation(errors: &[ValidationError]) -> String {
    let mut out = format!("Configuration has {} problem(s):", errors.len());
    for error in errors {
        let _ = write!(out, "\n  - {}", error);
    }
    out
}
