//! Integration tests for the Sculpt generation orchestrator

mod artifact_store;
mod fallback;
mod orchestrator;
mod task_registry;
mod test_utils;
