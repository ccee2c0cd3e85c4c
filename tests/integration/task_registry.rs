//! Concurrent access to the task registry.

use sculpt::artifact::{ArtifactLocator, InputRef};
use sculpt::error::RegistryError;
use sculpt::registry::TaskRegistry;
use sculpt::task::{TaskFailure, TaskMutation, TaskStatus};
use sculpt::types::{ArtifactSet, GenerationParameters, TaskId};
use std::sync::Arc;
use std::thread;

fn id(i: usize) -> TaskId {
    TaskId::parse(format!("task-{}", i)).unwrap()
}

fn locators(task: &TaskId) -> ArtifactSet<ArtifactLocator> {
    ArtifactSet::new(
        ArtifactLocator::new(format!("{}.glb", task)),
        ArtifactLocator::new(format!("{}.ply", task)),
        ArtifactLocator::new(format!("{}.mp4", task)),
    )
}

#[test]
fn test_parallel_lifecycles_do_not_interfere() {
    let registry = Arc::new(TaskRegistry::new());
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let task = id(i);
                registry
                    .create(
                        task.clone(),
                        GenerationParameters::default(),
                        InputRef::new(format!("{}_input.png", task)),
                    )
                    .unwrap();
                registry.update(&task, TaskMutation::Dispatch).unwrap();
                if i % 2 == 0 {
                    registry
                        .update(&task, TaskMutation::Complete(locators(&task)))
                        .unwrap();
                } else {
                    registry
                        .update(
                            &task,
                            TaskMutation::Fail(TaskFailure::new("boom", "pipeline_error")),
                        )
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(registry.len(), 16);
    assert_eq!(registry.count_by_status(TaskStatus::Completed), 8);
    assert_eq!(registry.count_by_status(TaskStatus::Failed), 8);
    for task in registry.list() {
        match task.status() {
            TaskStatus::Completed => {
                assert!(task.artifacts().is_some());
                assert!(task.error().is_none());
            }
            TaskStatus::Failed => {
                assert!(task.artifacts().is_none());
                assert!(task.error().is_some());
            }
            other => panic!("unexpected status {}", other),
        }
    }
}

#[test]
fn test_concurrent_create_has_one_winner() {
    let registry = Arc::new(TaskRegistry::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                registry
                    .create(
                        id(0),
                        GenerationParameters::default(),
                        InputRef::new("task-0_input.png"),
                    )
                    .is_ok()
            })
        })
        .collect();
    let winners = handles
        .into_iter()
        .filter_map(|h| h.join().ok())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_terminal_tasks_reject_further_updates() {
    let registry = TaskRegistry::new();
    let task = id(1);
    registry
        .create(
            task.clone(),
            GenerationParameters::default(),
            InputRef::new("task-1_input.png"),
        )
        .unwrap();
    registry.update(&task, TaskMutation::Cancel).unwrap();

    let err = registry.update(&task, TaskMutation::Dispatch).unwrap_err();
    assert!(matches!(
        err,
        RegistryError::InvalidTransition {
            from: TaskStatus::Cancelled,
            to: TaskStatus::Processing,
            ..
        }
    ));
    assert_eq!(registry.get(&task).unwrap().status(), TaskStatus::Cancelled);
}
