//! CLI route: single route table and run context.

use crate::cli::output::{format_config_validation, format_task_text};
use crate::cli::parse::{Commands, ConfigCommands, OutputFormat};
use crate::config::{ConfigLoader, SculptConfig};
use crate::error::{OrchestratorError, StorageError};
use crate::orchestrator::GenerationOrchestrator;
use crate::task::TaskView;
use crate::types::{GenerationParameters, TaskId};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Runtime context for CLI execution: workspace and the loaded configuration.
pub struct RunContext {
    workspace_root: PathBuf,
    config: SculptConfig,
}

impl RunContext {
    /// Create run context from workspace root and optional config path. Uses ConfigLoader only.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, OrchestratorError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        Ok(Self {
            workspace_root,
            config,
        })
    }

    pub fn config(&self) -> &SculptConfig {
        &self.config
    }

    /// Execute a CLI command via the single route table.
    pub async fn execute(&self, command: &Commands) -> Result<String, OrchestratorError> {
        match command {
            Commands::Generate {
                image,
                task_id,
                seed,
                ss_guidance,
                ss_steps,
                slat_guidance,
                slat_steps,
                wait_secs,
                format,
            } => {
                let mut parameters = GenerationParameters::default();
                if let Some(seed) = seed {
                    parameters.seed = *seed;
                }
                if let Some(value) = ss_guidance {
                    parameters.ss_guidance_strength = *value;
                }
                if let Some(value) = ss_steps {
                    parameters.ss_sampling_steps = *value;
                }
                if let Some(value) = slat_guidance {
                    parameters.slat_guidance_strength = *value;
                }
                if let Some(value) = slat_steps {
                    parameters.slat_sampling_steps = *value;
                }
                let task_id = match task_id {
                    Some(raw) => TaskId::parse(raw.as_str())?,
                    None => TaskId::generate(),
                };
                let view = self
                    .handle_generate(image, task_id, parameters, Duration::from_secs(*wait_secs))
                    .await?;
                render_task(&view, *format)
            }
            Commands::Config { command } => self.handle_config_command(command),
        }
    }

    async fn handle_generate(
        &self,
        image_path: &Path,
        task_id: TaskId,
        parameters: GenerationParameters,
        wait: Duration,
    ) -> Result<TaskView, OrchestratorError> {
        self.validate_config()?;
        let image_path = self.resolve(image_path);
        let image = tokio::fs::read(&image_path)
            .await
            .map_err(StorageError::IoError)?;

        let mut config = self.config.clone();
        config.storage = config.storage.resolved_against(&self.workspace_root);
        let orchestrator = GenerationOrchestrator::from_config(&config)?;

        info!(task_id = %task_id, image = %image_path.display(), "Starting generation");
        orchestrator.start(task_id.clone(), image, parameters).await?;
        let outcome = orchestrator.wait_for_terminal(&task_id, wait).await;
        orchestrator.shutdown().await;
        outcome
    }

    fn handle_config_command(&self, command: &ConfigCommands) -> Result<String, OrchestratorError> {
        match command {
            ConfigCommands::Show => toml::to_string_pretty(&self.config)
                .map_err(|e| OrchestratorError::Encode(e.to_string())),
            ConfigCommands::Validate => {
                self.validate_config()?;
                Ok("Configuration is valid".to_string())
            }
        }
    }

    fn validate_config(&self) -> Result<(), OrchestratorError> {
        self.config
            .validate()
            .map_err(|errors| OrchestratorError::ConfigError(format_config_validation(&errors)))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        }
    }
}

fn render_task(view: &TaskView, format: OutputFormat) -> Result<String, OrchestratorError> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(view)
            .map_err(|e| OrchestratorError::Encode(e.to_string())),
        OutputFormat::Text => Ok(format_task_text(view)),
    }
}
