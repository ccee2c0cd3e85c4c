//! Core value types shared across the orchestrator: task identifiers, generation
//! parameters, and artifact kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MAX_TASK_ID_LEN: usize = 128;

/// Caller-visible identifier of a generation task.
///
/// Task ids name files in the artifact directory, so they are restricted to
/// `[A-Za-z0-9_-]` and at most 128 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

impl TaskId {
    /// Parse and validate a caller-supplied id.
    pub fn parse(raw: impl Into<String>) -> Result<Self, InvalidTaskId> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(InvalidTaskId { id: raw, reason: "task id is empty" });
        }
        if raw.len() > MAX_TASK_ID_LEN {
            return Err(InvalidTaskId { id: raw, reason: "task id is longer than 128 characters" });
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(InvalidTaskId {
                id: raw,
                reason: "task id may only contain ASCII letters, digits, '-' and '_'",
            });
        }
        Ok(Self(raw))
    }

    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TaskId {
    type Err = InvalidTaskId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TaskId {
    type Error = InvalidTaskId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

/// Rejected task id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid task id {id:?}: {reason}")]
pub struct InvalidTaskId {
    pub id: String,
    pub reason: &'static str,
}

/// Numeric generation controls, fixed at task creation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_ss_guidance_strength")]
    pub ss_guidance_strength: f64,
    #[serde(default = "default_sampling_steps")]
    pub ss_sampling_steps: u32,
    #[serde(default = "default_slat_guidance_strength")]
    pub slat_guidance_strength: f64,
    #[serde(default = "default_sampling_steps")]
    pub slat_sampling_steps: u32,
}

fn default_seed() -> u64 {
    42
}

fn default_ss_guidance_strength() -> f64 {
    7.5
}

fn default_slat_guidance_strength() -> f64 {
    3.0
}

fn default_sampling_steps() -> u32 {
    12
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            ss_guidance_strength: default_ss_guidance_strength(),
            ss_sampling_steps: default_sampling_steps(),
            slat_guidance_strength: default_slat_guidance_strength(),
            slat_sampling_steps: default_sampling_steps(),
        }
    }
}

impl GenerationParameters {
    /// Reject values no backend can act on.
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("ss_guidance_strength", self.ss_guidance_strength),
            ("slat_guidance_strength", self.slat_guidance_strength),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{} must be a finite, non-negative number", name));
            }
        }
        if self.ss_sampling_steps == 0 {
            return Err("ss_sampling_steps must be at least 1".to_string());
        }
        if self.slat_sampling_steps == 0 {
            return Err("slat_sampling_steps must be at least 1".to_string());
        }
        Ok(())
    }
}

/// The three outputs of a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Binary 3D scene file.
    Scene,
    /// Point-cloud file.
    PointCloud,
    /// Preview animation.
    Preview,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [
        ArtifactKind::Scene,
        ArtifactKind::PointCloud,
        ArtifactKind::Preview,
    ];

    /// File extension used for the persisted artifact.
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Scene => "glb",
            ArtifactKind::PointCloud => "ply",
            ArtifactKind::Preview => "mp4",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Scene => "scene",
            ArtifactKind::PointCloud => "point_cloud",
            ArtifactKind::Preview => "preview",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scene" | "glb" => Ok(ArtifactKind::Scene),
            "point_cloud" | "ply" => Ok(ArtifactKind::PointCloud),
            "preview" | "mp4" => Ok(ArtifactKind::Preview),
            other => Err(format!("Unknown artifact kind: {}", other)),
        }
    }
}

/// One value per artifact kind. A set always holds all three.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSet<T> {
    pub scene: T,
    pub point_cloud: T,
    pub preview: T,
}

impl<T> ArtifactSet<T> {
    pub fn new(scene: T, point_cloud: T, preview: T) -> Self {
        Self {
            scene,
            point_cloud,
            preview,
        }
    }

    pub fn get(&self, kind: ArtifactKind) -> &T {
        match kind {
            ArtifactKind::Scene => &self.scene,
            ArtifactKind::PointCloud => &self.point_cloud,
            ArtifactKind::Preview => &self.preview,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ArtifactKind, &T)> {
        ArtifactKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }

    pub fn map<U>(self, mut f: impl FnMut(ArtifactKind, T) -> U) -> ArtifactSet<U> {
        ArtifactSet {
            scene: f(ArtifactKind::Scene, self.scene),
            point_cloud: f(ArtifactKind::PointCloud, self.point_cloud),
            preview: f(ArtifactKind::Preview, self.preview),
        }
    }

    /// Build a set from per-kind options; `None` if any kind is missing.
    pub fn from_options(scene: Option<T>, point_cloud: Option<T>, preview: Option<T>) -> Option<Self> {
        Some(Self::new(scene?, point_cloud?, preview?))
    }
}

/// Raw bytes produced by a backend, one payload per artifact kind.
pub type ArtifactPayloads = ArtifactSet<Vec<u8>>;

impl ArtifactPayloads {
    pub fn total_len(&self) -> usize {
        self.iter().map(|(_, bytes)| bytes.len()).sum()
    }
}
