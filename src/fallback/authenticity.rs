//! Authenticity policy: decides whether a backend result is real generated
//! content or a placeholder.
//!
//! A result is authentic when the backend declared it so and, unless the
//! heuristic is disabled, every payload is larger than its per-kind minimum and
//! none carries a known placeholder signature.

use crate::backend::BackendResult;
use crate::types::ArtifactKind;
use serde::{Deserialize, Serialize};

/// Signatures are only searched for in this many leading bytes of a payload.
const SIGNATURE_WINDOW: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticityConfig {
    /// When false only the backend's own `authentic` flag is consulted.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_min_mesh_bytes")]
    pub min_scene_bytes: usize,

    #[serde(default = "default_min_mesh_bytes")]
    pub min_point_cloud_bytes: usize,

    #[serde(default)]
    pub min_preview_bytes: usize,

    /// Case-insensitive markers of placeholder content.
    #[serde(default = "default_placeholder_signatures")]
    pub placeholder_signatures: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_min_mesh_bytes() -> usize {
    1000
}

fn default_placeholder_signatures() -> Vec<String> {
    vec!["mock".to_string()]
}

impl Default for AuthenticityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_scene_bytes: default_min_mesh_bytes(),
            min_point_cloud_bytes: default_min_mesh_bytes(),
            min_preview_bytes: 0,
            placeholder_signatures: default_placeholder_signatures(),
        }
    }
}

impl AuthenticityConfig {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(empty) = self
            .placeholder_signatures
            .iter()
            .position(|s| s.trim().is_empty())
        {
            return Err(format!("placeholder_signatures[{}] is empty", empty));
        }
        if let Some(long) = self
            .placeholder_signatures
            .iter()
            .find(|s| s.len() > SIGNATURE_WINDOW)
        {
            return Err(format!(
                "placeholder signature longer than {} bytes: {:?}",
                SIGNATURE_WINDOW, long
            ));
        }
        Ok(())
    }

    fn min_bytes(&self, kind: ArtifactKind) -> usize {
        match kind {
            ArtifactKind::Scene => self.min_scene_bytes,
            ArtifactKind::PointCloud => self.min_point_cloud_bytes,
            ArtifactKind::Preview => self.min_preview_bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Authentic,
    NotAuthentic(String),
}

impl Verdict {
    pub fn is_authentic(&self) -> bool {
        matches!(self, Verdict::Authentic)
    }
}

#[derive(Debug, Clone)]
pub struct AuthenticityPolicy {
    config: AuthenticityConfig,
    signatures: Vec<Vec<u8>>,
}

impl AuthenticityPolicy {
    pub fn new(config: AuthenticityConfig) -> Self {
        let signatures = config
            .placeholder_signatures
            .iter()
            .map(|s| s.to_ascii_lowercase().into_bytes())
            .filter(|s| !s.is_empty())
            .collect();
        Self { config, signatures }
    }

    /// Policy that trusts the backend's `authentic` flag alone.
    pub fn trust_backend() -> Self {
        Self::new(AuthenticityConfig {
            enabled: false,
            ..AuthenticityConfig::default()
        })
    }

    pub fn config(&self) -> &AuthenticityConfig {
        &self.config
    }

    pub fn evaluate(&self, result: &BackendResult) -> Verdict {
        let artifacts = match result.artifacts() {
            Some(artifacts) if result.is_success() => artifacts,
            _ => return Verdict::NotAuthentic("result carries no artifacts".to_string()),
        };
        if !result.authentic() {
            return Verdict::NotAuthentic(format!(
                "backend {} flagged its output as placeholder",
                result.backend()
            ));
        }
        if !self.config.enabled {
            return Verdict::Authentic;
        }

        for (kind, bytes) in artifacts.iter() {
            let min = self.config.min_bytes(kind);
            if bytes.len() <= min {
                return Verdict::NotAuthentic(format!(
                    "{} payload is {} bytes, must exceed {}",
                    kind,
                    bytes.len(),
                    min
                ));
            }
            if let Some(signature) = self.matching_signature(bytes) {
                return Verdict::NotAuthentic(format!(
                    "{} payload matches placeholder signature {:?}",
                    kind,
                    String::from_utf8_lossy(signature)
                ));
            }
        }
        Verdict::Authentic
    }

    fn matching_signature(&self, bytes: &[u8]) -> Option<&[u8]> {
        let head = bytes[..bytes.len().min(SIGNATURE_WINDOW)].to_ascii_lowercase();
        self.signatures
            .iter()
            .find(|signature| head.windows(signature.len()).any(|w| w == signature.as_slice()))
            .map(Vec::as_slice)
    }
}

impl Default for AuthenticityPolicy {
    fn default() -> Self {
        Self::new(AuthenticityConfig::default())
    }
}
