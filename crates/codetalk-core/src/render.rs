//! Diagram rendering capability.
//!
//! The renderer is opaque to the rest of the crate: description text in,
//! SVG markup out. The shipped implementation shells out to mermaid-cli.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::RenderError;
use crate::viewer::RENDER_FALLBACK_SVG;

#[async_trait]
pub trait DiagramRenderer: Send + Sync {
    /// Render diagram source into SVG markup
    async fn render(&self, source: &str) -> Result<String, RenderError>;
}

/// Renders through the `mmdc` command line tool
#[derive(Debug, Clone)]
pub struct MmdcRenderer {
    program: PathBuf,
}

impl MmdcRenderer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl DiagramRenderer for MmdcRenderer {
    async fn render(&self, source: &str) -> Result<String, RenderError> {
        let workdir = tempfile::tempdir()?;
        let input = workdir.path().join("diagram.mmd");
        let output = workdir.path().join("diagram.svg");
        tokio::fs::write(&input, source).await?;

        debug!(program = %self.program.display(), "rendering diagram");
        let result = Command::new(&self.program)
            .arg("-i")
            .arg(&input)
            .arg("-o")
            .arg(&output)
            .output()
            .await
            .map_err(|source| RenderError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        if !result.status.success() {
            return Err(RenderError::Failed {
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        let svg = tokio::fs::read_to_string(&output).await?;
        if svg.trim().is_empty() {
            return Err(RenderError::EmptyOutput);
        }
        Ok(svg)
    }
}

/// Render, substituting the fallback image on failure
pub async fn render_or_fallback(renderer: &dyn DiagramRenderer, source: &str) -> String {
    match renderer.render(source).await {
        Ok(svg) => svg,
        Err(err) => {
            warn!(%err, "diagram rendering failed");
            RENDER_FALLBACK_SVG.to_string()
        }
    }
}
