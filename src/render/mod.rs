//! # Document generator collaborator.
//!
//! [`DocumentRenderer::render`] produces a file at `output_path` from a template
//! reference and the data to personalise it with. Page layout is the renderer's
//! business; the pipeline only cares whether the file was produced.
//!
//! [`ManualRenderer`] is the built-in renderer: it writes the personalised cover
//! text (reader name and "<plan> User Guide") into the output file.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

/// Template used for user manuals.
pub const MANUAL_TEMPLATE: &str = "manual";

/// Values substituted into a manual.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualData {
    /// "First Last" of the reader.
    pub reader: String,
    /// "<plan name> User Guide".
    pub title: String,
}

impl ManualData {
    pub fn new(reader: impl Into<String>, plan_name: &str) -> Self {
        Self {
            reader: reader.into(),
            title: format!("{plan_name} User Guide"),
        }
    }
}

/// Errors returned by a [`DocumentRenderer`].
#[derive(Error, Debug)]
pub enum RenderError {
    /// Template reference is unknown to this renderer.
    #[error("unknown template {0:?}")]
    Template(String),

    /// Output could not be written.
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Document-generation collaborator.
#[async_trait]
pub trait DocumentRenderer: Send + Sync + 'static {
    /// Render `template` with `data` into `output_path`.
    async fn render(
        &self,
        template: &str,
        data: &ManualData,
        output_path: &Path,
    ) -> Result<(), RenderError>;
}

/// Writes the personalised manual cover as text.
#[derive(Debug, Default)]
pub struct ManualRenderer;

#[async_trait]
impl DocumentRenderer for ManualRenderer {
    async fn render(
        &self,
        template: &str,
        data: &ManualData,
        output_path: &Path,
    ) -> Result<(), RenderError> {
        if template != MANUAL_TEMPLATE {
            return Err(RenderError::Template(template.to_string()));
        }
        if let Some(dir) = output_path.parent()
            && !dir.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(dir).await?;
        }
        let content = format!("{}\n\n{}\n", data.reader, data.title);
        tokio::fs::write(output_path, content).await?;
        Ok(())
    }
}
