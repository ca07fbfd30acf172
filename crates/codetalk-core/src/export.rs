//! Export artifacts for a reply and the download capability that saves them.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::Config;
use crate::diagram::fence;
use crate::viewer::ViewerState;

pub const TEXT_FILENAME: &str = "chat-response.txt";
pub const SOURCE_FILENAME: &str = "class-diagram.mmd.txt";
pub const CLI_FILENAME: &str = "mermaid-cli-instructions.txt";
pub const IMAGE_FILENAME: &str = "class-diagram.svg";

const TEXT_MIME: &str = "text/plain";
const SVG_MIME: &str = "image/svg+xml";

/// Bytes ready to hand to a [`Downloader`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub filename: &'static str,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

/// The raw reply text
pub fn text_export(reply: &str) -> Export {
    Export {
        filename: TEXT_FILENAME,
        mime: TEXT_MIME,
        bytes: reply.as_bytes().to_vec(),
    }
}

/// Diagram source wrapped in a fenced block
pub fn source_export(source: &str) -> Export {
    Export {
        filename: SOURCE_FILENAME,
        mime: TEXT_MIME,
        bytes: fence(source).into_bytes(),
    }
}

pub fn cli_export(source: &str) -> Export {
    Export {
        filename: CLI_FILENAME,
        mime: TEXT_MIME,
        bytes: cli_instructions(source).into_bytes(),
    }
}

/// The rendered image, or `None` if nothing has been rendered yet
pub fn image_export(state: &ViewerState) -> Option<Export> {
    state.rendered_image.as_ref().map(|svg| Export {
        filename: IMAGE_FILENAME,
        mime: SVG_MIME,
        bytes: svg.as_bytes().to_vec(),
    })
}

/// Steps for producing the SVG locally with mermaid-cli
pub fn cli_instructions(source: &str) -> String {
    [
        "To generate a class diagram SVG using Mermaid CLI:",
        "",
        "1. Save the following code to a file, e.g., class-diagram.mmd:",
        "",
        source,
        "",
        "2. Run the following command in your terminal:",
        "",
        "   mmdc -i class-diagram.mmd -o class-diagram.svg",
        "",
        "You need to have Mermaid CLI installed: https://github.com/mermaid-js/mermaid-cli",
    ]
    .join("\n")
}

/// Platform capability that persists exported bytes
pub trait Downloader {
    /// Save `bytes` under (a variant of) `filename`; returns where it landed
    fn trigger_download(&self, bytes: &[u8], filename: &str, mime: &str) -> Result<PathBuf>;

    fn download(&self, export: &Export) -> Result<PathBuf> {
        self.trigger_download(&export.bytes, export.filename, export.mime)
    }
}

/// Writes downloads into a directory, never overwriting existing files
#[derive(Debug, Clone)]
pub struct DirDownloader {
    dir: PathBuf,
}

impl DirDownloader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Configured directory, then the user's download dir, then cwd
    pub fn from_config(config: &Config) -> Self {
        let dir = config
            .download_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(dir)
    }
}

impl Downloader for DirDownloader {
    fn trigger_download(&self, bytes: &[u8], filename: &str, mime: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Could not create {}", self.dir.display()))?;

        let path = unique_path(&self.dir, filename)?;
        fs::write(&path, bytes).with_context(|| format!("Could not write {}", path.display()))?;

        info!(path = %path.display(), mime, bytes = bytes.len(), "saved download");
        Ok(path)
    }
}

/// `name.ext`, then `name (1).ext`, `name (2).ext`, ... The extension is
/// everything after the first dot so `a.mmd.txt` becomes `a (1).mmd.txt`.
fn unique_path(dir: &Path, filename: &str) -> Result<PathBuf> {
    let candidate = dir.join(filename);
    if !candidate.exists() {
        return Ok(candidate);
    }

    let (stem, ext) = match filename.find('.') {
        Some(idx) => filename.split_at(idx),
        None => (filename, ""),
    };

    (1..10_000)
        .map(|n| dir.join(format!("{} ({}){}", stem, n, ext)))
        .find(|p| !p.exists())
        .ok_or_else(|| anyhow!("No free file name for {} in {}", filename, dir.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_source_export_is_fenced() {
        let export = source_export("classDiagram\n    class A\n");
        assert_eq!(export.filename, "class-diagram.mmd.txt");
        assert_eq!(
            String::from_utf8(export.bytes).unwrap(),
            "```mermaid\nclassDiagram\n    class A\n\n```"
        );
    }

    #[test]
    fn test_cli_instructions_embed_source() {
        let text = cli_instructions("classDiagram\n    class A");
        assert!(text.starts_with("To generate a class diagram SVG using Mermaid CLI:"));
        assert!(text.contains("\nclassDiagram\n    class A\n"));
        assert!(text.contains("   mmdc -i class-diagram.mmd -o class-diagram.svg"));
        assert_eq!(cli_export("x").filename, CLI_FILENAME);
    }

    #[test]
    fn test_image_export_guarded() {
        let mut state = ViewerState::default();
        assert!(image_export(&state).is_none());

        state.complete_render("<svg/>".into());
        let export = image_export(&state).unwrap();
        assert_eq!(export.mime, "image/svg+xml");
        assert_eq!(export.bytes, b"<svg/>");
    }

    #[test]
    fn test_dir_downloader_writes_without_overwriting() {
        let dir = TempDir::new().unwrap();
        let downloader = DirDownloader::new(dir.path().join("downloads"));

        let first = downloader.download(&text_export("one")).unwrap();
        let second = downloader.download(&text_export("two")).unwrap();
        let third = downloader.download(&source_export("three")).unwrap();
        let fourth = downloader.download(&source_export("four")).unwrap();

        assert_eq!(first.file_name().unwrap(), "chat-response.txt");
        assert_eq!(second.file_name().unwrap(), "chat-response (1).txt");
        assert_eq!(third.file_name().unwrap(), "class-diagram.mmd.txt");
        assert_eq!(fourth.file_name().unwrap(), "class-diagram (1).mmd.txt");
        assert_eq!(fs::read_to_string(first).unwrap(), "one");
        assert_eq!(fs::read_to_string(second).unwrap(), "two");
    }
}
