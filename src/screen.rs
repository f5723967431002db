//! Screenshots for Vision sessions.
//!
//! [`CommandScreenshot`] shells out to whichever screenshot tool is
//! installed (`gnome-screenshot`, `grim`, `scrot`), reads the PNG it wrote
//! and removes the temporary file.  Capture is blocking; the orchestrator
//! runs it on `spawn_blocking`.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use base64::Engine as _;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Screenshot
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Eq)]
pub struct Screenshot {
    pub png: Vec<u8>,
}

impl Screenshot {
    pub fn new(png: Vec<u8>) -> Self {
        Self { png }
    }

    /// `data:` URL for an OpenAI-style `image_url` content part.
    pub fn to_data_url(&self) -> String {
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&self.png)
        )
    }
}

impl std::fmt::Debug for Screenshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Screenshot({} bytes)", self.png.len())
    }
}

// ---------------------------------------------------------------------------
// ScreenError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScreenError {
    #[error("no screenshot tool succeeded (tried: {0})")]
    NoTool(String),

    #[error("screenshot file unreadable: {0}")]
    Read(String),

    #[error("screenshot is empty")]
    Empty,
}

// ---------------------------------------------------------------------------
// ScreenCapture
// ---------------------------------------------------------------------------

pub trait ScreenCapture: Send + Sync {
    /// Blocking full-screen capture.
    fn capture(&self) -> Result<Screenshot, ScreenError>;
}

/// An external command; the output path is appended as the last argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenTool {
    pub program: String,
    pub args: Vec<String>,
}

impl ScreenTool {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandScreenshot {
    tools: Vec<ScreenTool>,
    path: PathBuf,
}

impl Default for CommandScreenshot {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join(format!(
            "voice-assistant-screen-{}.png",
            std::process::id()
        )))
    }
}

impl CommandScreenshot {
    /// GNOME, then wlroots, then X11.
    pub fn new(path: PathBuf) -> Self {
        Self::with_tools(
            vec![
                ScreenTool::new("gnome-screenshot", &["-f"]),
                ScreenTool::new("grim", &[]),
                ScreenTool::new("scrot", &["-o"]),
            ],
            path,
        )
    }

    pub fn with_tools(tools: Vec<ScreenTool>, path: PathBuf) -> Self {
        Self { tools, path }
    }

    fn run(&self, tool: &ScreenTool) -> bool {
        let status = Command::new(&tool.program)
            .args(&tool.args)
            .arg(&self.path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(s) if s.success() && self.path.exists() => true,
            Ok(s) => {
                log::debug!("{} exited with {s}", tool.program);
                false
            }
            Err(e) => {
                log::debug!("{} unavailable: {e}", tool.program);
                false
            }
        }
    }
}

impl ScreenCapture for CommandScreenshot {
    fn capture(&self) -> Result<Screenshot, ScreenError> {
        let _ = std::fs::remove_file(&self.path);

        let Some(tool) = self.tools.iter().find(|t| self.run(t)) else {
            let tried: Vec<&str> = self.tools.iter().map(|t| t.program.as_str()).collect();
            return Err(ScreenError::NoTool(tried.join(", ")));
        };

        let read = std::fs::read(&self.path);
        let _ = std::fs::remove_file(&self.path);
        let png = read.map_err(|e| ScreenError::Read(e.to_string()))?;
        if png.is_empty() {
            return Err(ScreenError::Empty);
        }
        log::info!("screenshot via {}: {} bytes", tool.program, png.len());
        Ok(Screenshot::new(png))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn writer(content: &str) -> ScreenTool {
        // `sh -c script sh <path>`: the path arrives as $1.
        ScreenTool::new("sh", &["-c", &format!("printf '{content}' > \"$1\""), "sh"])
    }

    #[test]
    fn data_url_is_base64_png() {
        let shot = Screenshot::new(vec![1, 2, 3]);
        assert_eq!(shot.to_data_url(), "data:image/png;base64,AQID");
    }

    #[test]
    fn falls_through_to_first_working_tool() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shot.png");
        let cap = CommandScreenshot::with_tools(
            vec![
                ScreenTool::new("definitely-not-a-screenshot-tool", &[]),
                writer("PNGDATA"),
            ],
            path.clone(),
        );
        let shot = cap.capture().unwrap();
        assert_eq!(shot.png, b"PNGDATA");
        assert!(!path.exists(), "temp file removed");
    }

    #[test]
    fn all_tools_failing_is_reported() {
        let dir = tempdir().unwrap();
        let cap = CommandScreenshot::with_tools(
            vec![ScreenTool::new("false", &[])],
            dir.path().join("shot.png"),
        );
        assert_eq!(cap.capture(), Err(ScreenError::NoTool("false".into())));
    }

    #[test]
    fn empty_file_is_rejected() {
        let dir = tempdir().unwrap();
        let cap = CommandScreenshot::with_tools(vec![writer("")], dir.path().join("shot.png"));
        assert_eq!(cap.capture(), Err(ScreenError::Empty));
    }

    #[test]
    fn debug_does_not_dump_bytes() {
        assert_eq!(format!("{:?}", Screenshot::new(vec![0; 10])), "Screenshot(10 bytes)");
    }
}
