use std::path::Path;
use std::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolType {
    YtDlp,
    Ffmpeg,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::Ffmpeg => "ffmpeg",
        }
    }

    fn version_arg(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "--version",
            ToolType::Ffmpeg => "-version",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: Option<String>,
    pub is_available: bool,
}

pub struct ToolManager;

impl ToolManager {
    pub fn new() -> Self {
        Self
    }

    /// Locate a tool, preferring an explicit path when one is configured
    pub fn get_tool_info(&self, tool_type: ToolType, override_path: Option<&str>) -> ToolInfo {
        let path = match override_path {
            Some(p) => Some(p.to_string()),
            None => self.detect_tool(tool_type),
        };
        let version = path.as_deref().and_then(|p| self.get_version(p, tool_type));

        ToolInfo {
            name: tool_type.as_str().to_string(),
            tool_type,
            // A configured path that does not run is not available
            is_available: version.is_some(),
            version,
            path,
        }
    }

    fn detect_tool(&self, tool_type: ToolType) -> Option<String> {
        let binary = tool_type.as_str();

        INSTALL_DIRS
            .iter()
            .map(|dir| Path::new(dir).join(binary))
            .find(|candidate| candidate.is_file())
            .map(|found| found.to_string_lossy().into_owned())
            .or_else(|| lookup_on_path(binary))
    }

    fn get_version(&self, path: &str, tool_type: ToolType) -> Option<String> {
        let output = Command::new(path).arg(tool_type.version_arg()).output().ok()?;
        if !output.status.success() {
            return None;
        }

        // ffmpeg prints a banner; the first line carries the version
        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout.lines().next().map(|first| first.trim().to_string())
    }
}

/// Install locations checked before falling back to `which`
const INSTALL_DIRS: [&str; 3] = ["/opt/homebrew/bin", "/usr/local/bin", "/usr/bin"];

fn lookup_on_path(binary: &str) -> Option<String> {
    let output = Command::new("which").arg(binary).output().ok()?;
    let found = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (output.status.success() && !found.is_empty()).then_some(found)
}

impl Default for ToolManager {
    fn default() -> Self {
        Self::new()
    }
}
