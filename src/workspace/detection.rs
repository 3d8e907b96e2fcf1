use std::path::{Path, PathBuf};

/// Files and directories that mark the root of a TypeScript/JavaScript project.
const PROJECT_MARKERS: &[&str] = &["tsconfig.json", "jsconfig.json", "package.json", ".git"];

pub struct WorkspaceDetector;

impl WorkspaceDetector {
    /// Walk up from `start_path` to the nearest directory carrying a project
    /// marker.
    pub fn find_workspace_root(start_path: &Path) -> Option<PathBuf> {
        start_path.ancestors().find(|dir| Self::has_project_markers(dir)).map(Path::to_path_buf)
    }

    fn has_project_markers(path: &Path) -> bool {
        PROJECT_MARKERS.iter().any(|marker| path.join(marker).exists())
    }
}
