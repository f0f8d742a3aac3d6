//! Xaiforge Tools - tool contracts and the default toolset
//!
//! Each tool is a self-contained module implementing the Tool trait.
//! To add a tool: create the file in tools/, implement the trait, register
//! it in build_registry().

pub mod calc;
pub mod registry;
pub mod tools;

pub use registry::{Tool, ToolContext, ToolDispatch, ToolError, ToolRegistry, ToolSpec};

use std::path::Path;

/// Create the default tool registry: calc, regex_search, file_read,
/// repo_grep and http_get, in that (insertion) order.
pub fn build_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(tools::calc::CalcTool);
    registry.register(tools::regex_search::RegexSearchTool);
    registry.register(tools::file_read::FileReadTool);
    registry.register(tools::repo_grep::RepoGrepTool);
    registry.register(tools::http_get::HttpGetTool);
    registry
}

/// Reject any path whose canonical form is not the root or a descendant.
pub(crate) fn ensure_within_root(
    path: &Path,
    root: &Path,
) -> Result<std::path::PathBuf, ToolError> {
    let root_resolved = root
        .canonicalize()
        .map_err(|e| ToolError::BadInput(format!("invalid root {}: {e}", root.display())))?;
    let resolved = path
        .canonicalize()
        .map_err(|_| ToolError::NotFound(format!("{}", path.display())))?;
    if resolved != root_resolved && !resolved.starts_with(&root_resolved) {
        return Err(ToolError::BadInput(
            "Path is outside allowed root".to_string(),
        ));
    }
    Ok(resolved)
}
