//! Local directory listing

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{Capability, CapabilityDeclaration, CapabilityError, ExecutionContext, ToolResponse};

/// Lists the entries of a directory on the local file system
#[derive(Debug, Default, Clone, Copy)]
pub struct ListFiles;

#[async_trait]
impl Capability for ListFiles {
    fn declaration(&self) -> CapabilityDeclaration {
        CapabilityDeclaration::new("list_files", "Lists all files in a specified directory.")
            .with_string_param("directory", "The path of the directory to list files.", true)
            .with_context("Tool to list files in a specified directory.")
    }

    async fn invoke(
        &self,
        arguments: Map<String, Value>,
        _context: &ExecutionContext,
    ) -> Result<Value, CapabilityError> {
        let Some(directory) = arguments.get("directory").and_then(|v| v.as_str()) else {
            return Ok(ToolResponse::error(json!({"error": "Missing required parameter: directory"})).into_value());
        };

        debug!("Listing directory {}", directory);

        Ok(match list_directory(directory).await {
            Ok(files) => ToolResponse::success(json!({ "files": files })),
            Err(e) => ToolResponse::error(json!({ "error": e.to_string() })),
        }
        .into_value())
    }
}

async fn list_directory(directory: &str) -> std::io::Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(directory).await?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        files.push(entry.file_name().to_string_lossy().into_owned());
    }

    files.sort();
    Ok(files)
}
