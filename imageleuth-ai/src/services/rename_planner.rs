//! Batch rename planning
//!
//! Computes `<prefix>_<NN><ext>` names for a list of files. Nothing is
//! renamed on disk: the client sends the planned names back as `fileNames[]`
//! with the upload.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenameError {
    #[error("请提供文件名前缀")]
    MissingPrefix,
}

/// One file as the client knows it
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameSource {
    /// Client-side identifier, echoed back untouched
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub original_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenamedFile {
    pub id: Value,
    pub old_name: String,
    pub new_name: String,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenamePlan {
    pub success: bool,
    pub files: Vec<RenamedFile>,
    pub success_count: usize,
    pub total_count: usize,
    pub message: String,
}

/// Number files 1-based in list order, keeping each original extension
pub fn plan_renames(prefix: &str, files: &[RenameSource]) -> Result<RenamePlan, RenameError> {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        return Err(RenameError::MissingPrefix);
    }

    let renamed: Vec<RenamedFile> = files
        .iter()
        .enumerate()
        .map(|(index, file)| RenamedFile {
            id: file.id.clone(),
            old_name: file.original_name.clone(),
            new_name: format!("{}_{:02}{}", prefix, index + 1, extension_of(&file.original_name)),
            success: true,
        })
        .collect();

    Ok(RenamePlan {
        success: true,
        success_count: renamed.len(),
        total_count: files.len(),
        message: format!(
            "重命名规则已设置，将应用到 {} 个文件（上传时会使用新文件名）",
            files.len()
        ),
        files: renamed,
    })
}

/// `.ext` of the final path component, or empty
fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default()
}
