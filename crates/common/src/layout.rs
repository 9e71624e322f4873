// On-disk layout of one project as seen by one operator.
//
// <root>/<project>_<prefix>/SourceTables/<project>_<prefix>.csv     deletion log
// <root>/<project>_<prefix>/SourceTables/<project>_<prefix>_Db.csv  snapshot
// <root>/<project>_<prefix>/<project>_<prefix>Deleted.csv           report

use std::path::{Path, PathBuf};

const SOURCE_TABLES_DIR: &str = "SourceTables";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    folder: PathBuf,
    folder_name: String,
}

impl ProjectLayout {
    pub fn new(shared_root: impl AsRef<Path>, project_name: &str, operator_prefix: &str) -> Self {
        let folder_name = format!("{project_name}_{operator_prefix}");
        Self { folder: shared_root.as_ref().join(&folder_name), folder_name }
    }

    /// `{project}_{prefix}`
    pub fn folder_name(&self) -> &str {
        &self.folder_name
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn source_tables_dir(&self) -> PathBuf {
        self.folder.join(SOURCE_TABLES_DIR)
    }

    pub fn deletion_log_path(&self) -> PathBuf {
        self.source_tables_dir().join(format!("{}.csv", self.folder_name))
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.source_tables_dir().join(format!("{}_Db.csv", self.folder_name))
    }

    pub fn report_path(&self) -> PathBuf {
        self.folder.join(format!("{}Deleted.csv", self.folder_name))
    }
}

/// Project name of a document: its file name without extension.
///
/// Accepts both `/` and `\` separators so host paths from any platform
/// resolve the same way.
pub fn project_name_from_path(document_path: &str) -> String {
    let file_name = document_path.rsplit(['/', '\\']).next().unwrap_or(document_path);
    match file_name.rfind('.') {
        Some(0) | None => file_name.to_string(),
        Some(dot) => file_name[..dot].to_string(),
    }
}
