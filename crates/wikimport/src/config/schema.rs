use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Holding folder for embedded images, created under the project root.
    #[serde(default = "default_images_folder")]
    pub images_folder: String,
    /// Holding folder that receives the private working copy of the source.
    #[serde(default = "default_workspace_folder")]
    pub workspace_folder: String,
    /// Names treated as already taken in every project.
    #[serde(default = "default_reserved_names")]
    pub reserved_names: Vec<String>,
    /// Prefix for rewritten attachment URLs, e.g. `https://wiki.example.com`.
    #[serde(default)]
    pub file_base_url: String,
    /// Download URL template; `{project}` and `{file}` are substituted.
    #[serde(default = "default_download_path")]
    pub file_download_path: String,
    /// Inline render URL template used for image embeds.
    #[serde(default = "default_render_path")]
    pub file_render_path: String,
    /// Capacity of the progress broadcast channel.
    #[serde(default = "default_progress_capacity")]
    pub progress_capacity: usize,
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn default_images_folder() -> String {
    "images".to_string()
}

fn default_workspace_folder() -> String {
    "import workspace".to_string()
}

fn default_reserved_names() -> Vec<String> {
    vec!["home".to_string()]
}

fn default_download_path() -> String {
    "/projects/{project}/files/{file}/download".to_string()
}

fn default_render_path() -> String {
    "/projects/{project}/files/{file}/render".to_string()
}

fn default_progress_capacity() -> usize {
    256
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            images_folder: default_images_folder(),
            workspace_folder: default_workspace_folder(),
            reserved_names: default_reserved_names(),
            file_base_url: String::new(),
            file_download_path: default_download_path(),
            file_render_path: default_render_path(),
            progress_capacity: default_progress_capacity(),
            database_path: None,
            log_format: LogFormat::default(),
        }
    }
}

impl ImportConfig {
    /// Builds the URL of a stored file scoped to `project_id`.
    ///
    /// `render` selects the inline variant used for image embeds.
    pub fn file_url(&self, project_id: &str, file_id: &str, render: bool) -> String {
        let template = if render {
            &self.file_render_path
        } else {
            &self.file_download_path
        };
        let path = template
            .replace("{project}", &urlencoding::encode(project_id))
            .replace("{file}", &urlencoding::encode(file_id));
        format!("{}{}", self.file_base_url.trim_end_matches('/'), path)
    }

    /// Configured database path, falling back to the per-user default.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.database_path
            .clone()
            .or_else(crate::db::default_database_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ImportConfig::default();
        assert_eq!(config.images_folder, "images");
        assert_eq!(config.workspace_folder, "import workspace");
        assert_eq!(config.reserved_names, vec!["home".to_string()]);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_file_url_download_and_render() {
        let config = ImportConfig {
            file_base_url: "https://wiki.example.com/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.file_url("p1", "abc", false),
            "https://wiki.example.com/projects/p1/files/abc/download"
        );
        assert_eq!(
            config.file_url("p1", "abc", true),
            "https://wiki.example.com/projects/p1/files/abc/render"
        );
    }

    #[test]
    fn test_file_url_encodes_ids() {
        let config = ImportConfig::default();
        assert_eq!(
            config.file_url("p 1", "work/a b.png", false),
            "/projects/p%201/files/work%2Fa%20b.png/download"
        );
    }

    #[test]
    fn test_explicit_database_path_wins() {
        let config = ImportConfig {
            database_path: Some(PathBuf::from("/tmp/tasks.db")),
            ..Default::default()
        };
        assert_eq!(config.database_path(), Some(PathBuf::from("/tmp/tasks.db")));
    }
}
