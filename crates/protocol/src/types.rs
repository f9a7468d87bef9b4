use serde::{Deserialize, Serialize};

use crate::constants;

/// Static form parameters resent with every chunk of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionParams {
    #[serde(default = "default_uploader")]
    pub uploader: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub comment: String,
}

fn default_uploader() -> String {
    "anonymous".into()
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            uploader: default_uploader(),
            description: String::new(),
            comment: String::new(),
        }
    }
}

/// Where the uploaded files go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum UploadMode {
    /// New files for a group.
    Normal { group_id: String },
    /// A new version of an existing file.
    Version { group_id: String, file_id: String },
}

impl UploadMode {
    /// Server path of the chunk endpoint for this mode.
    pub fn endpoint_path(&self) -> String {
        match self {
            Self::Normal { group_id } => constants::upload_path(group_id),
            Self::Version { group_id, file_id } => {
                constants::upload_version_path(group_id, file_id)
            }
        }
    }

    /// What the UI does once every file has reached a terminal state.
    pub fn completion_action(&self) -> CompletionAction {
        match self {
            Self::Normal { group_id } => CompletionAction::Reload {
                path: constants::group_view_path(group_id),
            },
            Self::Version { group_id, file_id } => CompletionAction::NavigateVersionHistory {
                path: constants::version_history_path(group_id, file_id),
            },
        }
    }

    pub fn group_id(&self) -> &str {
        match self {
            Self::Normal { group_id } | Self::Version { group_id, .. } => group_id,
        }
    }
}

/// Follow-up navigation after a session finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CompletionAction {
    /// Reload the current group page.
    Reload { path: String },
    /// Jump to the version history of the file that received a new version.
    NavigateVersionHistory { path: String },
}

impl CompletionAction {
    pub fn path(&self) -> &str {
        match self {
            Self::Reload { path } | Self::NavigateVersionHistory { path } => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_params_defaults_to_anonymous() {
        let params: SessionParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params.uploader, "anonymous");
        assert!(params.description.is_empty());
        assert_eq!(params, SessionParams::default());
    }

    #[test]
    fn normal_mode_reloads_group_page() {
        let mode = UploadMode::Normal {
            group_id: "abc".into(),
        };
        assert_eq!(mode.endpoint_path(), "/file/upload/abc");
        assert_eq!(
            mode.completion_action(),
            CompletionAction::Reload {
                path: "/group/abc".into()
            }
        );
    }

    #[test]
    fn version_mode_navigates_to_history() {
        let mode = UploadMode::Version {
            group_id: "abc".into(),
            file_id: "f1".into(),
        };
        assert_eq!(mode.endpoint_path(), "/file/upload_version/abc/f1");
        assert_eq!(mode.group_id(), "abc");
        let action = mode.completion_action();
        assert!(matches!(action, CompletionAction::NavigateVersionHistory { .. }));
        assert_eq!(action.path(), "/file/version_history/abc/f1");
    }

    #[test]
    fn upload_mode_tagged_json() {
        let json = r#"{"mode":"version","group_id":"g","file_id":"f"}"#;
        let mode: UploadMode = serde_json::from_str(json).unwrap();
        assert_eq!(
            mode,
            UploadMode::Version {
                group_id: "g".into(),
                file_id: "f".into()
            }
        );
    }
}
