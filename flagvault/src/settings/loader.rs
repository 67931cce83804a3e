//! Settings file discovery and loading.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::settings::schema::Settings;

/// File name of the user settings file inside the data directory.
pub const USER_SETTINGS_FILE: &str = "config.yaml";
/// File name of the shared project settings file.
pub const PROJECT_SETTINGS_FILE: &str = "flagvault.yaml";
/// File name of the private, uncommitted project settings file.
pub const LOCAL_SETTINGS_FILE: &str = "flagvault.local.yaml";

/// One loaded settings file with its precedence level.
///
/// Lower precedence values are overridden by higher ones.
#[derive(Debug, Clone)]
pub struct SettingsSource {
    /// Path to the file.
    pub path: PathBuf,
    /// Precedence level (higher values take priority).
    pub precedence: u8,
    /// Parsed contents.
    pub settings: Settings,
}

/// Loads settings from the filesystem.
///
/// # Examples
///
/// ```no_run
/// use flagvault::settings::SettingsLoader;
/// use std::path::Path;
///
/// let sources = SettingsLoader::load_all(Path::new("."), None).unwrap();
/// println!("Found {} settings files", sources.len());
/// ```
pub struct SettingsLoader;

impl SettingsLoader {
    /// Discovers and loads all settings files, lowest precedence first.
    ///
    /// Searches for:
    /// 1. `<data_dir>/config.yaml` (precedence 1)
    /// 2. `flagvault.yaml` walking up from `working_dir` (precedence 2)
    /// 3. `flagvault.local.yaml` next to it (precedence 3)
    ///
    /// # Errors
    ///
    /// Returns an error if a file exists but cannot be read or parsed.
    pub fn load_all(working_dir: &Path, data_dir: Option<&Path>) -> Result<Vec<SettingsSource>> {
        let mut sources = Vec::new();

        if let Some(user) = Self::load_user_settings(data_dir)? {
            sources.push(user);
        }

        sources.extend(Self::discover_project_settings(working_dir)?);
        sources.sort_by_key(|s| s.precedence);

        Ok(sources)
    }

    fn load_user_settings(data_dir: Option<&Path>) -> Result<Option<SettingsSource>> {
        let path = match data_dir {
            Some(dir) => dir.join(USER_SETTINGS_FILE),
            None => crate::database::default_data_dir()?.join(USER_SETTINGS_FILE),
        };

        if !path.exists() {
            return Ok(None);
        }

        let settings = Self::load_file(&path)?;
        Ok(Some(SettingsSource {
            path,
            precedence: 1,
            settings,
        }))
    }

    /// Walks up from `start_dir`, stopping at the first directory that holds
    /// either project settings file.
    ///
    /// # Errors
    ///
    /// Returns an error if a discovered file cannot be read or parsed.
    pub fn discover_project_settings(start_dir: &Path) -> Result<Vec<SettingsSource>> {
        let mut found = Vec::new();
        let mut current = start_dir.to_path_buf();

        loop {
            for (name, precedence) in [(PROJECT_SETTINGS_FILE, 2), (LOCAL_SETTINGS_FILE, 3)] {
                let path = current.join(name);
                if path.exists() {
                    let settings = Self::load_file(&path)?;
                    found.push(SettingsSource {
                        path,
                        precedence,
                        settings,
                    });
                }
            }

            if !found.is_empty() || !current.pop() {
                break;
            }
        }

        Ok(found)
    }

    /// Loads and parses one YAML settings file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the YAML is invalid.
    pub fn load_file(path: &Path) -> Result<Settings> {
        let contents = fs::read_to_string(path)?;

        serde_yaml::from_str(&contents).map_err(|e| Error::Validation {
            field: format!("{}", path.display()),
            message: format!("Invalid YAML: {e}"),
        })
    }
}
