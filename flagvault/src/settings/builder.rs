//! Settings assembly from every layer.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::settings::environment::EnvironmentSettings;
use crate::settings::loader::SettingsLoader;
use crate::settings::merger::SettingsMerger;
use crate::settings::schema::Settings;
use crate::settings::validator::SettingsValidator;

/// Builds the effective [`Settings`].
///
/// # Examples
///
/// ```
/// use flagvault::settings::{Settings, SettingsBuilder};
///
/// let settings = SettingsBuilder::new()
///     .skip_files()
///     .skip_env()
///     .with_settings(Settings { busy_timeout_ms: Some(50), ..Default::default() })
///     .build()
///     .unwrap();
/// assert_eq!(settings.busy_timeout_ms, Some(50));
/// ```
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    working_dir: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    skip_files: bool,
    skip_env: bool,
    overrides: Vec<Settings>,
}

impl SettingsBuilder {
    /// Creates a builder that reads files and the environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Does not read any settings file.
    #[must_use]
    pub fn skip_files(mut self) -> Self {
        self.skip_files = true;
        self
    }

    /// Does not read `FLAGVAULT_*` variables.
    #[must_use]
    pub fn skip_env(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Starts project-file discovery at `dir` instead of the current directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: &Path) -> Self {
        self.working_dir = Some(dir.to_path_buf());
        self
    }

    /// Reads the user file from `dir` and makes it the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, dir: &Path) -> Self {
        self.data_dir = Some(dir.to_path_buf());
        self
    }

    /// Layers programmatic settings above every other source.
    #[must_use]
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.overrides.push(settings);
        self
    }

    /// Loads, merges and validates all layers.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be parsed, an environment variable
    /// is invalid, or the merged result fails validation.
    pub fn build(self) -> Result<Settings> {
        let mut settings = Settings {
            data_dir: self.data_dir.clone(),
            ..Settings::default()
        };

        if !self.skip_files {
            let working_dir = match self.working_dir {
                Some(dir) => dir,
                None => std::env::current_dir()?,
            };
            let sources = SettingsLoader::load_all(&working_dir, self.data_dir.as_deref())?;
            for source in &sources {
                log::debug!("loaded settings from {}", source.path.display());
            }
            SettingsMerger::merge_into(&mut settings, &SettingsMerger::merge(sources));
        }

        if !self.skip_env {
            EnvironmentSettings::apply_overrides(&mut settings)?;
        }

        for layer in &self.overrides {
            SettingsMerger::merge_into(&mut settings, layer);
        }

        SettingsValidator::validate(&settings)?;
        Ok(settings)
    }
}
