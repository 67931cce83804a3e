//! Settings validation.

use crate::error::{Error, Result};
use crate::logging::LogLevel;
use crate::settings::schema::Settings;

/// Validates merged settings.
///
/// # Examples
///
/// ```
/// use flagvault::settings::{Settings, SettingsValidator};
///
/// SettingsValidator::validate(&Settings::default()).unwrap();
/// ```
pub struct SettingsValidator;

impl SettingsValidator {
    /// Checks every set field.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a zero busy timeout, an unknown log
    /// mode, or an empty data directory.
    pub fn validate(settings: &Settings) -> Result<()> {
        if settings.busy_timeout_ms == Some(0) {
            return Err(Error::validation(
                "busy_timeout_ms",
                "Timeout must be greater than 0",
            ));
        }

        if let Some(ref mode) = settings.log_mode {
            LogLevel::parse(mode).map_err(|message| Error::validation("log_mode", message))?;
        }

        if let Some(ref dir) = settings.data_dir {
            if dir.as_os_str().is_empty() {
                return Err(Error::validation("data_dir", "Cannot be empty"));
            }
        }

        Ok(())
    }
}
