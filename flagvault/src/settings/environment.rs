//! `FLAGVAULT_*` environment variable overrides.

use std::env;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::logging::LOG_MODE_ENV;
use crate::settings::schema::Settings;

/// Overrides the data directory.
pub const DATA_DIR_ENV: &str = "FLAGVAULT_DATA_DIR";
/// Overrides the busy timeout.
pub const BUSY_TIMEOUT_ENV: &str = "FLAGVAULT_BUSY_TIMEOUT_MS";
/// Overrides the default `require_proposals` of new projects.
pub const REQUIRE_PROPOSALS_ENV: &str = "FLAGVAULT_REQUIRE_PROPOSALS";
/// Overrides the default `allow_self_approvals` of new projects.
pub const ALLOW_SELF_APPROVALS_ENV: &str = "FLAGVAULT_ALLOW_SELF_APPROVALS";

/// Applies environment variable overrides.
///
/// # Examples
///
/// ```no_run
/// use flagvault::settings::{EnvironmentSettings, Settings};
///
/// let mut settings = Settings::default();
/// EnvironmentSettings::apply_overrides(&mut settings).unwrap();
/// ```
pub struct EnvironmentSettings;

impl EnvironmentSettings {
    /// Reads every `FLAGVAULT_*` variable and writes it over `settings`.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds an unparseable number or boolean.
    pub fn apply_overrides(settings: &mut Settings) -> Result<()> {
        if let Ok(dir) = env::var(DATA_DIR_ENV) {
            settings.data_dir = Some(PathBuf::from(dir));
        }

        if let Ok(ms) = env::var(BUSY_TIMEOUT_ENV) {
            settings.busy_timeout_ms = Some(ms.trim().parse().map_err(|_| {
                Error::validation(BUSY_TIMEOUT_ENV, "Must be a positive integer")
            })?);
        }

        if let Ok(mode) = env::var(LOG_MODE_ENV) {
            settings.log_mode = Some(mode);
        }

        if let Ok(val) = env::var(REQUIRE_PROPOSALS_ENV) {
            settings
                .projects
                .get_or_insert_with(Default::default)
                .require_proposals = Some(Self::parse_bool(REQUIRE_PROPOSALS_ENV, &val)?);
        }

        if let Ok(val) = env::var(ALLOW_SELF_APPROVALS_ENV) {
            settings
                .projects
                .get_or_insert_with(Default::default)
                .allow_self_approvals = Some(Self::parse_bool(ALLOW_SELF_APPROVALS_ENV, &val)?);
        }

        Ok(())
    }

    fn parse_bool(field: &str, s: &str) -> Result<bool> {
        match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(Error::validation(
                field,
                format!("Invalid boolean value: '{s}' (expected true/false/1/0/yes/no)"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ALL: [&str; 5] = [
        DATA_DIR_ENV,
        BUSY_TIMEOUT_ENV,
        LOG_MODE_ENV,
        REQUIRE_PROPOSALS_ENV,
        ALLOW_SELF_APPROVALS_ENV,
    ];

    fn clear() {
        for var in ALL {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_parse_bool() {
        for yes in ["true", "TRUE", "1", "yes", " Yes "] {
            assert!(EnvironmentSettings::parse_bool("x", yes).unwrap());
        }
        for no in ["false", "0", "no", "NO"] {
            assert!(!EnvironmentSettings::parse_bool("x", no).unwrap());
        }
        assert!(EnvironmentSettings::parse_bool("x", "maybe").is_err());
    }

    #[test]
    #[serial]
    fn test_apply_overrides() {
        clear();
        env::set_var(DATA_DIR_ENV, "/tmp/fv");
        env::set_var(BUSY_TIMEOUT_ENV, "42");
        env::set_var(REQUIRE_PROPOSALS_ENV, "yes");
        env::set_var(ALLOW_SELF_APPROVALS_ENV, "0");

        let mut settings = Settings::default();
        EnvironmentSettings::apply_overrides(&mut settings).unwrap();
        clear();

        assert_eq!(settings.data_dir, Some(PathBuf::from("/tmp/fv")));
        assert_eq!(settings.busy_timeout_ms, Some(42));
        assert!(settings.require_proposals());
        assert!(!settings.allow_self_approvals());
    }

    #[test]
    #[serial]
    fn test_invalid_values_rejected() {
        clear();
        env::set_var(BUSY_TIMEOUT_ENV, "soon");
        let result = EnvironmentSettings::apply_overrides(&mut Settings::default());
        clear();
        assert!(result.is_err());

        env::set_var(REQUIRE_PROPOSALS_ENV, "sometimes");
        let result = EnvironmentSettings::apply_overrides(&mut Settings::default());
        clear();
        assert!(result.is_err());
    }
}
