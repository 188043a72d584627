//! `ChipSettings` load, validate, persist, and the `{"settings":...,"defaults":...}` response
//! shape used by the `readSettings`/`writeSettings` commands. See spec §3, §4.9.
//!
//! Grounded on `config::Configuration::parse`'s parse-then-validate pattern, but settings are
//! merged with defaults rather than rejected outright on a missing persisted page — there is
//! always a sensible `ChipSettings::default()` to fall back to.

use crate::model::ChipSettings;
use crate::storage::{self, Storage};

#[derive(Debug)]
pub enum Error {
    Malformed(serde_json::Error),
    ModeCountOutOfRange(u8),
    Storage(storage::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Malformed(e) => write!(f, "failed to parse settings JSON: {e}"),
            Error::ModeCountOutOfRange(n) => write!(
                f,
                "modeCount {n} is out of range {:?}",
                ChipSettings::MODE_COUNT_RANGE
            ),
            Error::Storage(e) => write!(f, "failed to persist settings: {e}"),
        }
    }
}

impl From<storage::Error> for Error {
    fn from(value: storage::Error) -> Self {
        Error::Storage(value)
    }
}

fn validate(settings: &ChipSettings) -> Result<(), Error> {
    if !ChipSettings::MODE_COUNT_RANGE.contains(&settings.mode_count) {
        return Err(Error::ModeCountOutOfRange(settings.mode_count));
    }
    Ok(())
}

/// Owns the live, validated `ChipSettings`, keeping it in sync with the persisted flash page.
pub struct SettingsManager {
    current: ChipSettings,
}

impl SettingsManager {
    /// Load settings from `storage`, falling back to [`ChipSettings::default`] when the page is
    /// erased, unparseable, or fails validation.
    pub fn load(storage: &Storage) -> Self {
        let current = storage
            .load_settings_json()
            .and_then(|json| serde_json::from_str::<ChipSettings>(&json).ok())
            .filter(|s| validate(s).is_ok())
            .unwrap_or_default();
        SettingsManager { current }
    }

    pub fn current(&self) -> &ChipSettings {
        &self.current
    }

    /// Validate and persist a new settings value.
    pub fn write(&mut self, settings: ChipSettings, storage: &mut Storage) -> Result<(), Error> {
        validate(&settings)?;
        let json = serde_json::to_string(&settings).expect("ChipSettings always serializes");
        storage.save_settings_json(&json)?;
        self.current = settings;
        Ok(())
    }

    /// Parse and apply settings from a raw JSON body, as received over `writeSettings`.
    pub fn write_json(&mut self, json: &str, storage: &mut Storage) -> Result<(), Error> {
        let settings: ChipSettings = serde_json::from_str(json).map_err(Error::Malformed)?;
        self.write(settings, storage)
    }

    /// The compound response body for `readSettings`/`writeSettings`: the active settings
    /// alongside the factory defaults, so a client can offer "reset to default" without a
    /// separate round trip.
    pub fn response_json(&self) -> String {
        serde_json::json!({
            "settings": self.current,
            "defaults": ChipSettings::default(),
        })
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_falls_back_to_default_when_page_is_erased() {
        let storage = Storage::new(1);
        let manager = SettingsManager::load(&storage);
        assert_eq!(*manager.current(), ChipSettings::default());
    }

    #[test]
    fn write_persists_and_updates_current() {
        let mut storage = Storage::new(1);
        let mut manager = SettingsManager::load(&storage);
        let mut settings = ChipSettings::default();
        settings.minutes_until_auto_off = 30;
        manager.write(settings, &mut storage).unwrap();
        assert_eq!(manager.current().minutes_until_auto_off, 30);

        let reloaded = SettingsManager::load(&storage);
        assert_eq!(reloaded.current().minutes_until_auto_off, 30);
    }

    #[test]
    fn write_rejects_out_of_range_mode_count() {
        let mut storage = Storage::new(1);
        let mut manager = SettingsManager::load(&storage);
        let mut settings = ChipSettings::default();
        settings.mode_count = 200;
        assert!(matches!(
            manager.write(settings, &mut storage),
            Err(Error::ModeCountOutOfRange(200))
        ));
    }

    #[test]
    fn response_json_contains_both_settings_and_defaults() {
        let storage = Storage::new(1);
        let manager = SettingsManager::load(&storage);
        let value: serde_json::Value = serde_json::from_str(&manager.response_json()).unwrap();
        assert!(value.get("settings").is_some());
        assert!(value.get("defaults").is_some());
    }
}
