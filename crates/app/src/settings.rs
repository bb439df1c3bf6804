use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Chunk character budget for narration segments.
    pub chunk_budget: usize,
    /// Delay between cancelling a narration and issuing the next one.
    pub debounce_ms: u64,
    /// Interval between periodic progress saves while playing or paused.
    pub save_interval_secs: u64,
    /// Minimum watchdog deadline regardless of segment length.
    pub watchdog_floor_ms: u64,
    /// Safety margin added to the estimated segment duration.
    pub watchdog_margin_ms: u64,
    /// Preferred narrator locale, e.g. "en-GB".
    pub preferred_voice_prefix: String,
    /// Base-language fallback when no preferred-locale voice exists.
    pub base_language_prefix: String,
    /// Directory for saved progress and preferences.
    pub data_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            chunk_budget: vellum_text::CHUNK_CHAR_BUDGET,
            debounce_ms: 50,
            save_interval_secs: 30,
            watchdog_floor_ms: 5_000,
            watchdog_margin_ms: 4_000,
            preferred_voice_prefix: "en-GB".to_string(),
            base_language_prefix: "en".to_string(),
            data_dir: PathBuf::from("data"),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_path(config_path: impl AsRef<Path>) -> Result<Self, String> {
        let raw = std::fs::read_to_string(config_path.as_ref())
            .map_err(|e| format!("Failed to read config: {}", e))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, String> {
        let mut settings: Settings =
            toml::from_str(raw).map_err(|e| format!("Failed to parse config: {}", e))?;
        settings.validate().map_err(|e| e.to_string())?;
        Ok(settings)
    }

    pub fn validate(&mut self) -> Result<(), String> {
        let mut errors = Vec::new();

        if self.chunk_budget == 0 {
            errors.push("chunk_budget must be >0".to_string());
        }
        if self.save_interval_secs == 0 {
            tracing::warn!("Invalid save_interval_secs 0. Defaulting to 30.");
            self.save_interval_secs = 30;
        }
        if self.debounce_ms > 1_000 {
            tracing::warn!("Debounce {}ms is unreasonably long. Clamping to 1000ms.", self.debounce_ms);
            self.debounce_ms = 1_000;
        }
        if self.watchdog_floor_ms == 0 {
            tracing::warn!("Invalid watchdog_floor_ms 0. Defaulting to 5000.");
            self.watchdog_floor_ms = 5_000;
        }
        if self.preferred_voice_prefix.is_empty() {
            tracing::warn!("Empty preferred_voice_prefix. Defaulting to 'en-GB'.");
            self.preferred_voice_prefix = "en-GB".to_string();
        }
        if self.base_language_prefix.is_empty() {
            tracing::warn!("Empty base_language_prefix. Defaulting to 'en'.");
            self.base_language_prefix = "en".to_string();
        }

        if !errors.is_empty() {
            return Err(format!("Critical config validation errors: {:?}", errors));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let mut settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.chunk_budget, 250);
        assert_eq!(settings.debounce_ms, 50);
    }

    #[test]
    fn parses_partial_toml_over_defaults() {
        let settings = Settings::from_toml("debounce_ms = 80\npreferred_voice_prefix = \"fr-FR\"\n")
            .unwrap();
        assert_eq!(settings.debounce_ms, 80);
        assert_eq!(settings.preferred_voice_prefix, "fr-FR");
        assert_eq!(settings.chunk_budget, 250);
    }

    #[test]
    fn zero_chunk_budget_is_rejected() {
        assert!(Settings::from_toml("chunk_budget = 0\n").is_err());
    }

    #[test]
    fn out_of_range_values_are_clamped_with_warnings() {
        let settings = Settings::from_toml("debounce_ms = 60000\nsave_interval_secs = 0\n").unwrap();
        assert_eq!(settings.debounce_ms, 1_000);
        assert_eq!(settings.save_interval_secs, 30);
    }
}
