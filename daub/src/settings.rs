use daub_core::{brush::BrushState, color::Color, state::StrokeCommit};
use std::path::{Path, PathBuf};

const DOCUMENTATION: &str = r#"# Daub settings. You may edit this file, but be aware that formatting and comments will not
# be preserved. Missing keys take their default value.

# canvas_size = [width, height] of new documents, in pixels.
# scale_factor = device pixels per canvas unit, scales brush spacing.
# save_delay_ms = how long the document must be left alone before it is saved.
# document_root = folder holding one folder per document. Defaults to the user's data dir.
# log_level = one of "off", "error", "warn", "info", "debug", "trace".
# stroke_commit = "rasterize" to keep finished strokes as pixels, "keep_strokes" to keep them editable.
# background = document background, as an ARGB hex string such as "FFFFFFFF".
# [brush] = the brush new documents start with.

"#;

#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    #[error("no preferences dir found")]
    NoPreferencesDir,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("malformed settings: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to write settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    strum::AsRefStr,
    strum::EnumIter,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}
impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => Self::Off,
            LogLevel::Error => Self::Error,
            LogLevel::Warn => Self::Warn,
            LogLevel::Info => Self::Info,
            LogLevel::Debug => Self::Debug,
            LogLevel::Trace => Self::Trace,
        }
    }
}

#[must_use]
pub fn preferences_dir() -> Option<PathBuf> {
    let mut base_dir = dirs::preference_dir()?;
    base_dir.push(env!("CARGO_PKG_NAME"));
    Some(base_dir)
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(skip)]
    failed_to_load: bool,
    pub canvas_size: [u32; 2],
    pub scale_factor: f32,
    pub save_delay_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_root: Option<PathBuf>,
    pub log_level: LogLevel,
    pub stroke_commit: StrokeCommit,
    pub background: Color,
    // Tables go last.
    pub brush: BrushState,
}
impl Default for Settings {
    fn default() -> Self {
        Self {
            failed_to_load: false,
            canvas_size: [1080, 1080],
            scale_factor: 1.0,
            save_delay_ms: 1000,
            document_root: None,
            log_level: LogLevel::default(),
            stroke_commit: StrokeCommit::default(),
            background: Color::WHITE,
            brush: BrushState::default(),
        }
    }
}

impl Settings {
    const FILENAME: &'static str = "settings.toml";
    /// Shared global settings, loaded from user preferences.
    /// (Or defaulted, if unavailable for some reason)
    #[must_use]
    pub fn get() -> &'static Self {
        static GLOBAL_SETTINGS: std::sync::OnceLock<Settings> = std::sync::OnceLock::new();

        GLOBAL_SETTINGS.get_or_init(|| match preferences_dir() {
            None => Self::no_path(),
            Some(mut dir) => {
                dir.push(Self::FILENAME);
                Self::load_or_default(&dir)
            }
        })
    }
    #[must_use]
    pub fn no_path() -> Self {
        log::warn!("Settings weren't available, defaulting.");
        Self {
            failed_to_load: true,
            ..Self::default()
        }
    }
    #[must_use]
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(settings) => settings,
            Err(SettingsError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No settings at {}, using defaults.", path.display());
                Self::default()
            }
            Err(err) => {
                log::warn!("Failed to load {}: {err}", path.display());
                Self::no_path()
            }
        }
    }
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }
    pub fn from_toml(string: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(string)?)
    }
    /// The file contents, documentation included.
    pub fn to_toml(&self) -> Result<String, SettingsError> {
        let string = toml::ser::to_string_pretty(self)?;
        Ok(DOCUMENTATION.to_owned() + &string)
    }
    /// Return true if loading user's settings failed. This can be useful for
    /// displaying a warning.
    #[must_use]
    pub fn did_fail_to_load(&self) -> bool {
        self.failed_to_load
    }
    #[must_use]
    pub fn save_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.save_delay_ms)
    }
    /// Where documents live: the configured root, else `<data dir>/daub/documents`.
    #[must_use]
    pub fn document_root(&self) -> Option<PathBuf> {
        self.document_root.clone().or_else(|| {
            let mut dir = dirs::data_dir()?;
            dir.push(env!("CARGO_PKG_NAME"));
            dir.push("documents");
            Some(dir)
        })
    }
    pub fn save(&self) -> Result<(), SettingsError> {
        let mut preferences = preferences_dir().ok_or(SettingsError::NoPreferencesDir)?;
        // Explicity do *not* create recursively. If not found, the user probably has a good reason.
        // Ignore errors (could already exist). Any real errors will be emitted by file access below.
        let _ = std::fs::DirBuilder::new().create(&preferences);

        preferences.push(Self::FILENAME);
        self.save_to(&preferences)
    }
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{LogLevel, Settings, SettingsError};
    use daub_core::{color::Color, state::StrokeCommit};

    #[test]
    fn round_trip() {
        let mut settings = Settings {
            canvas_size: [640, 480],
            log_level: LogLevel::Trace,
            stroke_commit: StrokeCommit::KeepStrokes,
            background: Color::BLACK,
            document_root: Some("/tmp/daub".into()),
            ..Settings::default()
        };
        settings.brush.spacing = 0.5;
        let string = settings.to_toml().unwrap();
        assert!(string.starts_with("# Daub settings."));
        assert_eq!(Settings::from_toml(&string).unwrap(), settings);
    }
    #[test]
    fn partial_file_fills_defaults() {
        let settings = Settings::from_toml("save_delay_ms = 250\n[brush]\njitter = 0.25\n").unwrap();
        assert_eq!(settings.save_delay(), std::time::Duration::from_millis(250));
        assert_eq!(settings.canvas_size, Settings::default().canvas_size);
        assert!((settings.brush.jitter - 0.25).abs() < f32::EPSILON);
        assert!((settings.brush.spacing - 1.0).abs() < f32::EPSILON);
        assert!(!settings.did_fail_to_load());
    }
    #[test]
    fn malformed_is_an_error() {
        assert!(matches!(
            Settings::from_toml("canvas_size = \"big\""),
            Err(SettingsError::Parse(_))
        ));
        assert!(matches!(
            Settings::from_toml("log_level = \"loud\""),
            Err(SettingsError::Parse(_))
        ));
    }
    #[test]
    fn file_load_or_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        // Missing is fine, not a failure.
        assert!(!Settings::load_or_default(&path).did_fail_to_load());

        std::fs::write(&path, "not toml at all [").unwrap();
        assert!(Settings::load_or_default(&path).did_fail_to_load());

        let settings = Settings {
            scale_factor: 2.0,
            ..Settings::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_or_default(&path), settings);
    }
    #[test]
    fn levels_map() {
        assert_eq!(log::LevelFilter::from(LogLevel::Warn), log::LevelFilter::Warn);
        assert_eq!(log::LevelFilter::from(LogLevel::default()), log::LevelFilter::Info);
    }
}
