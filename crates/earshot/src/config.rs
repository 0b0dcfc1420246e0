use crate::loader::{AssetSources, RetryPolicy};
use earshot_core::text::LABEL_TEXT;
use earshot_core::{DisplaySize, TrackerModels, ViewportSource};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Runtime configuration.
///
/// Layers, lowest first: built-in defaults, the TOML file, `EARSHOT_*`
/// environment variables, then command-line flags (applied by `main`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// V4L2 device path.
    pub camera_device: String,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// SCRFD face box model, relative to `model_dir`.
    pub detector_model: String,
    /// 68-point landmark model, relative to `model_dir`.
    pub landmark_model: String,
    /// Binary glTF ear model.
    pub ear_model: PathBuf,
    /// TrueType font for the label.
    pub font: PathBuf,
    pub label_text: String,
    /// Display size; `[viewport]` in the TOML file.
    pub viewport: DisplaySize,
    pub target_fps: u32,
    pub asset_retry_attempts: u32,
    pub asset_retry_backoff_ms: u64,
    /// When set, every `snapshot_every`-th composite is written here as PNG.
    pub snapshot_dir: Option<PathBuf>,
    pub snapshot_every: u64,
    /// Draw the three tracking anchors on the overlay canvas.
    pub debug_landmarks: bool,
    /// Intra-op threads per ONNX session.
    pub detector_threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_device: "/dev/video0".to_string(),
            model_dir: default_model_dir(),
            detector_model: "det_10g.onnx".to_string(),
            landmark_model: "pfld_68.onnx".to_string(),
            ear_model: PathBuf::from("assets/ear.glb"),
            font: PathBuf::from("assets/helvetiker.ttf"),
            label_text: LABEL_TEXT.to_string(),
            viewport: DisplaySize::new(1280, 720),
            target_fps: 60,
            asset_retry_attempts: 3,
            asset_retry_backoff_ms: 250,
            snapshot_dir: None,
            snapshot_every: 30,
            debug_landmarks: false,
            detector_threads: 2,
        }
    }
}

impl Config {
    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = read(path)?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Override fields from `EARSHOT_*` variables. Unparseable values are
    /// ignored with a warning.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("EARSHOT_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        if let Some(v) = lookup("EARSHOT_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("EARSHOT_EAR_MODEL") {
            self.ear_model = PathBuf::from(v);
        }
        if let Some(v) = lookup("EARSHOT_FONT") {
            self.font = PathBuf::from(v);
        }
        if let Some(v) = lookup("EARSHOT_LABEL_TEXT") {
            self.label_text = v;
        }
        if let Some(v) = lookup("EARSHOT_SNAPSHOT_DIR") {
            self.snapshot_dir = Some(PathBuf::from(v));
        }
        env_parse(&lookup, "EARSHOT_VIEWPORT_WIDTH", &mut self.viewport.width);
        env_parse(&lookup, "EARSHOT_VIEWPORT_HEIGHT", &mut self.viewport.height);
        env_parse(&lookup, "EARSHOT_TARGET_FPS", &mut self.target_fps);
        env_parse(&lookup, "EARSHOT_ASSET_RETRY_ATTEMPTS", &mut self.asset_retry_attempts);
        env_parse(&lookup, "EARSHOT_ASSET_RETRY_BACKOFF_MS", &mut self.asset_retry_backoff_ms);
        env_parse(&lookup, "EARSHOT_SNAPSHOT_EVERY", &mut self.snapshot_every);
        env_parse(&lookup, "EARSHOT_DETECTOR_THREADS", &mut self.detector_threads);
        if let Some(v) = lookup("EARSHOT_DEBUG_LANDMARKS") {
            self.debug_landmarks = v != "0" && !v.eq_ignore_ascii_case("false");
        }
    }

    pub fn tracker_models(&self) -> TrackerModels {
        TrackerModels {
            boxes: self.model_dir.join(&self.detector_model),
            landmarks: self.model_dir.join(&self.landmark_model),
            threads: self.detector_threads.max(1),
        }
    }

    pub fn asset_sources(&self) -> AssetSources {
        AssetSources {
            ear_model: self.ear_model.clone(),
            font: self.font.clone(),
            label_text: self.label_text.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.asset_retry_attempts.max(1),
            initial_backoff: Duration::from_millis(self.asset_retry_backoff_ms),
        }
    }

    /// Time between paints at `target_fps` (0 is treated as 1).
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.target_fps.max(1)
    }
}

/// `$XDG_DATA_HOME/earshot/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("earshot/models")
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn env_parse<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = env_value(lookup, key) {
        *target = value;
    }
}

fn env_value<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let raw = lookup(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}

/// Viewport dimensions pinned above the file layer, by `EARSHOT_VIEWPORT_*`
/// or `--width`/`--height`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewportOverride {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl ViewportOverride {
    pub fn from_env<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            width: env_value(&lookup, "EARSHOT_VIEWPORT_WIDTH"),
            height: env_value(&lookup, "EARSHOT_VIEWPORT_HEIGHT"),
        }
    }

    /// Layer `upper` on top of `self`.
    pub fn then(self, upper: Self) -> Self {
        Self {
            width: upper.width.or(self.width),
            height: upper.height.or(self.height),
        }
    }

    fn apply(self, size: DisplaySize) -> DisplaySize {
        DisplaySize::new(self.width.unwrap_or(size.width), self.height.unwrap_or(size.height))
    }
}

#[derive(Deserialize)]
struct ViewportSection {
    viewport: Option<DisplaySize>,
}

/// Display dimensions re-read from the config file's `[viewport]` table on
/// every resize signal, with the environment and command-line overrides
/// applied on top. Without a file, or when the file cannot be read, the last
/// known size is kept.
pub struct ConfigViewport {
    path: Option<PathBuf>,
    overrides: ViewportOverride,
    last: Cell<DisplaySize>,
}

impl ConfigViewport {
    /// `initial` is the fully layered startup size.
    pub fn new(path: Option<PathBuf>, initial: DisplaySize, overrides: ViewportOverride) -> Self {
        Self {
            path,
            overrides,
            last: Cell::new(initial),
        }
    }
}

impl ViewportSource for ConfigViewport {
    fn dimensions(&self) -> DisplaySize {
        let Some(path) = &self.path else {
            return self.last.get();
        };
        let section = read(path).and_then(|text| {
            toml::from_str::<ViewportSection>(&text).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })
        });
        match section {
            Ok(ViewportSection { viewport: Some(size) }) => self.last.set(self.overrides.apply(size)),
            Ok(ViewportSection { viewport: None }) => {}
            Err(err) => tracing::warn!(error = %err, "keeping previous viewport size"),
        }
        self.last.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn scratch_file(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("earshot-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.camera_device, "/dev/video0");
        assert_eq!(config.viewport, DisplaySize::new(1280, 720));
        assert_eq!(config.label_text, "Ceci n'est pas un cog");
        assert_eq!(config.frame_interval(), Duration::from_secs(1) / 60);
        assert!(config.model_dir.ends_with("earshot/models"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            camera_device = "/dev/video4"
            target_fps = 30

            [viewport]
            width = 800
            height = 600
            "#,
        )
        .unwrap();
        assert_eq!(config.camera_device, "/dev/video4");
        assert_eq!(config.target_fps, 30);
        assert_eq!(config.viewport, DisplaySize::new(800, 600));
        assert_eq!(config.asset_retry_attempts, 3);
        assert_eq!(config.snapshot_dir, None);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("EARSHOT_CAMERA_DEVICE", "/dev/video2"),
            ("EARSHOT_VIEWPORT_WIDTH", "1920"),
            ("EARSHOT_TARGET_FPS", "not-a-number"),
            ("EARSHOT_DEBUG_LANDMARKS", "1"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.camera_device, "/dev/video2");
        assert_eq!(config.viewport, DisplaySize::new(1920, 720));
        assert_eq!(config.target_fps, 60);
        assert!(config.debug_landmarks);
    }

    #[test]
    fn test_derived_settings() {
        let config = Config {
            model_dir: PathBuf::from("/models"),
            asset_retry_attempts: 0,
            target_fps: 0,
            detector_threads: 0,
            ..Config::default()
        };
        let models = config.tracker_models();
        assert_eq!(models.boxes, PathBuf::from("/models/det_10g.onnx"));
        assert_eq!(models.landmarks, PathBuf::from("/models/pfld_68.onnx"));
        assert_eq!(models.threads, 1);
        assert_eq!(config.retry_policy().attempts, 1);
        assert_eq!(config.frame_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_from_file_errors() {
        assert!(matches!(
            Config::from_file(Path::new("/nonexistent/earshot.toml")),
            Err(ConfigError::Io { .. })
        ));
        let path = scratch_file("broken.toml", "target_fps = \"fast\"");
        assert!(matches!(Config::from_file(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_config_viewport_rereads_file() {
        let path = scratch_file("viewport.toml", "[viewport]\nwidth = 640\nheight = 480\n");
        let source = ConfigViewport::new(
            Some(path.clone()),
            DisplaySize::new(1280, 720),
            ViewportOverride::default(),
        );
        assert_eq!(source.dimensions(), DisplaySize::new(640, 480));

        std::fs::write(&path, "[viewport]\nwidth = 1024\nheight = 768\n").unwrap();
        assert_eq!(source.dimensions(), DisplaySize::new(1024, 768));

        // broken file keeps the last good size
        std::fs::write(&path, "[viewport]\nwidth = ").unwrap();
        assert_eq!(source.dimensions(), DisplaySize::new(1024, 768));
    }

    #[test]
    fn test_config_viewport_without_file() {
        let source = ConfigViewport::new(None, DisplaySize::new(300, 200), ViewportOverride::default());
        assert_eq!(source.dimensions(), DisplaySize::new(300, 200));
    }

    #[test]
    fn test_viewport_overrides_survive_reread() {
        let path = scratch_file("pinned.toml", "[viewport]\nwidth = 640\nheight = 480\n");
        let mut config = Config::from_file(&path).unwrap();
        let cli = ViewportOverride { width: Some(1920), height: Some(1080) };
        config.viewport = cli.apply(config.viewport);

        let source = ConfigViewport::new(Some(path.clone()), config.viewport, cli);
        assert_eq!(source.dimensions(), DisplaySize::new(1920, 1080));

        std::fs::write(&path, "[viewport]\nwidth = 800\nheight = 600\n").unwrap();
        assert_eq!(source.dimensions(), DisplaySize::new(1920, 1080));
    }

    #[test]
    fn test_viewport_override_layers() {
        let env = ViewportOverride::from_env(|key| match key {
            "EARSHOT_VIEWPORT_WIDTH" => Some("1024".to_string()),
            "EARSHOT_VIEWPORT_HEIGHT" => Some("tall".to_string()),
            _ => None,
        });
        assert_eq!(env, ViewportOverride { width: Some(1024), height: None });

        let cli = ViewportOverride { width: None, height: Some(900) };
        let layered = env.then(cli);
        assert_eq!(layered.apply(DisplaySize::new(640, 480)), DisplaySize::new(1024, 900));

        // env pins only the width; the file still drives the height
        let path = scratch_file("half.toml", "[viewport]\nwidth = 640\nheight = 480\n");
        let source = ConfigViewport::new(Some(path.clone()), DisplaySize::new(1024, 480), env);
        std::fs::write(&path, "[viewport]\nwidth = 800\nheight = 600\n").unwrap();
        assert_eq!(source.dimensions(), DisplaySize::new(1024, 600));
    }
}
