use facematch_core::{CanvasSize, SimilarityScorer, DEFAULT_THRESHOLD};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Largest canvas side accepted; both images are decoded at canvas size.
const MAX_CANVAS_SIDE: f64 = 16384.0;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Comparison settings: optional TOML file, then `FACEMATCH_*` environment
/// variables, then command-line flags.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Width of the canvas both images are resized and mapped into.
    pub canvas_width: f64,
    pub canvas_height: f64,
    /// Mean landmark distance, in canvas units, below which faces match.
    /// Only meaningful together with the canvas size it was tuned for.
    pub threshold: f64,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// SCRFD model file name inside `model_dir`.
    pub scrfd_model: String,
}

impl Default for Config {
    fn default() -> Self {
        let canvas = CanvasSize::default();
        Self {
            canvas_width: canvas.width,
            canvas_height: canvas.height,
            threshold: DEFAULT_THRESHOLD,
            model_dir: default_model_dir(),
            scrfd_model: "det_10g.onnx".to_string(),
        }
    }
}

impl Config {
    /// Load from `path` (or `FACEMATCH_CONFIG`) if given, then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("FACEMATCH_CONFIG").map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Override fields from `FACEMATCH_*` variables. Unparseable values are
    /// ignored with a warning.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        env_parse(&lookup, "FACEMATCH_CANVAS_WIDTH", &mut self.canvas_width);
        env_parse(&lookup, "FACEMATCH_CANVAS_HEIGHT", &mut self.canvas_height);
        env_parse(&lookup, "FACEMATCH_THRESHOLD", &mut self.threshold);
        if let Some(dir) = lookup("FACEMATCH_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        if let Some(name) = lookup("FACEMATCH_SCRFD_MODEL") {
            self.scrfd_model = name;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let side_ok = |side: f64| (1.0..=MAX_CANVAS_SIDE).contains(&side);
        if !self.canvas().is_valid() || !side_ok(self.canvas_width) || !side_ok(self.canvas_height)
        {
            return Err(ConfigError::Invalid(format!(
                "canvas sides must lie within 1..={MAX_CANVAS_SIDE}, got {}",
                self.canvas()
            )));
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "threshold must be a finite non-negative number, got {}",
                self.threshold
            )));
        }
        Ok(())
    }

    pub fn canvas(&self) -> CanvasSize {
        CanvasSize::new(self.canvas_width, self.canvas_height)
    }

    pub fn scorer(&self) -> SimilarityScorer {
        SimilarityScorer::new(self.threshold)
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> PathBuf {
        self.model_dir.join(&self.scrfd_model)
    }
}

/// `$XDG_DATA_HOME/facematch/models`, falling back to `~/.local/share`.
fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facematch/models")
}

fn env_parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.parse() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable environment override"),
    }
}
