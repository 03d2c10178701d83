use clap::Args;
use optic_api::ClientOptions;
use optic_core::{Gallery, Thresholds};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Command-line settings that take precedence over file and environment.
#[derive(Args, Debug, Clone, Default)]
pub struct Overrides {
    /// Inference server base URL
    #[arg(long = "url", global = true)]
    pub server_url: Option<String>,
    /// Directory for result images and the face gallery
    #[arg(short, long, global = true)]
    pub output_dir: Option<PathBuf>,
    /// Do not write annotated result images
    #[arg(long, global = true)]
    pub no_save: bool,
    /// Font used for label text
    #[arg(long = "font", global = true)]
    pub font_path: Option<PathBuf>,
}

/// Client configuration.
///
/// Built from defaults, then an optional TOML file, then `OPTIC_*`
/// environment variables; command-line flags are applied last by `main`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Inference server base URL (default: http://localhost:9900).
    pub server_url: String,
    /// Directory for result images and the face gallery.
    pub output_dir: PathBuf,
    /// Gallery file name inside `output_dir`.
    pub gallery_file: String,
    /// Whether to write annotated result images.
    pub save: bool,
    /// TrueType/OpenType font for label text; the bundled font when unset.
    pub font_path: Option<PathBuf>,
    /// Async runtime worker threads.
    pub worker_threads: usize,
    /// Idle HTTP connections kept per host.
    pub max_connections_per_host: usize,
    /// Largest response body accepted, in bytes.
    pub max_response_bytes: usize,
    pub thresholds: Thresholds,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:9900".to_string(),
            output_dir: PathBuf::from("./output"),
            gallery_file: "face_embeddings.json".to_string(),
            save: true,
            font_path: None,
            worker_threads: 8,
            max_connections_per_host: 1,
            max_response_bytes: 100 * 1024 * 1024,
            thresholds: Thresholds::default(),
        }
    }
}

impl Config {
    /// Load from an optional TOML file, then overlay `OPTIC_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
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
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("OPTIC_SERVER_URL") {
            self.server_url = v;
        }
        if let Some(v) = lookup("OPTIC_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("OPTIC_GALLERY_FILE") {
            self.gallery_file = v;
        }
        if let Some(v) = lookup("OPTIC_FONT") {
            self.font_path = Some(PathBuf::from(v));
        }
        self.save = lookup("OPTIC_SAVE").map(|v| v != "0").unwrap_or(self.save);
        self.worker_threads = env_usize(&lookup, "OPTIC_WORKER_THREADS", self.worker_threads);
        self.max_connections_per_host = env_usize(
            &lookup,
            "OPTIC_MAX_CONNECTIONS_PER_HOST",
            self.max_connections_per_host,
        );
        self.max_response_bytes =
            env_usize(&lookup, "OPTIC_MAX_RESPONSE_BYTES", self.max_response_bytes);

        let t = &mut self.thresholds;
        t.face = env_f32(&lookup, "OPTIC_FACE_THRESHOLD", t.face);
        t.class = env_f32(&lookup, "OPTIC_CLASS_THRESHOLD", t.class);
        t.object = env_f32(&lookup, "OPTIC_OBJECT_THRESHOLD", t.object);
        t.pose_keypoint = env_f32(&lookup, "OPTIC_POSE_THRESHOLD", t.pose_keypoint);
        t.face_match = env_f32(&lookup, "OPTIC_MATCH_THRESHOLD", t.face_match);
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(url) = &overrides.server_url {
            self.server_url = url.clone();
        }
        if let Some(dir) = &overrides.output_dir {
            self.output_dir = dir.clone();
        }
        if let Some(font) = &overrides.font_path {
            self.font_path = Some(font.clone());
        }
        if overrides.no_save {
            self.save = false;
        }
    }

    /// The face gallery under `output_dir`.
    pub fn gallery(&self) -> Gallery {
        Gallery::in_dir(&self.output_dir, &self.gallery_file)
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            base_url: self.server_url.clone(),
            max_connections_per_host: self.max_connections_per_host,
            max_response_bytes: self.max_response_bytes,
        }
    }
}

fn env_f32(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: f32) -> f32 {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: usize) -> usize {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert_eq!(c.server_url, "http://localhost:9900");
        assert_eq!(c.output_dir, PathBuf::from("./output"));
        assert_eq!(c.gallery_file, "face_embeddings.json");
        assert!(c.save);
        assert_eq!(c.worker_threads, 8);
        assert_eq!(c.max_connections_per_host, 1);
        assert_eq!(c.max_response_bytes, 100 * 1024 * 1024);
        assert_eq!(c.thresholds, Thresholds::default());
        assert_eq!(c.font_path, None);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("optic.toml");
        std::fs::write(
            &path,
            "server_url = \"http://10.0.0.5:9900\"\nsave = false\n\n[thresholds]\nface_match = 0.9\n",
        )
        .unwrap();

        let c = Config::from_file(&path).unwrap();
        assert_eq!(c.server_url, "http://10.0.0.5:9900");
        assert!(!c.save);
        assert_eq!(c.thresholds.face_match, 0.9);
        assert_eq!(c.thresholds.face, 0.5);
        assert_eq!(c.gallery_file, "face_embeddings.json");
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("optic.toml");
        std::fs::write(&path, "worker_threads = \"many\"").unwrap();
        assert!(matches!(Config::from_file(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(matches!(
            Config::from_file(Path::new("/nonexistent/optic.toml")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut c = Config {
            server_url: "http://from-file:1".into(),
            ..Config::default()
        };
        c.apply_env(lookup_from(&[
            ("OPTIC_SERVER_URL", "http://from-env:2"),
            ("OPTIC_SAVE", "0"),
            ("OPTIC_WORKER_THREADS", "2"),
            ("OPTIC_POSE_THRESHOLD", "0.35"),
            ("OPTIC_MATCH_THRESHOLD", "not-a-number"),
        ]));

        assert_eq!(c.server_url, "http://from-env:2");
        assert!(!c.save);
        assert_eq!(c.worker_threads, 2);
        assert_eq!(c.thresholds.pose_keypoint, 0.35);
        // unparsable values keep what was there
        assert_eq!(c.thresholds.face_match, 0.8);
    }

    #[test]
    fn test_overrides_beat_file_and_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("optic.toml");
        std::fs::write(
            &path,
            "server_url = \"http://from-file:1\"\noutput_dir = \"/file/out\"\nfont_path = \"/file/font.ttf\"\nsave = true\n",
        )
        .unwrap();

        let mut c = Config::from_file(&path).unwrap();
        c.apply_env(lookup_from(&[
            ("OPTIC_SERVER_URL", "http://from-env:2"),
            ("OPTIC_OUTPUT_DIR", "/env/out"),
            ("OPTIC_FONT", "/env/font.ttf"),
            ("OPTIC_SAVE", "1"),
        ]));
        c.apply_overrides(&Overrides {
            server_url: Some("http://from-cli:3".into()),
            output_dir: Some(PathBuf::from("/cli/out")),
            no_save: true,
            font_path: Some(PathBuf::from("/cli/font.ttf")),
        });

        assert_eq!(c.server_url, "http://from-cli:3");
        assert_eq!(c.output_dir, PathBuf::from("/cli/out"));
        assert_eq!(c.font_path, Some(PathBuf::from("/cli/font.ttf")));
        assert!(!c.save);
    }

    #[test]
    fn test_empty_overrides_keep_env_values() {
        let mut c = Config::default();
        c.apply_env(lookup_from(&[
            ("OPTIC_SERVER_URL", "http://from-env:2"),
            ("OPTIC_OUTPUT_DIR", "/env/out"),
        ]));
        c.apply_overrides(&Overrides::default());

        assert_eq!(c.server_url, "http://from-env:2");
        assert_eq!(c.output_dir, PathBuf::from("/env/out"));
        assert!(c.save);
    }

    #[test]
    fn test_gallery_lives_in_output_dir() {
        let c = Config {
            output_dir: PathBuf::from("/tmp/optic-out"),
            ..Config::default()
        };
        assert_eq!(c.gallery().path(), Path::new("/tmp/optic-out/face_embeddings.json"));
    }
}
