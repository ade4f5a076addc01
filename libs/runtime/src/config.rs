use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Main application configuration: strongly-typed server/site/store
/// sections plus the logging table.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Core server configuration.
    pub server: ServerConfig,
    /// Site bootstrap: which object is the site, where application code
    /// lives.
    #[serde(default)]
    pub site: SiteConfig,
    /// Record store layers (top first). Empty means the built-in demo
    /// store: kernel seed plus a writable memory layer.
    #[serde(default)]
    pub store: StoreConfig,
    /// Logging configuration (optional, defaults if None).
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub home_dir: String, // normalized to an absolute path on load
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub timeout_sec: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Id of the site object in the store.
    pub site_id: i64,
    /// Root directory of local application code, for the module loader.
    #[serde(default)]
    pub code_root: String,
    /// Registry residency (seconds) for objects without an own `ttl`.
    pub default_ttl_sec: i64,
}

impl Default for SiteConfig {
    fn default() -> Self {
        SiteConfig {
            site_id: 8,
            code_root: String::new(),
            default_ttl_sec: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Layers top-first: reads fall through in order, writes land in the
    /// first writable layer.
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LayerConfig {
    /// YAML record file, relative paths resolved against `home_dir`.
    pub file: String,
    #[serde(default = "default_true")]
    pub readonly: bool,
    /// Id allocation range of a writable layer.
    #[serde(default)]
    pub id_start: Option<i64>,
    #[serde(default)]
    pub id_stop: Option<i64>,
}

fn default_true() -> bool {
    true
}

/// Logging configuration: subsystem name → settings; key "default" is the
/// catch-all for targets without an explicit section.
pub type LoggingConfig = HashMap<String, Section>;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Section {
    pub console_level: String, // "trace".."error", "off"
    #[serde(default)]
    pub file: String, // "logs/schemat.log"; empty = console only
    #[serde(default)]
    pub file_level: String,
    #[serde(default)]
    pub max_size_mb: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            // Empty => resolved to <HOME>/.schemat on load.
            home_dir: String::new(),
            host: "127.0.0.1".to_string(),
            port: 8220,
            timeout_sec: 30,
        }
    }
}

pub fn default_logging_config() -> LoggingConfig {
    let mut logging = HashMap::new();
    logging.insert(
        "default".to_string(),
        Section {
            console_level: "info".to_string(),
            file: "logs/schemat.log".to_string(),
            file_level: "debug".to_string(),
            max_size_mb: Some(100),
        },
    );
    logging
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            site: SiteConfig::default(),
            store: StoreConfig::default(),
            logging: Some(default_logging_config()),
        }
    }
}

impl AppConfig {
    /// Layered loading: defaults → YAML file → `SCHEMAT__` environment
    /// variables. Normalizes `server.home_dir` into an absolute path and
    /// creates the directory.
    pub fn load_layered<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        use figment::{
            providers::{Env, Format, Serialized, Yaml},
            Figment,
        };

        // Start from a base where the optional logging table is None so it
        // only materializes when the YAML/env provides it.
        let base = AppConfig {
            server: ServerConfig::default(),
            site: SiteConfig::default(),
            store: StoreConfig::default(),
            logging: None,
        };

        let figment = Figment::new()
            .merge(Serialized::defaults(base))
            .merge(Yaml::file(config_path.as_ref()))
            // SCHEMAT__SERVER__PORT=8220 maps to server.port
            .merge(Env::prefixed("SCHEMAT__").split("__"));

        let mut config: AppConfig = figment
            .extract()
            .context("Failed to extract config from figment")?;

        normalize_home_dir_inplace(&mut config.server)
            .context("Failed to resolve server.home_dir")?;
        Ok(config)
    }

    /// Load from a file, or fall back to pure defaults (still normalizing
    /// the home directory).
    pub fn load_or_default<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_layered(path),
            None => {
                let mut c = Self::default();
                normalize_home_dir_inplace(&mut c.server)
                    .context("Failed to resolve server.home_dir (defaults)")?;
                Ok(c)
            }
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config to YAML")
    }

    /// Apply command-line overrides (port, verbosity).
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(port) = args.port {
            self.server.port = port;
        }

        let logging = self.logging.get_or_insert_with(default_logging_config);
        if let Some(default_section) = logging.get_mut("default") {
            default_section.console_level = match args.verbose {
                0 => default_section.console_level.clone(),
                1 => "debug".to_string(),
                _ => "trace".to_string(),
            };
        }
    }

    /// Resolve a config-relative path against the (already normalized)
    /// home directory.
    pub fn resolve_path(&self, raw: &str) -> PathBuf {
        let p = Path::new(raw);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            Path::new(&self.server.home_dir).join(p)
        }
    }
}

/// Command line arguments passed down from the binary.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config: Option<String>,
    pub port: Option<u16>,
    pub print_config: bool,
    pub verbose: u8,
}

const fn default_subdir() -> &'static str {
    ".schemat"
}

/// Expand `~`, default to `<HOME>/.schemat`, absolutize, and create the
/// directory; the result is written back into the config.
fn normalize_home_dir_inplace(server: &mut ServerConfig) -> Result<()> {
    let raw = server.home_dir.trim();
    let mut path = if raw.is_empty() {
        home_dir()?.join(default_subdir())
    } else if let Some(rest) = raw.strip_prefix("~/") {
        home_dir()?.join(rest)
    } else {
        PathBuf::from(raw)
    };
    if path.is_relative() {
        path = std::env::current_dir()?.join(path);
    }
    std::fs::create_dir_all(&path)
        .with_context(|| format!("cannot create home_dir {}", path.display()))?;
    server.home_dir = path.to_string_lossy().to_string();
    Ok(())
}

fn home_dir() -> Result<PathBuf> {
    #[cfg(windows)]
    let var = std::env::var("APPDATA");
    #[cfg(not(windows))]
    let var = std::env::var("HOME");
    var.map(PathBuf::from)
        .context("HOME directory is not set")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn is_normalized_path(p: &str) -> bool {
        let pb = PathBuf::from(p);
        pb.is_absolute() && !p.starts_with('~')
    }

    #[test]
    fn test_default_config_structure() {
        let config = AppConfig::default();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8220);
        assert_eq!(config.server.home_dir, "");
        assert_eq!(config.server.timeout_sec, 30);

        assert_eq!(config.site.site_id, 8);
        assert_eq!(config.site.default_ttl_sec, 60);
        assert!(config.store.layers.is_empty());

        let logging = config.logging.as_ref().unwrap();
        assert!(logging.contains_key("default"));
        assert_eq!(logging["default"].console_level, "info");
    }

    #[test]
    fn test_load_layered_normalizes_home_dir() {
        let tmp = tempdir().unwrap();
        let cfg_path = tmp.path().join("cfg.yaml");

        let yaml = r#"
server:
  home_dir: "~/.test_schemat"
  host: "0.0.0.0"
  port: 9090
  timeout_sec: 15

site:
  site_id: 8
  code_root: "app"
  default_ttl_sec: 10

store:
  layers:
    - file: "db/kernel.yaml"
    - file: "db/data.yaml"
      readonly: false
      id_start: 100

logging:
  default:
    console_level: debug
    file: "logs/default.log"
"#;
        fs::write(&cfg_path, yaml).unwrap();

        let config = AppConfig::load_layered(&cfg_path).unwrap();

        assert!(is_normalized_path(&config.server.home_dir));
        assert!(config.server.home_dir.ends_with(".test_schemat"));
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9090);

        assert_eq!(config.site.code_root, "app");
        assert_eq!(config.site.default_ttl_sec, 10);

        assert_eq!(config.store.layers.len(), 2);
        assert!(config.store.layers[0].readonly);
        assert!(!config.store.layers[1].readonly);
        assert_eq!(config.store.layers[1].id_start, Some(100));

        let logging = config.logging.as_ref().unwrap();
        assert_eq!(logging["default"].console_level, "debug");
    }

    #[test]
    fn test_minimal_yaml_config() {
        let tmp = tempdir().unwrap();
        let cfg_path = tmp.path().join("cfg.yaml");

        let yaml = r#"
server:
  home_dir: "~/.minimal_schemat"
  host: "localhost"
  port: 8080
"#;
        fs::write(&cfg_path, yaml).unwrap();

        let config = AppConfig::load_layered(&cfg_path).unwrap();
        assert!(is_normalized_path(&config.server.home_dir));
        assert_eq!(config.server.port, 8080);
        // Optional sections keep their defaults.
        assert!(config.logging.is_none());
        assert!(config.store.layers.is_empty());
        assert_eq!(config.site.site_id, 8);
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = AppConfig::default();
        let args = CliArgs {
            config: None,
            port: Some(3000),
            print_config: false,
            verbose: 2,
        };
        config.apply_cli_overrides(&args);

        assert_eq!(config.server.port, 3000);
        let logging = config.logging.as_ref().unwrap();
        assert_eq!(logging["default"].console_level, "trace");
    }

    #[test]
    fn test_cli_verbose_levels_matrix() {
        for (verbose_level, expected) in [(0, "info"), (1, "debug"), (2, "trace"), (3, "trace")] {
            let mut config = AppConfig::default();
            let args = CliArgs {
                verbose: verbose_level,
                ..Default::default()
            };
            config.apply_cli_overrides(&args);
            assert_eq!(
                config.logging.as_ref().unwrap()["default"].console_level,
                expected
            );
        }
    }

    #[test]
    fn test_resolve_path_against_home() {
        let tmp = tempdir().unwrap();
        let mut config = AppConfig::default();
        config.server.home_dir = tmp.path().to_string_lossy().to_string();

        assert_eq!(
            config.resolve_path("db/kernel.yaml"),
            tmp.path().join("db/kernel.yaml")
        );
        assert_eq!(
            config.resolve_path("/abs/data.yaml"),
            PathBuf::from("/abs/data.yaml")
        );
    }

    #[test]
    fn test_to_yaml_roundtrip_basic() {
        let config = AppConfig::default();
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("server:"));
        assert!(yaml.contains("site:"));
        assert!(yaml.contains("logging:"));

        let roundtrip: AppConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(roundtrip.server.port, config.server.port);
        assert_eq!(roundtrip.site.site_id, config.site.site_id);
    }

    #[test]
    fn test_invalid_yaml_missing_required_field() {
        let invalid_yaml = r#"
server:
  home_dir: "~/.test"
  # Missing required host field
  port: 8220
"#;
        let result: Result<AppConfig, _> = serde_yaml::from_str(invalid_yaml);
        assert!(result.is_err());
    }
}
