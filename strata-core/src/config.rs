//! Service settings.
//!
//! The settings surface is a fixed, known set of knobs, so resolution is
//! deliberately plain: deserialize `service.yaml` into optional typed
//! sections, lay a `service-<profile>.yaml` on top, convert to [`Settings`]
//! with the defaults filled in, then apply the `STRATA_*` environment
//! overrides for exactly those knobs.

use std::path::Path;

use serde::Deserialize;

/// Error raised while resolving service settings.
#[derive(Debug)]
pub enum ConfigError {
    /// A settings file exists but could not be read.
    Read { path: String, source: std::io::Error },
    /// A settings file is not valid YAML for the expected sections.
    Parse { path: String, message: String },
    /// An override holds a value of the wrong type.
    Invalid { key: String, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => write!(f, "cannot read {path}: {source}"),
            ConfigError::Parse { path, message } => write!(f, "cannot parse {path}: {message}"),
            ConfigError::Invalid { key, value } => {
                write!(f, "override {key} has unusable value '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            _ => None,
        }
    }
}

// On-disk shape. Every knob is optional so a file (or a profile overlay)
// may state only what it changes; `Settings::from_raw` fills the defaults.

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
struct RawSettings {
    service: ServiceSection,
    server: ServerSection,
    auth: AuthSection,
    cache: CacheSection,
    search: SearchSection,
    backfill: BackfillSection,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
struct ServiceSection {
    name: Option<String>,
    major: Option<u32>,
    minor: Option<u32>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
struct ServerSection {
    address: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
struct AuthSection {
    default_realm: Option<String>,
    token_ttl: Option<u64>,
    refresh_rbac_interval: Option<u64>,
    refresh_info_interval: Option<u64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
struct CacheSection {
    expire: Option<u64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
struct SearchSection {
    expire: Option<i64>,
    shards: Option<u32>,
    replicas: Option<u32>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
struct BackfillSection {
    workers: Option<usize>,
    capacity: Option<usize>,
}

impl RawSettings {
    /// Knob-wise overlay: anything the profile file states wins.
    fn overlay(self, top: RawSettings) -> RawSettings {
        RawSettings {
            service: ServiceSection {
                name: top.service.name.or(self.service.name),
                major: top.service.major.or(self.service.major),
                minor: top.service.minor.or(self.service.minor),
            },
            server: ServerSection {
                address: top.server.address.or(self.server.address),
            },
            auth: AuthSection {
                default_realm: top.auth.default_realm.or(self.auth.default_realm),
                token_ttl: top.auth.token_ttl.or(self.auth.token_ttl),
                refresh_rbac_interval: top
                    .auth
                    .refresh_rbac_interval
                    .or(self.auth.refresh_rbac_interval),
                refresh_info_interval: top
                    .auth
                    .refresh_info_interval
                    .or(self.auth.refresh_info_interval),
            },
            cache: CacheSection {
                expire: top.cache.expire.or(self.cache.expire),
            },
            search: SearchSection {
                expire: top.search.expire.or(self.search.expire),
                shards: top.search.shards.or(self.search.shards),
                replicas: top.search.replicas.or(self.search.replicas),
            },
            backfill: BackfillSection {
                workers: top.backfill.workers.or(self.backfill.workers),
                capacity: top.backfill.capacity.or(self.backfill.capacity),
            },
        }
    }
}

fn parse_sections(content: &str, origin: &str) -> Result<RawSettings, ConfigError> {
    serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
        path: origin.to_string(),
        message: e.to_string(),
    })
}

fn read_sections(path: &Path) -> Result<Option<RawSettings>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_sections(&content, &path.display().to_string()).map(Some)
}

/// Typed settings consumed across the workspace, resolved once at startup.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Service name; first segment of every materialized path.
    pub service: String,
    pub major: u32,
    pub minor: u32,
    /// Bind address for the HTTP listener.
    pub address: String,
    /// Tenant used when a request names none.
    pub default_realm: String,
    /// Seconds a resolved token stays in the process-local memo.
    pub token_ttl: u64,
    /// Default cache TTL (seconds) for schemas that set none.
    pub cache_expire: u64,
    /// Default search retention (seconds).
    pub search_expire: i64,
    pub search_shards: u32,
    pub search_replicas: u32,
    /// Seconds between policy snapshot refreshes.
    pub refresh_rbac_interval: u64,
    /// Seconds between AuthInfo memo evictions.
    pub refresh_info_interval: u64,
    /// Concurrent backfill tasks.
    pub backfill_workers: usize,
    /// Queued backfill tasks before new ones are dropped.
    pub backfill_capacity: usize,
}

impl Settings {
    /// Resolve settings for a profile: `service.yaml`, then
    /// `service-<profile>.yaml` on top, then the `STRATA_*` environment
    /// overrides. `STRATA_PROFILE` beats the `profile` argument.
    pub fn load(profile: &str) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let profile = std::env::var("STRATA_PROFILE").unwrap_or_else(|_| profile.to_string());

        let mut raw = read_sections(Path::new("service.yaml"))?.unwrap_or_default();
        let profile_path = format!("service-{profile}.yaml");
        if let Some(overlay) = read_sections(Path::new(&profile_path))? {
            raw = raw.overlay(overlay);
        }

        let mut settings = Settings::from_raw(raw);
        settings.override_from(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Parse one YAML document, no files and no environment involved.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        parse_sections(content, "<inline>").map(Settings::from_raw)
    }

    fn from_raw(raw: RawSettings) -> Settings {
        Settings {
            service: raw.service.name.unwrap_or_else(|| "strata".to_string()),
            major: raw.service.major.unwrap_or(1),
            minor: raw.service.minor.unwrap_or(0),
            address: raw
                .server
                .address
                .unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            default_realm: raw
                .auth
                .default_realm
                .unwrap_or_else(|| "default".to_string()),
            token_ttl: raw.auth.token_ttl.unwrap_or(300),
            cache_expire: raw.cache.expire.unwrap_or(3600),
            search_expire: raw.search.expire.unwrap_or(7 * 24 * 3600),
            search_shards: raw.search.shards.unwrap_or(1),
            search_replicas: raw.search.replicas.unwrap_or(0),
            refresh_rbac_interval: raw.auth.refresh_rbac_interval.unwrap_or(30),
            refresh_info_interval: raw.auth.refresh_info_interval.unwrap_or(300),
            backfill_workers: raw.backfill.workers.unwrap_or(4),
            backfill_capacity: raw.backfill.capacity.unwrap_or(1024),
        }
    }

    /// Apply the `STRATA_*` overrides through a lookup: the process
    /// environment in production, a plain map in tests.
    pub fn override_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(name) = lookup("STRATA_SERVICE_NAME") {
            self.service = name;
        }
        if let Some(address) = lookup("STRATA_SERVER_ADDRESS") {
            self.address = address;
        }
        if let Some(realm) = lookup("STRATA_DEFAULT_REALM") {
            self.default_realm = realm;
        }
        self.major = parsed(&lookup, "STRATA_SERVICE_MAJOR", self.major)?;
        self.minor = parsed(&lookup, "STRATA_SERVICE_MINOR", self.minor)?;
        self.token_ttl = parsed(&lookup, "STRATA_TOKEN_TTL", self.token_ttl)?;
        self.cache_expire = parsed(&lookup, "STRATA_CACHE_EXPIRE", self.cache_expire)?;
        self.search_expire = parsed(&lookup, "STRATA_SEARCH_EXPIRE", self.search_expire)?;
        self.search_shards = parsed(&lookup, "STRATA_SEARCH_SHARDS", self.search_shards)?;
        self.search_replicas = parsed(&lookup, "STRATA_SEARCH_REPLICAS", self.search_replicas)?;
        self.refresh_rbac_interval = parsed(
            &lookup,
            "STRATA_REFRESH_RBAC_INTERVAL",
            self.refresh_rbac_interval,
        )?;
        self.refresh_info_interval = parsed(
            &lookup,
            "STRATA_REFRESH_INFO_INTERVAL",
            self.refresh_info_interval,
        )?;
        self.backfill_workers = parsed(&lookup, "STRATA_BACKFILL_WORKERS", self.backfill_workers)?;
        self.backfill_capacity =
            parsed(&lookup, "STRATA_BACKFILL_CAPACITY", self.backfill_capacity)?;
        Ok(())
    }
}

fn parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    current: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(current),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value,
        }),
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings::from_raw(RawSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.service, "strata");
        assert_eq!(settings.major, 1);
        assert_eq!(settings.address, "0.0.0.0:8080");
        assert_eq!(settings.default_realm, "default");
        assert_eq!(settings.refresh_rbac_interval, 30);
        assert_eq!(settings.backfill_workers, 4);
    }

    #[test]
    fn test_from_yaml_sections() {
        let settings = Settings::from_yaml(
            r#"
service:
  name: inventory
  major: 3
auth:
  token_ttl: 60
cache:
  expire: 600
"#,
        )
        .unwrap();
        assert_eq!(settings.service, "inventory");
        assert_eq!(settings.major, 3);
        assert_eq!(settings.token_ttl, 60);
        assert_eq!(settings.cache_expire, 600);
        // Unstated knobs keep their defaults.
        assert_eq!(settings.minor, 0);
        assert_eq!(settings.search_shards, 1);
    }

    #[test]
    fn test_bad_yaml_is_a_parse_error() {
        let err = Settings::from_yaml("service: [not, a, section]").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_profile_overlay_wins_per_knob() {
        let base = parse_sections(
            r#"
service:
  name: inventory
cache:
  expire: 600
"#,
            "base",
        )
        .unwrap();
        let profile = parse_sections(
            r#"
cache:
  expire: 30
"#,
            "profile",
        )
        .unwrap();

        let settings = Settings::from_raw(base.overlay(profile));
        assert_eq!(settings.service, "inventory");
        assert_eq!(settings.cache_expire, 30);
    }

    #[test]
    fn test_environment_overrides() {
        let vars = std::collections::HashMap::from([
            ("STRATA_SERVICE_NAME", "edge"),
            ("STRATA_TOKEN_TTL", "15"),
            ("STRATA_BACKFILL_WORKERS", "8"),
        ]);
        let mut settings = Settings::default();
        settings
            .override_from(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(settings.service, "edge");
        assert_eq!(settings.token_ttl, 15);
        assert_eq!(settings.backfill_workers, 8);
        assert_eq!(settings.minor, 0);
    }

    #[test]
    fn test_unusable_override_is_rejected() {
        let mut settings = Settings::default();
        let err = settings
            .override_from(|key| (key == "STRATA_TOKEN_TTL").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key, .. } if key == "STRATA_TOKEN_TTL"));
    }
}
