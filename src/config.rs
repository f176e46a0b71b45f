use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub url: String,
    pub sweep_interval_secs: u64,
}

#[derive(Clone, Deserialize)]
pub struct AuthConfig {
    pub token_secret: String,
    pub token_ttl_secs: i64,
    pub csrf_ttl_secs: i64,
    pub bcrypt_cost: u32,
}

// Keep the secret out of logs and panic messages.
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token_secret", &"<redacted>")
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("csrf_ttl_secs", &self.csrf_ttl_secs)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .finish()
    }
}

/// How bearer tokens are minted and checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenScheme {
    /// Random string backed by a server-side session record.
    Opaque,
    /// Self-contained HMAC-SHA256 signed token.
    Signed,
}

/// A sliding-window budget: at most `max_requests` within the trailing `window_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RateLimit {
    pub max_requests: usize,
    pub window_ms: i64,
}

impl RateLimit {
    pub const fn new(max_requests: usize, window_ms: i64) -> Self {
        Self { max_requests, window_ms }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimits {
    /// Applied to every request except preflight and health, keyed by client id.
    pub global: RateLimit,
    /// Applied to register/login, keyed by `auth:<client id>`.
    pub auth: RateLimit,
    /// Applied to public submissions, keyed by `form:<form id>:<client id>`.
    pub submission: RateLimit,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            global: RateLimit::new(100, 60_000),
            auth: RateLimit::new(5, 60_000),
            submission: RateLimit::new(10, 60_000),
        }
    }
}

/// Knobs that used to be spread across several middleware variants.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityPolicy {
    pub token_scheme: TokenScheme,
    pub enforce_csrf: bool,
    pub rate_limits: RateLimits,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allow_origin: String,
    pub max_age_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SecurityConfig {
    pub hsts_max_age: Option<u64>,
    pub hsts_include_subdomains: Option<bool>,
    pub csp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub policy: SecurityPolicy,
    pub cors: CorsConfig,
    pub security: Option<SecurityConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        // Fallback: parse the embedded default TOML
        let defaults: &str = include_str!("../config/default.toml");
        match ::config::Config::builder()
            .add_source(::config::File::from_str(defaults, ::config::FileFormat::Toml))
            .build()
        {
            Ok(cfg) => match cfg.try_deserialize() {
                Ok(app_cfg) => app_cfg,
                Err(e) => {
                    eprintln!("FATAL: Failed to deserialize default config: {}", e);
                    panic!("Failed to deserialize default config: {}", e);
                }
            },
            Err(e) => {
                eprintln!("FATAL: Failed to parse default config: {}", e);
                panic!("Failed to parse default config: {}", e);
            }
        }
    }
}

pub fn load() -> anyhow::Result<AppConfig> {
    // Load .env first (optional)
    let _ = dotenvy::dotenv();

    let defaults: &str = include_str!("../config/default.toml");
    let mut builder = ::config::Config::builder()
        .add_source(::config::File::from_str(defaults, ::config::FileFormat::Toml))
        // Optional local file: formgate.toml (in CWD)
        .add_source(::config::File::with_name("formgate").required(false));

    if let Ok(custom_path) = std::env::var("FORMGATE_CONFIG") {
        builder = builder.add_source(::config::File::with_name(&custom_path).required(false));
    }
    // Environment variables last to have highest precedence
    builder = builder.add_source(::config::Environment::with_prefix("FORMGATE").separator("__"));

    let cfg = builder.build()?;
    let app_cfg: AppConfig = cfg.try_deserialize()?;
    validate(&app_cfg)?;
    Ok(app_cfg)
}

/// Minimum secret length for HMAC signing, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

pub fn validate(cfg: &AppConfig) -> anyhow::Result<()> {
    // Server
    if cfg.server.port == 0 {
        return Err(anyhow::anyhow!("invalid server.port: {}", cfg.server.port));
    }
    #[cfg(unix)]
    if cfg.server.port < 1024 {
        tracing::warn!("Using privileged port {} - may require elevated permissions", cfg.server.port);
    }

    // Storage
    if cfg.storage.backend == StorageBackend::Sqlite && cfg.storage.url.trim().is_empty() {
        return Err(anyhow::anyhow!("storage.url must be set for the sqlite backend"));
    }
    if cfg.storage.sweep_interval_secs == 0 {
        return Err(anyhow::anyhow!("storage.sweep_interval_secs must be > 0"));
    }

    // Auth
    if cfg.policy.token_scheme == TokenScheme::Signed && cfg.auth.token_secret.len() < MIN_SECRET_LEN {
        return Err(anyhow::anyhow!(
            "auth.token_secret must be at least {} bytes (set FORMGATE__AUTH__TOKEN_SECRET)",
            MIN_SECRET_LEN
        ));
    }
    if cfg.auth.token_ttl_secs <= 0 {
        return Err(anyhow::anyhow!("auth.token_ttl_secs must be > 0"));
    }
    if cfg.auth.csrf_ttl_secs <= 0 {
        return Err(anyhow::anyhow!("auth.csrf_ttl_secs must be > 0"));
    }
    if !(4..=31).contains(&cfg.auth.bcrypt_cost) {
        return Err(anyhow::anyhow!("auth.bcrypt_cost must be in 4..=31"));
    }

    // Rate limits
    let limits = &cfg.policy.rate_limits;
    for (name, limit) in [("global", limits.global), ("auth", limits.auth), ("submission", limits.submission)] {
        if limit.max_requests == 0 {
            return Err(anyhow::anyhow!("policy.rate_limits.{}.max_requests must be > 0", name));
        }
        if limit.window_ms <= 0 {
            return Err(anyhow::anyhow!("policy.rate_limits.{}.window_ms must be > 0", name));
        }
    }

    Ok(())
}

pub fn ensure_sqlite_parent_dir(url: &str) -> anyhow::Result<()> {
    if let Some(path) = url.strip_prefix("sqlite://") {
        let p = Path::new(path);
        if let Some(parent) = p.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }
    Ok(())
}
