use std::{
    fmt::Debug,
    fs,
    net::IpAddr,
    path::{Path, PathBuf},
    str::FromStr,
    sync::{Arc, LazyLock},
    time::Duration,
};

use anyhow::Context;

pub static GLOBAL: LazyLock<Arc<Conf>> = LazyLock::new(|| {
    let conf = read_or_create_default().unwrap_or_else(|error| {
        panic!("Failed to initialize global config: {error:?}")
    });
    Arc::new(conf)
});

#[must_use]
pub fn global() -> Arc<Conf> {
    (*GLOBAL).clone()
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub struct Conf {
    #[serde(
        serialize_with = "serialize_log_level",
        deserialize_with = "deserialize_log_level"
    )]
    pub log_level: tracing::Level,
    pub addr: IpAddr,
    pub port: u16,
    pub data_dir: PathBuf,
    pub sqlite_busy_timeout: f32,
    pub history_limit: u32,

    /// URL whose `Date` response header is taken as the current time.
    /// Local clock is used when absent or unreachable.
    pub trusted_clock: Option<String>,

    pub jwt: ConfJwt,
    pub generator: ConfGenerator,
    pub allowance: ConfAllowance,
    pub cost: ConfCost,

    /// Upstream credential. Needed by the proxy route, and used directly
    /// by the generator when no `generator.proxy_url` is set.
    pub gemini: Option<ConfGemini>,

    pub tls: Option<Tls>,
}

impl Default for Conf {
    fn default() -> Self {
        Self {
            log_level: tracing::Level::INFO,
            addr: "127.0.0.1".parse().unwrap_or_else(|_| {
                unreachable!("Fat-fingered default IP address!")
            }),
            port: 3001,
            data_dir: PathBuf::from("data"),
            sqlite_busy_timeout: 60.0,
            history_limit: 5,
            trusted_clock: None,
            jwt: ConfJwt::default(),
            generator: ConfGenerator::default(),
            allowance: ConfAllowance::default(),
            cost: ConfCost::default(),
            gemini: None,
            tls: None,
        }
    }
}

impl Conf {
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("data.db")
    }

    pub fn sqlite_busy_timeout(&self) -> Duration {
        secs(self.sqlite_busy_timeout)
    }

    /// Durations are given in seconds and must be finite and non-negative.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, value) in [
            ("sqlite_busy_timeout", self.sqlite_busy_timeout),
            ("generator.timeout", self.generator.timeout),
            ("generator.offline_delay", self.generator.offline_delay),
        ] {
            Duration::try_from_secs_f32(value)
                .context(format!("Invalid {name}: {value}"))?;
        }
        Ok(())
    }
}

// Only reached with values that passed `Conf::validate`.
fn secs(value: f32) -> Duration {
    Duration::try_from_secs_f32(value).unwrap_or_default()
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub struct Tls {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

#[derive(serde::Serialize, serde::Deserialize, Clone)]
pub struct ConfJwt {
    pub secret: String,
    pub audience: String,
    pub issuer: String,
}

impl Default for ConfJwt {
    fn default() -> Self {
        Self {
            secret: "super-secret".to_string(),
            audience: "authenticated".to_string(),
            issuer: "briefsmith".to_string(),
        }
    }
}

impl Debug for ConfJwt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfJwt")
            .field("secret", &"<XXXXX>")
            .field("audience", &self.audience)
            .field("issuer", &self.issuer)
            .finish()
    }
}

#[derive(serde::Serialize, serde::Deserialize, Clone)]
pub struct ConfGemini {
    pub api_key: String,
    pub base_url: String,
}

impl Default for ConfGemini {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://generativelanguage.googleapis.com/v1"
                .to_string(),
        }
    }
}

impl Debug for ConfGemini {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfGemini")
            .field("api_key", &"<XXXXX>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(serde::Serialize, serde::Deserialize, Clone)]
pub struct ConfGenerator {
    /// Endpoint speaking `{prompt, model} -> {text} | {error}`.
    pub proxy_url: Option<String>,
    pub proxy_auth_token: Option<String>,

    /// Tried in order, first non-empty answer wins.
    pub models: Vec<String>,

    /// Seconds, per model attempt.
    pub timeout: f32,

    /// Seconds to wait before answering with the canned brief when no
    /// provider is configured.
    pub offline_delay: f32,
}

impl Default for ConfGenerator {
    fn default() -> Self {
        Self {
            proxy_url: None,
            proxy_auth_token: None,
            models: [
                "gemini-2.5-flash-lite",
                "gemini-2.0-flash-lite",
                "gemini-2.5-flash",
                "gemini-2.0-flash",
                "gemini-2.0-flash-exp",
                "gemini-2.5-pro",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            timeout: 10.0,
            offline_delay: 1.5,
        }
    }
}

impl ConfGenerator {
    pub fn timeout(&self) -> Duration {
        secs(self.timeout)
    }

    pub fn offline_delay(&self) -> Duration {
        secs(self.offline_delay)
    }
}

impl Debug for ConfGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfGenerator")
            .field("proxy_url", &self.proxy_url)
            .field(
                "proxy_auth_token",
                &self.proxy_auth_token.as_ref().map(|_| "<XXXXX>"),
            )
            .field("models", &self.models)
            .field("timeout", &self.timeout)
            .field("offline_delay", &self.offline_delay)
            .finish()
    }
}

/// Starting balance of a fresh daily ledger row.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Copy)]
pub struct ConfAllowance {
    pub anonymous: u32,
    pub unpaid: u32,
    pub paid: u32,
}

impl Default for ConfAllowance {
    fn default() -> Self {
        Self {
            anonymous: 30,
            unpaid: 30,
            paid: 150,
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Copy)]
pub struct ConfCost {
    pub generate: u32,
    pub pregenerated: u32,
}

impl Default for ConfCost {
    fn default() -> Self {
        Self {
            generate: 10,
            pregenerated: 1,
        }
    }
}

fn serialize_log_level<S>(
    level: &tracing::Level,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let s = level.to_string();
    serializer.serialize_str(&s)
}

fn deserialize_log_level<'de, D>(
    deserializer: D,
) -> Result<tracing::Level, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    let s = String::deserialize(deserializer)?;
    tracing::Level::from_str(&s).map_err(serde::de::Error::custom)
}

pub fn read_or_create_default() -> anyhow::Result<Conf> {
    let path = "conf/conf.toml";
    read_or_create_default_(path).context(path)
}

pub fn read_or_create_default_<P: AsRef<Path>>(
    path: P,
) -> anyhow::Result<Conf> {
    let path = path.as_ref();
    let conf = if fs::exists(path)? {
        let s = fs::read_to_string(path)?;
        toml::from_str(&s)?
    } else {
        if let Some(parent) = path.parent() {
            let ctx = format!(
                "Failed to create parent directory \
                for conf file: {path:?}"
            );
            fs::create_dir_all(parent).context(ctx)?;
        }
        let conf = Conf::default();
        let s = toml::to_string_pretty(&conf)?;
        fs::write(path, s)?;
        conf
    };
    conf.validate()?;
    Ok(conf)
}
