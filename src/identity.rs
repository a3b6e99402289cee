use std::{
    fmt, fs,
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::Context;
use rand::Rng;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Whoever spends tokens: a signed-in user, or an anonymous device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    User(String),
    Device(String),
}

impl Identity {
    /// Ledger rows are keyed by kind as well as id, so a user id can never
    /// collide with a device id.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Device(_) => "device",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::User(id) | Self::Device(id) => id,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::User(id) => Some(id),
            Self::Device(_) => None,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

/// `device_<unix millis>_<9 base36 chars>`
pub fn new_device_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("device_{millis}_{suffix}")
}

/// Reads the device id persisted at `path`, creating it on first use.
pub fn load_or_create_device_id<P: AsRef<Path>>(
    path: P,
) -> anyhow::Result<String> {
    let path = path.as_ref();
    if fs::exists(path)? {
        let stored = fs::read_to_string(path)
            .context(format!("Failed to read device id from {path:?}"))?;
        let stored = stored.trim();
        if !stored.is_empty() {
            return Ok(stored.to_string());
        }
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context(format!(
            "Failed to create parent directory for device id: {path:?}"
        ))?;
    }
    let id = new_device_id();
    fs::write(path, &id)
        .context(format!("Failed to write device id to {path:?}"))?;
    tracing::info!(device_id = id, ?path, "Created device id.");
    Ok(id)
}
