//! Client fingerprint sent with submissions for backend deduplication.
//!
//! Not a credential: it only needs to be stable for one client environment.

use std::fmt::Write;

use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientEnvironment {
    pub user_agent: String,
    pub locale: String,
    /// Width and height in pixels, when there is a screen to speak of.
    pub screen: Option<(u32, u32)>,
    pub color_depth: Option<u32>,
    pub timezone: String,
}

impl ClientEnvironment {
    /// Gather what a headless process can know about itself.
    pub fn detect() -> Self {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
        Self {
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
            locale: env("LC_ALL").or_else(|| env("LANG")).unwrap_or_default(),
            screen: None,
            color_depth: None,
            timezone: env("TZ").unwrap_or_default(),
        }
    }

    fn components(&self) -> [String; 5] {
        [
            self.user_agent.clone(),
            self.locale.clone(),
            self.screen
                .map(|(width, height)| format!("{width}x{height}"))
                .unwrap_or_default(),
            self.color_depth.map(|d| d.to_string()).unwrap_or_default(),
            self.timezone.clone(),
        ]
    }
}

/// SHA-256 hex over the environment components.
///
/// An environment with nothing to hash yields [`fallback_token`] instead, so
/// fingerprinting never blocks a submission.
pub fn fingerprint(environment: &ClientEnvironment) -> String {
    let components = environment.components();
    if components.iter().all(String::is_empty) {
        return fallback_token();
    }

    let mut hasher = Sha256::new();
    hasher.update(components.join("||").as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest.iter() {
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

/// Random-but-unique token: `{unix_millis}_{8 hex chars}`.
pub fn fallback_token() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{}_{}", Utc::now().timestamp_millis(), &random[..8])
}
