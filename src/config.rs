//! Process configuration.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::TimeDelta;
use clap::Parser;

use crate::session::DEFAULT_LIFETIME_HOURS;

/// Key material that never shows up in `Debug` output or logs.
#[derive(Clone, Default)]
pub struct Secret(String);

impl Secret {
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(\"[REDACTED]\")")
    }
}

impl std::str::FromStr for Secret {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

#[derive(Clone, Debug, Parser)]
#[command(name = "snippetbox", version, about = "Share text snippets")]
pub struct Config {
    /// Address to listen on.
    #[arg(long, env = "SNIPPETBOX_ADDR", default_value = "0.0.0.0:4000")]
    pub addr: SocketAddr,

    /// Write error details and traces into 500 responses.
    #[arg(long)]
    pub debug: bool,

    /// Directory served under /static/.
    #[arg(long, default_value = "./ui/static")]
    pub static_dir: PathBuf,

    /// HMAC key for CSRF tokens. A random key is generated when unset, which
    /// invalidates every open form on restart.
    #[arg(long, env = "SNIPPETBOX_SECRET", hide_env_values = true)]
    pub secret: Option<Secret>,

    /// Send cookies without `Secure`, for plain-HTTP local development.
    #[arg(long)]
    pub insecure_cookies: bool,

    /// Session lifetime, counted from login or creation.
    #[arg(long, default_value_t = DEFAULT_LIFETIME_HOURS, value_parser = clap::value_parser!(i64).range(1..))]
    pub session_lifetime_hours: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 4000)),
            debug: false,
            static_dir: PathBuf::from("./ui/static"),
            secret: None,
            insecure_cookies: false,
            session_lifetime_hours: DEFAULT_LIFETIME_HOURS,
        }
    }
}

impl Config {
    /// The configured CSRF key, or 32 fresh random bytes.
    pub fn secret_bytes(&self) -> Vec<u8> {
        match &self.secret {
            Some(secret) => secret.as_bytes().to_vec(),
            None => rand::random::<[u8; 32]>().to_vec(),
        }
    }

    pub fn session_lifetime(&self) -> TimeDelta {
        TimeDelta::hours(self.session_lifetime_hours)
    }

    pub fn secure_cookies(&self) -> bool {
        !self.insecure_cookies
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from([
            "snippetbox",
            "--addr", "127.0.0.1:8080",
            "--debug",
            "--insecure-cookies",
            "--session-lifetime-hours", "1",
            "--secret", "s3cr3t",
        ])
        .expect("valid flags");

        assert_eq!(config.addr, SocketAddr::from(([127, 0, 0, 1], 8080)));
        assert!(config.debug);
        assert!(!config.secure_cookies());
        assert_eq!(config.session_lifetime(), TimeDelta::hours(1));
        assert_eq!(config.secret_bytes(), b"s3cr3t");
    }

    #[test]
    fn lifetime_must_be_positive() {
        assert!(Config::try_parse_from(["snippetbox", "--session-lifetime-hours", "0"]).is_err());
    }

    #[test]
    fn secret_is_redacted() {
        let secret: Secret = "hunter2".parse().expect("infallible");
        assert!(!format!("{secret:?}").contains("hunter2"));
    }

    #[test]
    fn missing_secret_is_random() {
        let config = Config::default();
        assert_eq!(config.secret_bytes().len(), 32);
        assert_ne!(config.secret_bytes(), config.secret_bytes());
    }
}
