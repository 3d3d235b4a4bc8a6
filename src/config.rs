use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};

use crate::rate_limit::RateLimitConfig;
use crate::social::FollowPolicy;

pub const MIN_SECRET_LEN: usize = 32;

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: String,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub frontend_url: String,
    /// When set, the in-memory store snapshots into this directory.
    pub data_dir: Option<PathBuf>,
    pub follow_policy: FollowPolicy,
    pub redis_url: Option<String>,
    pub rate_limit_enabled: bool,
    pub rate_limits: RateLimitConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_vars<F>(var: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = var("JWT_SECRET").ok_or_else(|| anyhow!("JWT_SECRET must be set"))?;
        if jwt_secret.len() < MIN_SECRET_LEN {
            bail!("JWT_SECRET must be at least {MIN_SECRET_LEN} characters long");
        }

        let ttl_hours: i64 = parse_or(&var, "TOKEN_TTL_HOURS", 24)?;
        if ttl_hours <= 0 {
            bail!("TOKEN_TTL_HOURS must be positive");
        }

        let secs = |name: &str, default: u64| -> anyhow::Result<Duration> {
            Ok(Duration::from_secs(parse_or(&var, name, default)?))
        };
        let rate_limits = RateLimitConfig {
            login_limit: parse_or(&var, "RL_LOGIN_LIMIT", 10)?,
            login_window: secs("RL_LOGIN_WINDOW", 60)?,
            register_limit: parse_or(&var, "RL_REGISTER_LIMIT", 5)?,
            register_window: secs("RL_REGISTER_WINDOW", 3600)?,
        };

        Ok(Self {
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            jwt_secret,
            token_ttl: chrono::Duration::hours(ttl_hours),
            frontend_url: var("FRONTEND_URL").unwrap_or_else(|| "http://localhost:5173".to_string()),
            data_dir: var("LINKEDOUT_DATA_DIR").filter(|v| !v.is_empty()).map(PathBuf::from),
            follow_policy: FollowPolicy {
                require_existing_target: parse_bool_or(&var, "FOLLOW_REQUIRE_EXISTING_TARGET", true)?,
            },
            redis_url: var("REDIS_URL").filter(|v| !v.is_empty()),
            rate_limit_enabled: parse_bool_or(&var, "RATE_LIMIT_ENABLED", true)?,
            rate_limits,
        })
    }
}

fn parse_or<F, T>(var: &F, name: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(name) {
        Some(raw) => raw.trim().parse().with_context(|| format!("invalid value for {name}: '{raw}'")),
        None => Ok(default),
    }
}

fn parse_bool_or<F>(var: &F, name: &str, default: bool) -> anyhow::Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match var(name).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if v == "1" || v == "true" || v == "yes" => Ok(true),
        Some(v) if v == "0" || v == "false" || v == "no" => Ok(false),
        Some(v) => bail!("invalid boolean for {name}: '{v}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "test-secret-must-be-32-bytes-long!!";

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply() {
        let cfg = Config::from_vars(lookup(&[("JWT_SECRET", SECRET)])).unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080");
        assert_eq!(cfg.token_ttl, chrono::Duration::hours(24));
        assert!(cfg.follow_policy.require_existing_target);
        assert!(cfg.rate_limit_enabled);
        assert_eq!(cfg.rate_limits.login_limit, 10);
        assert!(cfg.data_dir.is_none());
        assert!(cfg.redis_url.is_none());
    }

    #[test]
    fn secret_is_required_and_long() {
        assert!(Config::from_vars(lookup(&[])).is_err());
        assert!(Config::from_vars(lookup(&[("JWT_SECRET", "short")])).is_err());
    }

    #[test]
    fn overrides_and_bad_values() {
        let cfg = Config::from_vars(lookup(&[
            ("JWT_SECRET", SECRET),
            ("TOKEN_TTL_HOURS", "2"),
            ("FOLLOW_REQUIRE_EXISTING_TARGET", "false"),
            ("RL_LOGIN_WINDOW", "5"),
            ("LINKEDOUT_DATA_DIR", "/tmp/lo"),
        ]))
        .unwrap();
        assert_eq!(cfg.token_ttl, chrono::Duration::hours(2));
        assert!(!cfg.follow_policy.require_existing_target);
        assert_eq!(cfg.rate_limits.login_window, Duration::from_secs(5));
        assert_eq!(cfg.data_dir, Some(PathBuf::from("/tmp/lo")));

        let err = Config::from_vars(lookup(&[("JWT_SECRET", SECRET), ("TOKEN_TTL_HOURS", "soon")]));
        assert!(err.is_err());
        let err = Config::from_vars(lookup(&[("JWT_SECRET", SECRET), ("RATE_LIMIT_ENABLED", "maybe")]));
        assert!(err.is_err());
    }
}
