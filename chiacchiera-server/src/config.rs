//! Runtime configuration, read from the environment.

use anyhow::Context;
use std::net::SocketAddr;

use crate::build_sqlite_url;
use crate::service::{PageLimits, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub page_limits: PageLimits,
}

impl Config {
    /// DATABASE_URL, BIND_ADDR, MESSAGES_DEFAULT_LIMIT, MESSAGES_MAX_LIMIT.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = build_sqlite_url().context("build sqlite DATABASE_URL")?;
        let bind = std::env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        let bind_addr: SocketAddr = bind.parse().context("parse BIND_ADDR")?;
        let page_limits = page_limits(
            std::env::var("MESSAGES_DEFAULT_LIMIT").ok().as_deref(),
            std::env::var("MESSAGES_MAX_LIMIT").ok().as_deref(),
        )?;
        Ok(Self { database_url, bind_addr, page_limits })
    }
}

fn parse_limit(name: &str, raw: Option<&str>, default: u64) -> anyhow::Result<u64> {
    match raw {
        None => Ok(default),
        Some(s) => {
            let n: u64 = s.trim().parse().with_context(|| format!("parse {}", name))?;
            anyhow::ensure!(n > 0, "{} must be positive", name);
            Ok(n)
        }
    }
}

fn page_limits(default_raw: Option<&str>, max_raw: Option<&str>) -> anyhow::Result<PageLimits> {
    let default_limit = parse_limit("MESSAGES_DEFAULT_LIMIT", default_raw, DEFAULT_PAGE_LIMIT)?;
    let max_limit = parse_limit("MESSAGES_MAX_LIMIT", max_raw, MAX_PAGE_LIMIT)?;
    anyhow::ensure!(
        default_limit <= max_limit,
        "MESSAGES_DEFAULT_LIMIT ({}) exceeds MESSAGES_MAX_LIMIT ({})",
        default_limit,
        max_limit
    );
    Ok(PageLimits { default_limit, max_limit })
}
