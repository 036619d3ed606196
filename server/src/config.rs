// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::net::{IpAddr, SocketAddr};

use anyhow::{Context, Result};

const DEFAULT_DB_URL: &str = "sqlite://database/sqlite.db";

/// Server configuration loaded from environment variables.
///
/// | Env Var        | Default                       |
/// |----------------|-------------------------------|
/// | `DATABASE_URL` | `sqlite://database/sqlite.db` |
/// | `HOST`         | `0.0.0.0`                     |
/// | `PORT`         | `3000`                        |
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub host: IpAddr,
    pub port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DB_URL.to_string());

        let host = lookup("HOST")
            .unwrap_or_else(|| "0.0.0.0".into())
            .parse()
            .context("HOST must be a valid IP address")?;

        let port = lookup("PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("PORT must be a valid u16")?;

        Ok(Self {
            database_url,
            host,
            port,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
