//! # Entity TTL Table
//!
//! Maps entity names to freshness windows and resolves the TTL for a query.
//! A response is only as fresh as the least fresh entity it reads, so the
//! resolver picks the minimum configured duration among the matched entities.
//!
//! The table is written as comma-separated `Entity:Seconds` pairs, for example
//! `User:300,Post:600`, both on the command line and in configuration files.

use crate::core::error::GatewayError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// TTL used when none of a query's entities has a configured duration
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Default table applied when nothing is configured
pub const DEFAULT_CACHE_TIMES: &str = "User:300,Post:600";

/// Per-entity cache durations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityTtls {
    times: HashMap<String, Duration>,
    default_ttl: Duration,
}

impl EntityTtls {
    /// Create a table from explicit entries
    pub fn new(times: HashMap<String, Duration>) -> Self {
        Self {
            times,
            default_ttl: DEFAULT_TTL,
        }
    }

    /// Override the fallback TTL
    pub fn with_default_ttl(mut self, default_ttl: Duration) -> Self {
        self.default_ttl = default_ttl;
        self
    }

    /// Resolve the TTL for a set of entities.
    ///
    /// Returns the smallest duration among entities present in the table, or
    /// the default TTL when none of them is configured.
    pub fn resolve<S: AsRef<str>>(&self, entities: &[S]) -> Duration {
        entities
            .iter()
            .filter_map(|entity| self.times.get(entity.as_ref()))
            .min()
            .copied()
            .unwrap_or(self.default_ttl)
    }

    /// Configured duration for a single entity
    pub fn get(&self, entity: &str) -> Option<Duration> {
        self.times.get(entity).copied()
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

impl Default for EntityTtls {
    fn default() -> Self {
        // The default table literal is always well-formed.
        DEFAULT_CACHE_TIMES
            .parse()
            .unwrap_or_else(|_| Self::new(HashMap::new()))
    }
}

impl FromStr for EntityTtls {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut times = HashMap::new();

        for item in s.split(',') {
            let (entity, seconds) = item.split_once(':').ok_or_else(|| {
                crate::config_error!(
                    "Invalid cache time format: {}. Expected format: Entity:Seconds",
                    item
                )
            })?;

            let entity = entity.trim();
            if entity.is_empty() || seconds.contains(':') {
                return Err(crate::config_error!(
                    "Invalid cache time format: {}. Expected format: Entity:Seconds",
                    item
                ));
            }

            let seconds: u64 = seconds.trim().parse().map_err(|e| {
                crate::config_error!("Invalid cache time for entity {}: {}", entity, e)
            })?;

            times.insert(entity.to_string(), Duration::from_secs(seconds));
        }

        Ok(Self::new(times))
    }
}

impl fmt::Display for EntityTtls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<_> = self.times.iter().collect();
        entries.sort_by_key(|(entity, _)| *entity);

        let rendered: Vec<String> = entries
            .into_iter()
            .map(|(entity, ttl)| format!("{}:{}", entity, ttl.as_secs()))
            .collect();

        write!(f, "{}", rendered.join(","))
    }
}

impl Serialize for EntityTtls {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EntityTtls {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
