use anyhow::Context;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Forecast lead time in hours
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Horizon(pub u32);

impl Horizon {
    pub fn hours(&self) -> u32 {
        self.0
    }

    pub fn duration(&self) -> Duration {
        Duration::hours(i64::from(self.0))
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}h", self.0)
    }
}

impl FromStr for Horizon {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_suffix('h').unwrap_or(trimmed);
        let hours: u32 = digits
            .parse()
            .with_context(|| format!("Invalid horizon '{}'", s))?;
        if hours == 0 {
            anyhow::bail!("Horizon must be at least 1 hour");
        }
        Ok(Horizon(hours))
    }
}

/// Parse a comma separated horizon list such as `24,48,72h`
pub fn parse_horizons(s: &str) -> anyhow::Result<Vec<Horizon>> {
    let mut horizons = s
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(Horizon::from_str)
        .collect::<anyhow::Result<Vec<_>>>()?;
    horizons.sort();
    horizons.dedup();
    if horizons.is_empty() {
        anyhow::bail!("At least one horizon is required");
    }
    Ok(horizons)
}
