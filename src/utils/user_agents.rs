//! Candidate User-Agent strings, one picked uniformly at random per request.

use std::path::Path;

use log::warn;
use rand::seq::IndexedRandom;

/// Fallback agents used when the resource file is missing or empty.
const BUILTIN_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
];

/// Loaded User-Agent list.
#[derive(Debug, Clone)]
pub struct UserAgents {
    agents: Vec<String>,
}

impl UserAgents {
    /// Load a newline-delimited agents file, skipping blank lines.
    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let agents: Vec<String> = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        if agents.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "agents list is empty",
            ));
        }
        Ok(Self { agents })
    }

    /// Load from `path`, falling back to the built-in list on any failure.
    #[must_use]
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(agents) => agents,
            Err(err) => {
                warn!(
                    "Could not load agents list from {}: {err}. Using built-in agents.",
                    path.display()
                );
                Self::default()
            }
        }
    }

    /// Pick one agent uniformly at random.
    #[must_use]
    pub fn pick(&self) -> &str {
        self.agents
            .choose(&mut rand::rng())
            .map_or(BUILTIN_AGENTS[0], String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl Default for UserAgents {
    fn default() -> Self {
        Self {
            agents: BUILTIN_AGENTS.iter().map(ToString::to_string).collect(),
        }
    }
}
