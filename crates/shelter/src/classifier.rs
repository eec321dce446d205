//! # Resource Classifier
//!
//! Maps a request URL to the class that selects its caching strategy. The
//! rules are plain data evaluated in order; the first match wins.

use std::fmt;

use serde::Serialize;
use url::Url;

use crate::EngineConfig;
use crate::cache::PartitionRole;
use crate::strategy::Strategy;

/// Category of a request URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceClass {
    /// Pre-registered static file
    Static,
    Image,
    NetworkFirst,
    Default,
}

impl ResourceClass {
    /// Strategy and partition used for this class
    pub fn route(&self) -> (Strategy, PartitionRole) {
        match self {
            ResourceClass::Static => (Strategy::CacheFirst, PartitionRole::Static),
            ResourceClass::Image => (Strategy::CacheFirst, PartitionRole::Image),
            ResourceClass::NetworkFirst => (Strategy::NetworkFirst, PartitionRole::Dynamic),
            ResourceClass::Default => (Strategy::StaleWhileRevalidate, PartitionRole::Dynamic),
        }
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceClass::Static => "static",
            ResourceClass::Image => "image",
            ResourceClass::NetworkFirst => "network-first",
            ResourceClass::Default => "default",
        };
        f.write_str(name)
    }
}

/// How a rule matches a URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    /// Same origin and identical path. The query string is ignored.
    ExactPath { origin: url::Origin, path: String },
    /// The URL text contains the substring
    Contains(String),
}

impl Matcher {
    fn matches(&self, raw: &str, parsed: Option<&Url>) -> bool {
        match self {
            Matcher::ExactPath { origin, path } => {
                parsed.is_some_and(|url| &url.origin() == origin && url.path() == path)
            }
            Matcher::Contains(needle) => match parsed {
                Some(url) => url.as_str().contains(needle.as_str()) || raw.contains(needle.as_str()),
                None => raw.contains(needle.as_str()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRule {
    pub matcher: Matcher,
    pub class: ResourceClass,
}

impl ClassificationRule {
    pub fn new(matcher: Matcher, class: ResourceClass) -> Self {
        Self { matcher, class }
    }
}

/// Ordered rule list plus the base URL relative requests are resolved against
#[derive(Debug, Clone)]
pub struct Classifier {
    base: Url,
    rules: Vec<ClassificationRule>,
}

impl Classifier {
    pub fn new(base: Url, rules: Vec<ClassificationRule>) -> Self {
        Self { base, rules }
    }

    /// Build the rules from configuration: static paths, then image
    /// substrings, then network-first substrings.
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut rules = Vec::with_capacity(
            config.static_files.len()
                + config.image_patterns.len()
                + config.network_first_patterns.len(),
        );

        for file in &config.static_files {
            match config.resolve(file) {
                Ok(url) => rules.push(ClassificationRule::new(
                    Matcher::ExactPath {
                        origin: url.origin(),
                        path: url.path().to_owned(),
                    },
                    ResourceClass::Static,
                )),
                Err(e) => tracing::warn!(file = %file, error = %e, "Skipping unresolvable static path"),
            }
        }

        rules.extend(config.image_patterns.iter().map(|p| {
            ClassificationRule::new(Matcher::Contains(p.clone()), ResourceClass::Image)
        }));
        rules.extend(config.network_first_patterns.iter().map(|p| {
            ClassificationRule::new(Matcher::Contains(p.clone()), ResourceClass::NetworkFirst)
        }));

        Self::new(config.origin.clone(), rules)
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// Classify a URL, absolute or relative to the base
    pub fn classify(&self, url: &str) -> ResourceClass {
        let parsed = self.base.join(url).ok();
        self.classify_parsed(url, parsed.as_ref())
    }

    /// Classify an already parsed URL
    pub fn classify_url(&self, url: &Url) -> ResourceClass {
        self.classify_parsed(url.as_str(), Some(url))
    }

    fn classify_parsed(&self, raw: &str, parsed: Option<&Url>) -> ResourceClass {
        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(raw, parsed))
            .map(|rule| rule.class)
            .unwrap_or(ResourceClass::Default)
    }
}
