//! Versioned artifact names
//!
//! Unit directories may carry their version as a trailing `-vX.Y.Z`
//! segment (`nginx-v1.2.3`). A name whose last segment looks like a version
//! is always read as versioned, so a logical name that genuinely ends that
//! way cannot be expressed.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Logical name plus optional version of an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactIdentity {
    pub logical_name: String,
    pub version: Option<String>,
}

impl fmt::Display for ArtifactIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{} {}", self.logical_name, v),
            None => f.write_str(&self.logical_name),
        }
    }
}

static VERSION_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v(\d+\.\d+\.\d+)").unwrap());

/// Split a raw artifact name into logical name and version.
pub fn resolve(raw_name: &str) -> ArtifactIdentity {
    if let Some((head, last)) = raw_name.rsplit_once('-')
        && let Some(caps) = VERSION_SEGMENT.captures(last)
    {
        return ArtifactIdentity {
            logical_name: head.to_string(),
            version: Some(caps[1].to_string()),
        };
    }
    ArtifactIdentity {
        logical_name: raw_name.to_string(),
        version: None,
    }
}
