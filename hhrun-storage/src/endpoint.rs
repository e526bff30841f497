//! Storage endpoint addressing

use std::fmt;
use std::path::PathBuf;

const XROOTD_SCHEMES: [&str; 2] = ["root://", "roots://"];

/// A configured storage endpoint prefix
///
/// XRootD prefixes look like `root://host[:port]//base/`; anything else is
/// treated as a directory on a mounted filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    prefix: String,
}

impl Endpoint {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// The prefix as configured
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn is_xrootd(&self) -> bool {
        XROOTD_SCHEMES.iter().any(|s| self.prefix.starts_with(s))
    }

    /// Server part of an XRootD prefix, e.g. `root://cmseos.fnal.gov`
    pub fn server(&self) -> Option<&str> {
        let (server, _) = self.split_xrootd()?;
        Some(server)
    }

    /// Absolute path on the XRootD server for a path relative to the prefix
    pub fn abs_path(&self, path: &str) -> Option<String> {
        let (_, base) = self.split_xrootd()?;
        let base = base.trim_matches('/');
        let path = path.trim_start_matches('/');

        Some(match (base.is_empty(), path.is_empty()) {
            (true, _) => format!("/{}", path),
            (false, true) => format!("/{}", base),
            (false, false) => format!("/{}/{}", base, path),
        })
    }

    /// Full XRootD URL for a path relative to the prefix
    pub fn url(&self, path: &str) -> Option<String> {
        let server = self.server()?;
        let abs = self.abs_path(path)?;
        Some(format!("{}/{}", server, abs))
    }

    /// Local directory for a mounted-filesystem prefix
    pub fn local_root(&self) -> Option<PathBuf> {
        if self.is_xrootd() {
            return None;
        }
        let path = self.prefix.strip_prefix("file://").unwrap_or(&self.prefix);
        Some(PathBuf::from(path))
    }

    fn split_xrootd(&self) -> Option<(&str, &str)> {
        let scheme = XROOTD_SCHEMES
            .iter()
            .find(|s| self.prefix.starts_with(*s))?;
        let rest = &self.prefix[scheme.len()..];
        let host_len = rest.find('/').unwrap_or(rest.len());
        if host_len == 0 {
            return None;
        }
        let split = scheme.len() + host_len;
        Some((&self.prefix[..split], &self.prefix[split..]))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix)
    }
}

impl From<&str> for Endpoint {
    fn from(prefix: &str) -> Self {
        Self::new(prefix)
    }
}

impl From<String> for Endpoint {
    fn from(prefix: String) -> Self {
        Self::new(prefix)
    }
}
