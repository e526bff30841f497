//! Computing sites and analyses

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tier-2 site a job can run at or save output to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    Lpc,
    Ucsd,
}

impl Site {
    /// XRootD redirector prefix for the site's storage
    pub fn redirector(&self) -> &'static str {
        match self {
            Site::Lpc => "root://cmseos.fnal.gov//",
            Site::Ucsd => "root://redirector.t2.ucsd.edu:1095//",
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Site::Lpc => f.write_str("lpc"),
            Site::Ucsd => f.write_str("ucsd"),
        }
    }
}

impl FromStr for Site {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lpc" => Ok(Site::Lpc),
            "ucsd" => Ok(Site::Ucsd),
            other => Err(format!("unknown site '{}' (expected lpc or ucsd)", other)),
        }
    }
}

/// Analysis, which determines the repository jobs check out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Analysis {
    Bbbb,
    Bbtautau,
}

impl Analysis {
    /// Repository name under the owning user/organisation
    pub fn repo_name(&self) -> &'static str {
        match self {
            Analysis::Bbbb => "HH4b",
            Analysis::Bbtautau => "bbtautau",
        }
    }
}

impl fmt::Display for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Analysis::Bbbb => f.write_str("bbbb"),
            Analysis::Bbtautau => f.write_str("bbtautau"),
        }
    }
}

impl FromStr for Analysis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bbbb" => Ok(Analysis::Bbbb),
            "bbtautau" => Ok(Analysis::Bbtautau),
            other => Err(format!(
                "unknown analysis '{}' (expected bbbb or bbtautau)",
                other
            )),
        }
    }
}
