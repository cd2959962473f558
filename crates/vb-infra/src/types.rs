use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Opaque runtime-side container handle, as printed by `run -d`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(pub String);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// OS images a VPS can be deployed from. Each image ships `tmate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OsImage {
    #[serde(rename = "ubuntu-tmate")]
    Ubuntu,
    #[serde(rename = "debian-tmate")]
    Debian,
}

impl OsImage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ubuntu => "ubuntu-tmate",
            Self::Debian => "debian-tmate",
        }
    }
}

impl fmt::Display for OsImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OsImage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "ubuntu-tmate" => Ok(Self::Ubuntu),
            "debian-tmate" => Ok(Self::Debian),
            other => Err(Error::UnknownImage(other.to_string())),
        }
    }
}
