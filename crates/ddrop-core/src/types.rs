use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DropError;
use crate::SHORT_CODE_LEN;

/// An original file in a selection (display and extraction context)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
}

/// A 6-character human-shareable code resolving to a drop.
///
/// Always stored upper-case; lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ShortCode(String);

impl ShortCode {
    pub fn parse(raw: &str) -> Result<Self, DropError> {
        let code = raw.trim().to_ascii_uppercase();
        if code.len() != SHORT_CODE_LEN || !code.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(DropError::InvalidShortCode(raw.to_string()));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShortCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ShortCode {
    type Err = DropError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ShortCode {
    type Error = DropError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ShortCode> for String {
    fn from(code: ShortCode) -> Self {
        code.0
    }
}

/// How long a drop lives before the backend burns it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BurnSchedule {
    Minutes60,
    Hours2,
    Hours6,
    Hours12,
    #[default]
    Hours24,
}

impl BurnSchedule {
    pub const ALL: [BurnSchedule; 5] = [
        BurnSchedule::Minutes60,
        BurnSchedule::Hours2,
        BurnSchedule::Hours6,
        BurnSchedule::Hours12,
        BurnSchedule::Hours24,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            BurnSchedule::Minutes60 => "60min",
            BurnSchedule::Hours2 => "2hrs",
            BurnSchedule::Hours6 => "6hrs",
            BurnSchedule::Hours12 => "12hrs",
            BurnSchedule::Hours24 => "24hrs",
        }
    }

    pub fn duration(&self) -> Duration {
        let hours = match self {
            BurnSchedule::Minutes60 => 1,
            BurnSchedule::Hours2 => 2,
            BurnSchedule::Hours6 => 6,
            BurnSchedule::Hours12 => 12,
            BurnSchedule::Hours24 => 24,
        };
        Duration::from_secs(hours * 3600)
    }
}

impl fmt::Display for BurnSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for BurnSchedule {
    type Err = DropError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|b| b.label() == wanted)
            .ok_or_else(|| {
                DropError::Config(format!(
                    "unknown burn schedule {s:?} (expected one of 60min, 2hrs, 6hrs, 12hrs, 24hrs)"
                ))
            })
    }
}

impl TryFrom<String> for BurnSchedule {
    type Error = DropError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BurnSchedule> for String {
    fn from(b: BurnSchedule) -> Self {
        b.label().to_string()
    }
}

/// Sender-side lifecycle of a drop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendPhase {
    Idle,
    FilesSelected,
    Bundling,
    MasterKeyInitialized,
    PresignRequested,
    ChunksUploading,
    ChunksUploaded,
    ManifestUploading,
    ManifestUploaded,
    Finalized,
}

/// Receiver-side lifecycle of a drop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceivePhase {
    CodeEntered,
    Resolving,
    ManifestLoaded,
    Downloading,
    Verifying,
    Assembling,
    Downloaded,
    BurnCountdown,
    Burned,
}
