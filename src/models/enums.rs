//! Enums for TuneSweep
//!
//! Every enum that crosses the store boundary has explicit string
//! mappings so the database never sees a debug representation.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a source file
///
/// Advances monotonically discovered -> meta_ok -> executed, with
/// error reachable from any state and recoverable by retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    #[default]
    Discovered,
    MetaOk,
    Executed,
    Error,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Discovered => "discovered",
            FileStatus::MetaOk => "meta_ok",
            FileStatus::Executed => "executed",
            FileStatus::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "discovered" => Some(FileStatus::Discovered),
            "meta_ok" => Some(FileStatus::MetaOk),
            "executed" => Some(FileStatus::Executed),
            "error" => Some(FileStatus::Error),
            _ => None,
        }
    }
}

/// Filesystem action recorded in a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanAction {
    Copy,
    Move,
    Hardlink,
    Symlink,
    Skip,
}

impl PlanAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanAction::Copy => "copy",
            PlanAction::Move => "move",
            PlanAction::Hardlink => "hardlink",
            PlanAction::Symlink => "symlink",
            PlanAction::Skip => "skip",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "copy" => Some(PlanAction::Copy),
            "move" => Some(PlanAction::Move),
            "hardlink" => Some(PlanAction::Hardlink),
            "symlink" => Some(PlanAction::Symlink),
            "skip" => Some(PlanAction::Skip),
            _ => None,
        }
    }
}

/// Post-action correctness check policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyMode {
    None,
    #[default]
    Size,
    Hash,
}

impl VerifyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerifyMode::None => "none",
            VerifyMode::Size => "size",
            VerifyMode::Hash => "hash",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "none" => Some(VerifyMode::None),
            "size" => Some(VerifyMode::Size),
            "hash" => Some(VerifyMode::Hash),
            _ => None,
        }
    }
}

/// Recording version detected from the original (un-stripped) title
///
/// Part of the cluster key so a live take never dedups against the
/// studio recording. Remaster/deluxe/anniversary variants stay Studio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionType {
    #[default]
    Studio,
    Live,
    Acoustic,
    Remix,
    Demo,
    Instrumental,
}

impl VersionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionType::Studio => "studio",
            VersionType::Live => "live",
            VersionType::Acoustic => "acoustic",
            VersionType::Remix => "remix",
            VersionType::Demo => "demo",
            VersionType::Instrumental => "instrumental",
        }
    }
}
