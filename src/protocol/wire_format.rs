//! Wire format constants and discriminants.
//!
//! Every frame is a 4-byte length prefix followed by the payload:
//! ```text
//! ┌──────────┬──────────────────────────────────────────────┐
//! │ Length   │ Payload                                      │
//! │ 4 bytes  │ request:  s32 type │ s32 serial │ body ...   │
//! │ uint32 BE│ response: s32 category │ ...                 │
//! └──────────┴──────────────────────────────────────────────┘
//! ```
//!
//! A solicited response continues with `s32 serial`, `s32 status`, body.
//! An unsolicited response continues with `s32 event`, body.
//!
//! All multi-byte integers are Big Endian.

use crate::error::{CneError, Result};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Size of the request header inside the payload (type + serial).
pub const REQUEST_HEADER_SIZE: usize = 8;

/// Default maximum frame payload size (64 KB).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 64 * 1024;

/// Status code reported by the daemon for a successful request.
pub const STATUS_SUCCESS: i32 = 0;

/// Protocol revision announced in the `Init` request.
pub const PROTOCOL_VERSION: i32 = 1;

/// Response category discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCategory {
    /// Reply correlated to a request by serial.
    Solicited,
    /// Daemon-initiated event.
    Unsolicited,
}

impl ResponseCategory {
    /// Decode the category code.
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(Self::Solicited),
            1 => Ok(Self::Unsolicited),
            other => Err(CneError::Protocol(format!(
                "Unknown response category {}",
                other
            ))),
        }
    }

    /// Wire code for this category.
    pub fn code(self) -> i32 {
        match self {
            Self::Solicited => 0,
            Self::Unsolicited => 1,
        }
    }
}

/// Requests the client sends to the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestType {
    Init,
    RegisterRole,
    GetCompatibleRats,
    ConfirmRat,
    DeregisterRole,
    UpdateBatteryInfo,
    UpdateWlanInfo,
    UpdateWwanInfo,
    NotifyDefaultNetwork,
    RequestQosFlow,
    ReleaseQosFlow,
}

impl RequestType {
    /// Wire code for this request.
    pub fn code(self) -> i32 {
        match self {
            Self::Init => 1,
            Self::RegisterRole => 2,
            Self::GetCompatibleRats => 3,
            Self::ConfirmRat => 4,
            Self::DeregisterRole => 5,
            Self::UpdateBatteryInfo => 6,
            Self::UpdateWlanInfo => 7,
            Self::UpdateWwanInfo => 8,
            Self::NotifyDefaultNetwork => 9,
            Self::RequestQosFlow => 10,
            Self::ReleaseQosFlow => 11,
        }
    }

    /// Decode a request code. Used by peers and test daemons.
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            1 => Self::Init,
            2 => Self::RegisterRole,
            3 => Self::GetCompatibleRats,
            4 => Self::ConfirmRat,
            5 => Self::DeregisterRole,
            6 => Self::UpdateBatteryInfo,
            7 => Self::UpdateWlanInfo,
            8 => Self::UpdateWwanInfo,
            9 => Self::NotifyDefaultNetwork,
            10 => Self::RequestQosFlow,
            11 => Self::ReleaseQosFlow,
            _ => return None,
        })
    }
}

/// Unsolicited events sent by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    RatLost,
    MorePreferredRatAvailable,
    BringRatDown,
    BringRatUp,
    QosStatus,
}

impl EventType {
    /// Wire code for this event.
    pub fn code(self) -> i32 {
        match self {
            Self::RatLost => 1,
            Self::MorePreferredRatAvailable => 2,
            Self::BringRatDown => 3,
            Self::BringRatUp => 4,
            Self::QosStatus => 5,
        }
    }

    /// Decode an event code. Unknown codes yield `None`.
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            1 => Self::RatLost,
            2 => Self::MorePreferredRatAvailable,
            3 => Self::BringRatDown,
            4 => Self::BringRatUp,
            5 => Self::QosStatus,
            _ => return None,
        })
    }
}

/// Radio access technology.
///
/// The daemon may offer technologies this crate has no name for; those are
/// carried as `Other` with their wire code and round-trip unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rat {
    Wwan,
    Wlan,
    Other(i32),
}

impl Rat {
    /// Wire code for this RAT.
    pub fn code(self) -> i32 {
        match self {
            Self::Wwan => 0,
            Self::Wlan => 1,
            Self::Other(code) => code,
        }
    }

    /// Decode a RAT code. Every code is valid.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Wwan,
            1 => Self::Wlan,
            other => Self::Other(other),
        }
    }
}
