//! Platform status fed to the daemon.
//!
//! These are plain data supplied by whatever observes the radios and the
//! battery; the client only serializes them into update requests.

use serde::{Deserialize, Serialize};

use crate::codec::PayloadWriter;

/// WLAN link status (`UpdateWlanInfo`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WlanInfo {
    /// Connection state code.
    pub state: i32,
    /// Signal strength in dBm.
    pub rssi: i32,
    pub ssid: Option<String>,
    pub ip_addr: Option<String>,
}

impl WlanInfo {
    pub(crate) fn encode(&self, w: &mut PayloadWriter<'_>) {
        w.put_i32(self.state)
            .put_i32(self.rssi)
            .put_opt_str(self.ssid.as_deref())
            .put_opt_str(self.ip_addr.as_deref());
    }
}

/// WWAN link status (`UpdateWwanInfo`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WwanInfo {
    /// Radio network type code.
    pub network_type: i32,
    /// Connection state code.
    pub state: i32,
    pub signal_strength: i32,
    pub ip_addr: Option<String>,
    pub roaming: bool,
}

impl WwanInfo {
    pub(crate) fn encode(&self, w: &mut PayloadWriter<'_>) {
        w.put_i32(self.network_type)
            .put_i32(self.state)
            .put_i32(self.signal_strength)
            .put_opt_str(self.ip_addr.as_deref())
            .put_bool(self.roaming);
    }
}

/// Battery status (`UpdateBatteryInfo`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatteryInfo {
    pub status: i32,
    pub plugged: i32,
    /// Charge level in percent.
    pub level: i32,
}

impl BatteryInfo {
    pub(crate) fn encode(&self, w: &mut PayloadWriter<'_>) {
        w.put_i32(self.status)
            .put_i32(self.plugged)
            .put_i32(self.level);
    }
}
