//! Value types carried by configuration requests and daemon reports.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

/// Processing status the daemon reports for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Success,
    Failure,
    NotSupported,
    ParamInvalid,
}

impl Response {
    pub fn is_success(self) -> bool {
        self == Response::Success
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Response::Success => "success",
            Response::Failure => "failure",
            Response::NotSupported => "not supported",
            Response::ParamInvalid => "invalid parameter",
        };
        f.write_str(s)
    }
}

/// GNSS constellations known to the positioning engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constellation {
    Glonass,
    Qzss,
    Beidou,
    Galileo,
    Sbas,
    Navic,
    Gps,
}

/// An ordered set of constellations.
pub type ConstellationSet = BTreeSet<Constellation>;

/// One satellite, identified by constellation and SV id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SvId {
    pub constellation: Constellation,
    /// SV id within the constellation; `0` blacklists the whole constellation.
    pub sv_id: u32,
}

/// Constellation enablement and SV blacklist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstellationConfig {
    /// Ignore `enabled`/`disabled` and restore the engine defaults.
    #[serde(default)]
    pub reset_to_default: bool,
    #[serde(default)]
    pub enabled: ConstellationSet,
    #[serde(default)]
    pub disabled: ConstellationSet,
    #[serde(default)]
    pub blacklisted_svs: Vec<SvId>,
}

impl ConstellationConfig {
    /// Restore the engine's default constellation set and clear the blacklist.
    pub fn defaults() -> Self {
        Self {
            reset_to_default: true,
            ..Self::default()
        }
    }
}

/// Which aiding data to delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AidingData {
    All,
    Selected {
        ephemeris: bool,
        dr_sensor_calibration: bool,
    },
}

/// Offset between two reference points on the vehicle, in meters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LeverArmParams {
    pub forward_offset_meters: f32,
    pub sideways_offset_meters: f32,
    pub up_offset_meters: f32,
}

/// Lever-arm configuration. Absent entries are left unchanged by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeverArmConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gnss_to_vrp: Option<LeverArmParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dr_imu_to_gnss: Option<LeverArmParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpe_imu_to_gnss: Option<LeverArmParams>,
}

impl LeverArmConfig {
    pub fn is_empty(&self) -> bool {
        self.gnss_to_vrp.is_none() && self.dr_imu_to_gnss.is_none() && self.vpe_imu_to_gnss.is_none()
    }
}

/// Mounting angles of the inertial sensor relative to the vehicle body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BodyToSensorMount {
    pub roll_offset: f32,
    pub yaw_offset: f32,
    pub pitch_offset: f32,
    pub offset_unc: f32,
}

/// Dead-reckoning engine parameters. Only the fields that are set are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeadReckoningConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_to_sensor_mount: Option<BodyToSensorMount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_speed_scale_factor: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_speed_scale_factor_unc: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gyro_scale_factor: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gyro_scale_factor_unc: Option<f32>,
}

/// Positioning engines that accept per-engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineType {
    /// Standard positioning engine.
    Spe,
    /// Precise positioning engine.
    Ppe,
    /// Dead-reckoning engine.
    Dre,
    /// Vision positioning engine.
    Vpe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineRunState {
    Pause,
    Resume,
}

/// Bit mask of NMEA sentence types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NmeaTypes(pub u32);

impl NmeaTypes {
    pub const GGA: Self = Self(1 << 0);
    pub const RMC: Self = Self(1 << 1);
    pub const GSA: Self = Self(1 << 2);
    pub const VTG: Self = Self(1 << 3);
    pub const GNS: Self = Self(1 << 4);
    pub const DTM: Self = Self(1 << 5);
    pub const GPGSV: Self = Self(1 << 6);
    pub const GLGSV: Self = Self(1 << 7);
    pub const GAGSV: Self = Self(1 << 8);
    pub const GQGSV: Self = Self(1 << 9);
    pub const GBGSV: Self = Self(1 << 10);
    pub const GIGSV: Self = Self(1 << 11);
    pub const ALL: Self = Self(u32::MAX);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for NmeaTypes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeodeticDatum {
    Wgs84,
    Pz90,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobustLocationVersion {
    pub major: u8,
    pub minor: u16,
}

/// Robust-location settings as reported by the daemon. Fields the daemon did
/// not report are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobustLocationConfig {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub enabled_for_e911: Option<bool>,
    #[serde(default)]
    pub version: Option<RobustLocationVersion>,
}

/// Debug verbosity of the data-source download daemon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XtraLogLevel {
    None,
    Error,
    #[default]
    Warning,
    Info,
    Debug,
    Verbose,
}

/// Predicted-orbit (XTRA) data-source parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XtraParams {
    /// Download interval; `0` keeps the daemon default.
    pub download_interval_minutes: u32,
    /// Per-download timeout; `0` keeps the daemon default.
    pub download_timeout_secs: u32,
    /// Interval between retries; `0` keeps the daemon default.
    pub download_retry_interval_minutes: u32,
    pub download_retry_attempts: u32,
    #[serde(default)]
    pub ca_path: String,
    #[serde(default)]
    pub server_urls: Vec<String>,
    #[serde(default)]
    pub ntp_server_urls: Vec<String>,
    pub integrity_download_enabled: bool,
    pub integrity_download_interval_minutes: u32,
    #[serde(default)]
    pub daemon_log_level: XtraLogLevel,
}

impl XtraParams {
    /// Clamp every interval into the range the daemon supports.
    pub fn clamped(mut self) -> Self {
        if self.download_interval_minutes != 0 {
            self.download_interval_minutes = self.download_interval_minutes.clamp(48 * 60, 168 * 60);
        }
        if self.download_timeout_secs != 0 {
            self.download_timeout_secs = self.download_timeout_secs.clamp(3, 300);
        }
        if self.download_retry_interval_minutes != 0 {
            self.download_retry_interval_minutes =
                self.download_retry_interval_minutes.clamp(3, 24 * 60);
        }
        self.download_retry_attempts = self.download_retry_attempts.min(6);
        self.integrity_download_interval_minutes =
            self.integrity_download_interval_minutes.clamp(360, 2880);
        self
    }
}

/// Why the daemon pushed a data-source status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XtraStatusTrigger {
    /// Answer to an explicit status query.
    UponQuery,
    /// Pushed immediately because a subscription was just accepted.
    UponRegistration,
    /// Pushed because the status changed.
    UponStatusChange,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XtraDataStatus {
    #[default]
    Unknown,
    NotAvailable,
    NotValid,
    Valid,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XtraStatus {
    pub feature_enabled: bool,
    pub data_status: XtraDataStatus,
    /// Hours the downloaded data stays valid. Only meaningful when
    /// `data_status` is [`XtraDataStatus::Valid`].
    pub valid_for_hours: u32,
}

impl XtraStatus {
    /// Drop fields that are meaningless for the reported state.
    pub fn normalized(self) -> Self {
        if !self.feature_enabled {
            return Self::default();
        }
        if self.data_status != XtraDataStatus::Valid {
            return Self {
                valid_for_hours: 0,
                ..self
            };
        }
        self
    }
}

/// A data-source status report delivered to the status listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct XtraStatusEvent {
    pub trigger: XtraStatusTrigger,
    pub status: XtraStatus,
}

/// A position fix injected on behalf of the engine's network location request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub timestamp_ms: u64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub altitude: Option<f64>,
    pub horizontal_accuracy_meters: f32,
}
