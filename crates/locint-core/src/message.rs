//! Messages exchanged with the location daemon.
//!
//! Every configuration or query operation maps to a [`ConfigCategory`], the
//! unit used for reply correlation and for the replay cache.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{
    AidingData, ConstellationConfig, ConstellationSet, DeadReckoningConfig, EngineRunState,
    EngineType, GeodeticDatum, LeverArmConfig, Location, Response, RobustLocationConfig,
    XtraParams, XtraStatusEvent,
};

/// Request category, used to correlate replies with outstanding callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigCategory {
    Constellations,
    ConstellationSecondaryBand,
    ConstrainedTimeUncertainty,
    PositionAssistedClockEstimator,
    AidingDataDeletion,
    LeverArm,
    RobustLocation,
    MinGpsWeek,
    DeadReckoningEngine,
    MinSvElevation,
    EngineRunState,
    UserConsentTerrestrialPositioning,
    OutputNmeaTypes,
    EngineIntegrityRisk,
    XtraParams,
    XtraStatusUpdate,
    GetRobustLocationConfig,
    GetMinGpsWeek,
    GetMinSvElevation,
    GetConstellationSecondaryBandConfig,
    GetXtraStatus,
}

impl ConfigCategory {
    /// Whether the reply carries a typed report rather than a plain status.
    pub fn is_query(self) -> bool {
        matches!(
            self,
            ConfigCategory::GetRobustLocationConfig
                | ConfigCategory::GetMinGpsWeek
                | ConfigCategory::GetMinSvElevation
                | ConfigCategory::GetConstellationSecondaryBandConfig
                | ConfigCategory::GetXtraStatus
        )
    }

    /// Whether a cached value of this category is replayed after the daemon
    /// restarts. The minimum GPS week is only valid for the daemon instance
    /// that received it.
    pub fn is_resynced(self) -> bool {
        self != ConfigCategory::MinGpsWeek
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConfigCategory::Constellations => "constellations",
            ConfigCategory::ConstellationSecondaryBand => "constellation_secondary_band",
            ConfigCategory::ConstrainedTimeUncertainty => "constrained_time_uncertainty",
            ConfigCategory::PositionAssistedClockEstimator => "position_assisted_clock_estimator",
            ConfigCategory::AidingDataDeletion => "aiding_data_deletion",
            ConfigCategory::LeverArm => "lever_arm",
            ConfigCategory::RobustLocation => "robust_location",
            ConfigCategory::MinGpsWeek => "min_gps_week",
            ConfigCategory::DeadReckoningEngine => "dead_reckoning_engine",
            ConfigCategory::MinSvElevation => "min_sv_elevation",
            ConfigCategory::EngineRunState => "engine_run_state",
            ConfigCategory::UserConsentTerrestrialPositioning => {
                "user_consent_terrestrial_positioning"
            }
            ConfigCategory::OutputNmeaTypes => "output_nmea_types",
            ConfigCategory::EngineIntegrityRisk => "engine_integrity_risk",
            ConfigCategory::XtraParams => "xtra_params",
            ConfigCategory::XtraStatusUpdate => "xtra_status_update",
            ConfigCategory::GetRobustLocationConfig => "get_robust_location_config",
            ConfigCategory::GetMinGpsWeek => "get_min_gps_week",
            ConfigCategory::GetMinSvElevation => "get_min_sv_elevation",
            ConfigCategory::GetConstellationSecondaryBandConfig => {
                "get_constellation_secondary_band_config"
            }
            ConfigCategory::GetXtraStatus => "get_xtra_status",
        }
    }
}

impl fmt::Display for ConfigCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of the replay cache. Per-engine settings are cached once per engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub category: ConfigCategory,
    pub engine: Option<EngineType>,
}

/// A configuration, query or subscription request sent to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "args", rename_all = "snake_case")]
pub enum ConfigRequest {
    Constellations(ConstellationConfig),
    ConstellationSecondaryBand {
        disabled: ConstellationSet,
    },
    ConstrainedTimeUncertainty {
        enable: bool,
        threshold_ms: f32,
        energy_budget: u32,
    },
    PositionAssistedClockEstimator {
        enable: bool,
    },
    DeleteAidingData(AidingData),
    LeverArm(LeverArmConfig),
    RobustLocation {
        enable: bool,
        enable_for_e911: bool,
    },
    MinGpsWeek(u16),
    DeadReckoningEngine(DeadReckoningConfig),
    MinSvElevation(u8),
    EngineRunState {
        engine: EngineType,
        state: EngineRunState,
    },
    UserConsentTerrestrialPositioning {
        consent: bool,
    },
    OutputNmeaTypes {
        types: crate::types::NmeaTypes,
        datum: GeodeticDatum,
    },
    EngineIntegrityRisk {
        engine: EngineType,
        risk: u32,
    },
    XtraParams {
        enable: bool,
        params: XtraParams,
    },
    XtraStatusUpdate {
        subscribe: bool,
    },
    GetRobustLocationConfig,
    GetMinGpsWeek,
    GetMinSvElevation,
    GetConstellationSecondaryBandConfig,
    GetXtraStatus,
}

impl ConfigRequest {
    pub fn category(&self) -> ConfigCategory {
        match self {
            ConfigRequest::Constellations(_) => ConfigCategory::Constellations,
            ConfigRequest::ConstellationSecondaryBand { .. } => {
                ConfigCategory::ConstellationSecondaryBand
            }
            ConfigRequest::ConstrainedTimeUncertainty { .. } => {
                ConfigCategory::ConstrainedTimeUncertainty
            }
            ConfigRequest::PositionAssistedClockEstimator { .. } => {
                ConfigCategory::PositionAssistedClockEstimator
            }
            ConfigRequest::DeleteAidingData(_) => ConfigCategory::AidingDataDeletion,
            ConfigRequest::LeverArm(_) => ConfigCategory::LeverArm,
            ConfigRequest::RobustLocation { .. } => ConfigCategory::RobustLocation,
            ConfigRequest::MinGpsWeek(_) => ConfigCategory::MinGpsWeek,
            ConfigRequest::DeadReckoningEngine(_) => ConfigCategory::DeadReckoningEngine,
            ConfigRequest::MinSvElevation(_) => ConfigCategory::MinSvElevation,
            ConfigRequest::EngineRunState { .. } => ConfigCategory::EngineRunState,
            ConfigRequest::UserConsentTerrestrialPositioning { .. } => {
                ConfigCategory::UserConsentTerrestrialPositioning
            }
            ConfigRequest::OutputNmeaTypes { .. } => ConfigCategory::OutputNmeaTypes,
            ConfigRequest::EngineIntegrityRisk { .. } => ConfigCategory::EngineIntegrityRisk,
            ConfigRequest::XtraParams { .. } => ConfigCategory::XtraParams,
            ConfigRequest::XtraStatusUpdate { .. } => ConfigCategory::XtraStatusUpdate,
            ConfigRequest::GetRobustLocationConfig => ConfigCategory::GetRobustLocationConfig,
            ConfigRequest::GetMinGpsWeek => ConfigCategory::GetMinGpsWeek,
            ConfigRequest::GetMinSvElevation => ConfigCategory::GetMinSvElevation,
            ConfigRequest::GetConstellationSecondaryBandConfig => {
                ConfigCategory::GetConstellationSecondaryBandConfig
            }
            ConfigRequest::GetXtraStatus => ConfigCategory::GetXtraStatus,
        }
    }

    /// Cache key for idempotent settings. Queries, aiding-data deletion and
    /// subscription changes are never cached.
    pub fn cache_key(&self) -> Option<CacheKey> {
        let engine = match self {
            ConfigRequest::DeleteAidingData(_) | ConfigRequest::XtraStatusUpdate { .. } => {
                return None;
            }
            _ if self.category().is_query() => return None,
            ConfigRequest::EngineRunState { engine, .. }
            | ConfigRequest::EngineIntegrityRisk { engine, .. } => Some(*engine),
            _ => None,
        };
        Some(CacheKey {
            category: self.category(),
            engine,
        })
    }
}

/// Identification sent with every registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientHello {
    pub client: String,
    pub version: String,
    pub git_hash: String,
}

/// Anything the client sends to the daemon.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Register(ClientHello),
    Deregister,
    InjectLocation(Location),
    Config(ConfigRequest),
}

impl OutboundMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            OutboundMessage::Register(_) => MessageKind::Register,
            OutboundMessage::Deregister => MessageKind::Deregister,
            OutboundMessage::InjectLocation(_) => MessageKind::InjectLocation,
            OutboundMessage::Config(request) => MessageKind::Config(request.category()),
        }
    }
}

/// Anything the daemon sends to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// The daemon (re)started and is ready for registrations.
    DaemonReady,
    /// Processing status for a request of `category`.
    Ack {
        category: ConfigCategory,
        status: Response,
    },
    RobustLocationReport(RobustLocationConfig),
    MinGpsWeekReport(u16),
    MinSvElevationReport(u8),
    SecondaryBandReport(ConstellationSet),
    XtraStatusReport(XtraStatusEvent),
}

impl InboundMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            InboundMessage::DaemonReady => MessageKind::DaemonReady,
            InboundMessage::Ack { category, .. } => MessageKind::Config(*category),
            InboundMessage::RobustLocationReport(_) => MessageKind::RobustLocationReport,
            InboundMessage::MinGpsWeekReport(_) => MessageKind::MinGpsWeekReport,
            InboundMessage::MinSvElevationReport(_) => MessageKind::MinSvElevationReport,
            InboundMessage::SecondaryBandReport(_) => MessageKind::SecondaryBandReport,
            InboundMessage::XtraStatusReport(_) => MessageKind::XtraStatusReport,
        }
    }
}

/// Discriminant carried in the wire envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Register,
    Deregister,
    DaemonReady,
    InjectLocation,
    /// A request of the given category, or the daemon's status reply to it.
    Config(ConfigCategory),
    RobustLocationReport,
    MinGpsWeekReport,
    MinSvElevationReport,
    SecondaryBandReport,
    XtraStatusReport,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Register => f.write_str("register"),
            MessageKind::Deregister => f.write_str("deregister"),
            MessageKind::DaemonReady => f.write_str("daemon_ready"),
            MessageKind::InjectLocation => f.write_str("inject_location"),
            MessageKind::Config(category) => write!(f, "config/{category}"),
            MessageKind::RobustLocationReport => f.write_str("robust_location_report"),
            MessageKind::MinGpsWeekReport => f.write_str("min_gps_week_report"),
            MessageKind::MinSvElevationReport => f.write_str("min_sv_elevation_report"),
            MessageKind::SecondaryBandReport => f.write_str("secondary_band_report"),
            MessageKind::XtraStatusReport => f.write_str("xtra_status_report"),
        }
    }
}
