//! Message identifiers.
//!
//! The id byte is the first byte of every unstuffed message. Decoding is
//! total: codes the client does not know resolve to
//! [`MessageId::Unhandled`] instead of failing.
//!
//! Sensor families occupy blocks of four codes starting at the sensor's
//! request id (`request`, `live`, `max`, `min`). Threshold variants live in
//! a second block of four per sensor from 48 upwards.

use std::fmt;

/// Outbound: submit Wi-Fi credentials to the device.
pub const WIFI_CONNECT_REQUEST: u8 = 0x01;
/// Outbound: ask the device for its connection status.
pub const STATUS_REQUEST: u8 = 0x02;
/// Inbound: answer to a status request.
pub const CONNECT_STATUS_RESPONSE: u8 = 5;

const WIFI_SSID: u8 = 20;
const WIFI_PASSWORD: u8 = 21;
const CONNECT_NETWORK: u8 = 22;
const CONNECT_STATUS: u8 = 23;
const TEMPERATURE_THRESHOLD_REQUEST: u8 = 44;
const TEMPERATURE_THRESHOLD: u8 = 45;
const MULTI_PACKET_REQUEST: u8 = 46;
const MULTI_PACKET_REPLY: u8 = 47;

/// Sensors reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sensor {
    Temperature,
    Humidity,
    /// Reserved by the firmware; readings are accepted but not acted on.
    Lux,
    SoilMoisture1,
    SoilMoisture2,
}

impl Sensor {
    /// All sensors in id order.
    pub const ALL: [Sensor; 5] = [
        Sensor::Temperature,
        Sensor::Humidity,
        Sensor::Lux,
        Sensor::SoilMoisture1,
        Sensor::SoilMoisture2,
    ];

    /// First code of this sensor's request/live/max/min block.
    #[inline]
    pub const fn request_code(self) -> u8 {
        match self {
            Sensor::Temperature => 24,
            Sensor::Humidity => 28,
            Sensor::Lux => 32,
            Sensor::SoilMoisture1 => 36,
            Sensor::SoilMoisture2 => 40,
        }
    }

    /// First code of this sensor's threshold block, if it has one.
    #[inline]
    pub const fn threshold_code(self) -> Option<u8> {
        match self {
            Sensor::Temperature => Some(48),
            Sensor::Humidity => Some(52),
            Sensor::SoilMoisture1 => Some(56),
            Sensor::Lux | Sensor::SoilMoisture2 => None,
        }
    }

    fn from_request_block(code: u8) -> Option<(Sensor, u8)> {
        Self::ALL.into_iter().find_map(|s| {
            let base = s.request_code();
            (base..base + 4).contains(&code).then(|| (s, code - base))
        })
    }

    fn from_threshold_block(code: u8) -> Option<(Sensor, u8)> {
        Self::ALL.into_iter().find_map(|s| {
            let base = s.threshold_code()?;
            (base..base + 4).contains(&code).then(|| (s, code - base))
        })
    }
}

/// What a sensor message reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadingKind {
    Live,
    Max,
    Min,
    MaxImportant,
    MaxTrigger,
    MinImportant,
    MinTrigger,
}

impl ReadingKind {
    /// Whether this kind is one of the four threshold variants.
    #[inline]
    pub fn is_threshold(self) -> bool {
        matches!(
            self,
            ReadingKind::MaxImportant
                | ReadingKind::MaxTrigger
                | ReadingKind::MinImportant
                | ReadingKind::MinTrigger
        )
    }

    fn block_offset(self) -> u8 {
        match self {
            ReadingKind::Live => 1,
            ReadingKind::Max => 2,
            ReadingKind::Min => 3,
            ReadingKind::MaxImportant => 0,
            ReadingKind::MaxTrigger => 1,
            ReadingKind::MinImportant => 2,
            ReadingKind::MinTrigger => 3,
        }
    }
}

/// Closed set of message identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageId {
    WifiConnectRequest,
    StatusRequest,
    ConnectStatusResponse,
    WifiSsid,
    WifiPassword,
    ConnectNetwork,
    ConnectStatus,
    SensorRequest(Sensor),
    Reading(Sensor, ReadingKind),
    TemperatureThresholdRequest,
    TemperatureThreshold,
    MultiPacketRequest,
    MultiPacketReply,
    /// Any code without a known meaning.
    Unhandled(u8),
}

impl MessageId {
    /// Resolve an id byte. Never fails.
    pub fn from_code(code: u8) -> Self {
        match code {
            WIFI_CONNECT_REQUEST => return MessageId::WifiConnectRequest,
            STATUS_REQUEST => return MessageId::StatusRequest,
            CONNECT_STATUS_RESPONSE => return MessageId::ConnectStatusResponse,
            WIFI_SSID => return MessageId::WifiSsid,
            WIFI_PASSWORD => return MessageId::WifiPassword,
            CONNECT_NETWORK => return MessageId::ConnectNetwork,
            CONNECT_STATUS => return MessageId::ConnectStatus,
            TEMPERATURE_THRESHOLD_REQUEST => return MessageId::TemperatureThresholdRequest,
            TEMPERATURE_THRESHOLD => return MessageId::TemperatureThreshold,
            MULTI_PACKET_REQUEST => return MessageId::MultiPacketRequest,
            MULTI_PACKET_REPLY => return MessageId::MultiPacketReply,
            _ => {}
        }

        if let Some((sensor, offset)) = Sensor::from_request_block(code) {
            return match offset {
                0 => MessageId::SensorRequest(sensor),
                1 => MessageId::Reading(sensor, ReadingKind::Live),
                2 => MessageId::Reading(sensor, ReadingKind::Max),
                _ => MessageId::Reading(sensor, ReadingKind::Min),
            };
        }

        if let Some((sensor, offset)) = Sensor::from_threshold_block(code) {
            let kind = match offset {
                0 => ReadingKind::MaxImportant,
                1 => ReadingKind::MaxTrigger,
                2 => ReadingKind::MinImportant,
                _ => ReadingKind::MinTrigger,
            };
            return MessageId::Reading(sensor, kind);
        }

        MessageId::Unhandled(code)
    }

    /// Encode back to the id byte.
    ///
    /// Returns `None` only for hand-built combinations that have no code,
    /// such as a threshold reading for a sensor without a threshold block.
    pub fn code(self) -> Option<u8> {
        Some(match self {
            MessageId::WifiConnectRequest => WIFI_CONNECT_REQUEST,
            MessageId::StatusRequest => STATUS_REQUEST,
            MessageId::ConnectStatusResponse => CONNECT_STATUS_RESPONSE,
            MessageId::WifiSsid => WIFI_SSID,
            MessageId::WifiPassword => WIFI_PASSWORD,
            MessageId::ConnectNetwork => CONNECT_NETWORK,
            MessageId::ConnectStatus => CONNECT_STATUS,
            MessageId::SensorRequest(sensor) => sensor.request_code(),
            MessageId::Reading(sensor, kind) if kind.is_threshold() => {
                sensor.threshold_code()? + kind.block_offset()
            }
            MessageId::Reading(sensor, kind) => sensor.request_code() + kind.block_offset(),
            MessageId::TemperatureThresholdRequest => TEMPERATURE_THRESHOLD_REQUEST,
            MessageId::TemperatureThreshold => TEMPERATURE_THRESHOLD,
            MessageId::MultiPacketRequest => MULTI_PACKET_REQUEST,
            MessageId::MultiPacketReply => MULTI_PACKET_REPLY,
            MessageId::Unhandled(code) => code,
        })
    }
}

impl From<u8> for MessageId {
    fn from(code: u8) -> Self {
        MessageId::from_code(code)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code() {
            Some(code) => write!(f, "{:?} ({})", self, code),
            None => write!(f, "{:?}", self),
        }
    }
}
