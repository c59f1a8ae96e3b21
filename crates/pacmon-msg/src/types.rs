//! ---
//! pac_section: "02-messaging-data-model"
//! pac_subsection: "module"
//! pac_type: "source"
//! pac_scope: "code"
//! pac_description: "Measurement model and stream primitives."
//! pac_version: "v0.1.0"
//! pac_owner: "tbd"
//! ---
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of a measurement. Doubles as the routing key downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeasurementType {
    /// Full set of temperatures reported by an SWC heat pump.
    #[serde(rename = "SWCTemperature")]
    DeviceTemperatureSet,
}

impl MeasurementType {
    /// Stable wire name of the measurement type.
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementType::DeviceTemperatureSet => "SWCTemperature",
        }
    }
}

impl fmt::Display for MeasurementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A timestamped, pre-serialised reading.
///
/// The payload is opaque at this level: producers encode it once and consumers that know
/// the schema for [`MeasurementType`] decode it. Fields are private so a measurement cannot
/// be altered once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    measurement_type: MeasurementType,
    timestamp: DateTime<Utc>,
    payload: Vec<u8>,
}

impl Measurement {
    /// Build a measurement from its parts.
    pub fn new(
        measurement_type: MeasurementType,
        timestamp: DateTime<Utc>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            measurement_type,
            timestamp,
            payload: payload.into(),
        }
    }

    /// Kind of measurement carried in the payload.
    pub fn measurement_type(&self) -> MeasurementType {
        self.measurement_type
    }

    /// Instant the underlying reading was received.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Encoded payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Decode a JSON payload into `T`.
    pub fn decode_payload<T>(&self) -> serde_json::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measurement_type_uses_legacy_wire_name() {
        let encoded = serde_json::to_string(&MeasurementType::DeviceTemperatureSet).unwrap();
        assert_eq!(encoded, "\"SWCTemperature\"");
        assert_eq!(MeasurementType::DeviceTemperatureSet.to_string(), "SWCTemperature");
    }

    #[test]
    fn payload_decodes_as_json() {
        let measurement = Measurement::new(
            MeasurementType::DeviceTemperatureSet,
            Utc::now(),
            br#"{"tank":52.3}"#.to_vec(),
        );
        let value: serde_json::Value = measurement.decode_payload().unwrap();
        assert_eq!(value["tank"], 52.3);
    }
}
