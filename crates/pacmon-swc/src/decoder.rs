//! ---
//! pac_section: "03-device-source"
//! pac_subsection: "module"
//! pac_type: "source"
//! pac_scope: "code"
//! pac_description: "SWC heat-pump session, decoder and supervising source."
//! pac_version: "v0.1.0"
//! pac_owner: "tbd"
//! ---
//! Decoder for the `<values>` snapshot document pushed by the control unit.
//!
//! The document is a flat list of `<item id='..'><value>..</value></item>` entries. Ids
//! are opaque firmware references; only the nine listed in [`TemperatureField`] are read.
//! Firmware that uses other ids is read by item position instead, see [`decode`].
//! Values look like `33.8°C`.
use std::borrow::Cow;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use pacmon_msg::{Measurement, MeasurementType};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{DecodeError, FieldParseError};
use crate::protocol::SNAPSHOT_MARKER;

const DEGREE_CELSIUS: &str = "°C";
// UTF-8 degree sign read back as Latin-1 and re-encoded.
const MISENCODED_DEGREE: &str = "Â°";

/// Temperatures extracted from the snapshot document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemperatureField {
    /// Heating circuit flow.
    HeatingOutbound,
    /// Heating circuit return.
    HeatingInbound,
    /// Outdoor sensor.
    Outside,
    /// Domestic hot water tank.
    Tank,
    /// Domestic hot water set point.
    TargetTank,
    /// Brine entering the heat pump.
    DrillInbound,
    /// Brine leaving the heat pump.
    DrillOutbound,
    /// Room sensor.
    AmbiantIndoor,
    /// Room set point.
    AmbiantIndoorTarget,
}

impl TemperatureField {
    /// Every decoded field, in payload order.
    pub const ALL: [TemperatureField; 9] = [
        TemperatureField::HeatingOutbound,
        TemperatureField::HeatingInbound,
        TemperatureField::Outside,
        TemperatureField::Tank,
        TemperatureField::TargetTank,
        TemperatureField::DrillInbound,
        TemperatureField::DrillOutbound,
        TemperatureField::AmbiantIndoor,
        TemperatureField::AmbiantIndoorTarget,
    ];

    /// Position of this reading in the item list, used when no known id is present.
    pub fn document_index(&self) -> usize {
        match self {
            TemperatureField::HeatingOutbound => 0,
            TemperatureField::HeatingInbound => 1,
            TemperatureField::Outside => 4,
            TemperatureField::Tank => 6,
            TemperatureField::TargetTank => 7,
            TemperatureField::DrillInbound => 8,
            TemperatureField::DrillOutbound => 9,
            TemperatureField::AmbiantIndoor => 20,
            TemperatureField::AmbiantIndoorTarget => 21,
        }
    }

    /// Firmware item id carrying this reading.
    pub fn device_id(&self) -> &'static str {
        match self {
            TemperatureField::HeatingOutbound => "0x45e1bc",
            TemperatureField::HeatingInbound => "0x45e1f4",
            TemperatureField::Outside => "0x45e2d4",
            TemperatureField::Tank => "0x45e344",
            TemperatureField::TargetTank => "0x45e37c",
            TemperatureField::DrillInbound => "0x45e3b4",
            TemperatureField::DrillOutbound => "0x45e3ec",
            TemperatureField::AmbiantIndoor => "0x45e7a4",
            TemperatureField::AmbiantIndoorTarget => "0x45e7dc",
        }
    }

    /// Name used in the encoded payload.
    pub fn name(&self) -> &'static str {
        match self {
            TemperatureField::HeatingOutbound => "HeatingOutboundTemperature",
            TemperatureField::HeatingInbound => "HeatingInboundTemperature",
            TemperatureField::Outside => "OutsideTemperature",
            TemperatureField::Tank => "TankTemperature",
            TemperatureField::TargetTank => "TargetTankTemperature",
            TemperatureField::DrillInbound => "DrillInboundTemperature",
            TemperatureField::DrillOutbound => "DrillOutboundTemperature",
            TemperatureField::AmbiantIndoor => "AmbiantIndoorTemperature",
            TemperatureField::AmbiantIndoorTarget => "AmbiantIndoorTargetTemperature",
        }
    }
}

/// All monitored temperatures from one snapshot document, in °C.
///
/// Serialises to a JSON object whose keys and order are fixed; this is the payload of
/// every [`Measurement`] the source emits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemperatureSnapshot {
    /// Heating circuit flow.
    pub heating_outbound_temperature: f64,
    /// Heating circuit return.
    pub heating_inbound_temperature: f64,
    /// Outdoor sensor.
    pub outside_temperature: f64,
    /// Hot water tank.
    pub tank_temperature: f64,
    /// Hot water set point.
    pub target_tank_temperature: f64,
    /// Brine in.
    pub drill_inbound_temperature: f64,
    /// Brine out.
    pub drill_outbound_temperature: f64,
    /// Room sensor.
    pub ambiant_indoor_temperature: f64,
    /// Room set point.
    pub ambiant_indoor_target_temperature: f64,
}

impl TemperatureSnapshot {
    /// Read a single field.
    pub fn get(&self, field: TemperatureField) -> f64 {
        match field {
            TemperatureField::HeatingOutbound => self.heating_outbound_temperature,
            TemperatureField::HeatingInbound => self.heating_inbound_temperature,
            TemperatureField::Outside => self.outside_temperature,
            TemperatureField::Tank => self.tank_temperature,
            TemperatureField::TargetTank => self.target_tank_temperature,
            TemperatureField::DrillInbound => self.drill_inbound_temperature,
            TemperatureField::DrillOutbound => self.drill_outbound_temperature,
            TemperatureField::AmbiantIndoor => self.ambiant_indoor_temperature,
            TemperatureField::AmbiantIndoorTarget => self.ambiant_indoor_target_temperature,
        }
    }

    fn slot(&mut self, field: TemperatureField) -> &mut f64 {
        match field {
            TemperatureField::HeatingOutbound => &mut self.heating_outbound_temperature,
            TemperatureField::HeatingInbound => &mut self.heating_inbound_temperature,
            TemperatureField::Outside => &mut self.outside_temperature,
            TemperatureField::Tank => &mut self.tank_temperature,
            TemperatureField::TargetTank => &mut self.target_tank_temperature,
            TemperatureField::DrillInbound => &mut self.drill_inbound_temperature,
            TemperatureField::DrillOutbound => &mut self.drill_outbound_temperature,
            TemperatureField::AmbiantIndoor => &mut self.ambiant_indoor_temperature,
            TemperatureField::AmbiantIndoorTarget => &mut self.ambiant_indoor_target_temperature,
        }
    }

    /// Wrap the snapshot into a measurement stamped with `timestamp`.
    pub fn to_measurement(&self, timestamp: DateTime<Utc>) -> serde_json::Result<Measurement> {
        let payload = serde_json::to_vec(self)?;
        Ok(Measurement::new(
            MeasurementType::DeviceTemperatureSet,
            timestamp,
            payload,
        ))
    }
}

#[derive(Debug, Deserialize)]
struct ValuesDocument {
    #[serde(rename = "item", default)]
    items: Vec<ValueItem>,
}

#[derive(Debug, Deserialize)]
struct ValueItem {
    #[serde(rename = "@id")]
    id: String,
    #[serde(default)]
    value: String,
}

/// Decode a snapshot document.
///
/// Fields are looked up by item id. When none of the known ids is present the document
/// comes from firmware with a different id table, and fields are read by their position
/// in the item list instead. Unknown ids are ignored. A field that is missing, or whose
/// value does not parse, yields `0.0` and a warning; only a structurally broken document
/// fails. Content after the closing `</values>` is not inspected.
pub fn decode(payload: &[u8]) -> Result<TemperatureSnapshot, DecodeError> {
    let document = normalise(payload);
    if !document.trim_start().starts_with(SNAPSHOT_MARKER) {
        return Err(DecodeError::MalformedDocument(format!(
            "document is not rooted at {SNAPSHOT_MARKER}"
        )));
    }

    let parsed: ValuesDocument = quick_xml::de::from_str(&document)
        .map_err(|err| DecodeError::MalformedDocument(err.to_string()))?;

    let values: HashMap<&str, &str> = parsed
        .items
        .iter()
        .map(|item| (item.id.as_str(), item.value.as_str()))
        .collect();
    let by_id = TemperatureField::ALL
        .iter()
        .any(|field| values.contains_key(field.device_id()));
    if !by_id && !parsed.items.is_empty() {
        warn!(
            items = parsed.items.len(),
            "no known item id in snapshot document; reading fields by position"
        );
    }

    let mut snapshot = TemperatureSnapshot::default();
    for field in TemperatureField::ALL {
        let raw = if by_id {
            values.get(field.device_id()).copied()
        } else {
            parsed
                .items
                .get(field.document_index())
                .map(|item| item.value.as_str())
        };
        let Some(raw) = raw else {
            warn!(
                field = field.name(),
                id = field.device_id(),
                index = field.document_index(),
                "snapshot document is missing a known field; using 0.0"
            );
            continue;
        };
        *snapshot.slot(field) = parse_reading(raw).unwrap_or_else(|err| {
            warn!(field = field.name(), raw = %err.raw, "{err}, setting it to 0.0");
            0.0
        });
    }

    Ok(snapshot)
}

/// Parse one `33.8°C` reading. The unit suffix is removed once.
pub(crate) fn parse_reading(raw: &str) -> Result<f64, FieldParseError> {
    let trimmed = raw.trim();
    let number = trimmed.strip_suffix(DEGREE_CELSIUS).unwrap_or(trimmed).trim();
    match number.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(FieldParseError {
            raw: raw.to_owned(),
        }),
    }
}

/// Bring the document to clean UTF-8 with a single spelling of the degree sign.
///
/// Bytes that are not valid UTF-8 are read as Latin-1, which is what older firmware emits.
fn normalise(payload: &[u8]) -> Cow<'_, str> {
    let text = match std::str::from_utf8(payload) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => Cow::Owned(payload.iter().map(|&byte| char::from(byte)).collect()),
    };
    if text.contains(MISENCODED_DEGREE) {
        Cow::Owned(text.replace(MISENCODED_DEGREE, "°"))
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(entries: &[(&str, &str)]) -> String {
        let mut xml = String::from("<values>");
        for (id, value) in entries {
            xml.push_str(&format!(
                "<item id='{id}'><name>sensor</name><value>{value}</value></item>"
            ));
        }
        xml.push_str("</values>");
        xml
    }

    fn full_document(unit: &str) -> String {
        let readings = [
            "33.8", "34.5", "4.7", "52.3", "52.0", "11.0", "11.2", "21.1", "21.0",
        ];
        let entries: Vec<(String, String)> = TemperatureField::ALL
            .iter()
            .zip(readings)
            .map(|(field, reading)| (field.device_id().to_owned(), format!("{reading}{unit}")))
            .collect();
        let borrowed: Vec<(&str, &str)> = entries
            .iter()
            .map(|(id, value)| (id.as_str(), value.as_str()))
            .collect();
        document(&borrowed)
    }

    fn expected() -> TemperatureSnapshot {
        TemperatureSnapshot {
            heating_outbound_temperature: 33.8,
            heating_inbound_temperature: 34.5,
            outside_temperature: 4.7,
            tank_temperature: 52.3,
            target_tank_temperature: 52.0,
            drill_inbound_temperature: 11.0,
            drill_outbound_temperature: 11.2,
            ambiant_indoor_temperature: 21.1,
            ambiant_indoor_target_temperature: 21.0,
        }
    }

    #[test]
    fn decodes_all_known_fields() {
        let snapshot = decode(full_document("°C").as_bytes()).unwrap();
        assert_eq!(snapshot, expected());
    }

    #[test]
    fn misencoded_degree_sign_is_stripped() {
        let snapshot = decode(full_document("Â°C").as_bytes()).unwrap();
        assert_eq!(snapshot, expected());
    }

    #[test]
    fn latin1_payload_is_normalised() {
        let mut bytes = document(&[(TemperatureField::Tank.device_id(), "52.3")]).into_bytes();
        // Splice a Latin-1 degree sign (0xB0) right after the number.
        let position = bytes
            .windows(4)
            .position(|window| window == b"52.3")
            .unwrap()
            + 4;
        bytes.splice(position..position, [0xB0, b'C']);
        let snapshot = decode(&bytes).unwrap();
        assert_eq!(snapshot.tank_temperature, 52.3);
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let xml = document(&[
            ("0xdeadbe", "99.9°C"),
            (TemperatureField::Outside.device_id(), "-3.5°C"),
        ]);
        let snapshot = decode(xml.as_bytes()).unwrap();
        assert_eq!(snapshot.outside_temperature, -3.5);
        assert_eq!(snapshot.tank_temperature, 0.0);
    }

    #[test]
    fn missing_ids_default_to_zero() {
        let snapshot = decode(b"<values></values>").unwrap();
        assert_eq!(snapshot, TemperatureSnapshot::default());
    }

    #[test]
    fn unfamiliar_ids_fall_back_to_item_position() {
        let mut entries: Vec<(String, String)> = (0..22)
            .map(|index| (format!("0x50{index:04x}"), format!("{index}.5°C")))
            .collect();
        entries[21].1 = "n/a".into();
        let borrowed: Vec<(&str, &str)> = entries
            .iter()
            .map(|(id, value)| (id.as_str(), value.as_str()))
            .collect();
        let snapshot = decode(document(&borrowed).as_bytes()).unwrap();
        assert_eq!(snapshot.heating_outbound_temperature, 0.5);
        assert_eq!(snapshot.heating_inbound_temperature, 1.5);
        assert_eq!(snapshot.outside_temperature, 4.5);
        assert_eq!(snapshot.tank_temperature, 6.5);
        assert_eq!(snapshot.target_tank_temperature, 7.5);
        assert_eq!(snapshot.drill_inbound_temperature, 8.5);
        assert_eq!(snapshot.drill_outbound_temperature, 9.5);
        assert_eq!(snapshot.ambiant_indoor_temperature, 20.5);
        assert_eq!(snapshot.ambiant_indoor_target_temperature, 0.0);
    }

    #[test]
    fn short_unfamiliar_document_leaves_trailing_fields_at_zero() {
        let xml = document(&[
            ("0x1", "1.0"),
            ("0x2", "2.0"),
            ("0x3", "3.0"),
            ("0x4", "4.0"),
            ("0x5", "5.0"),
        ]);
        let snapshot = decode(xml.as_bytes()).unwrap();
        assert_eq!(snapshot.heating_outbound_temperature, 1.0);
        assert_eq!(snapshot.outside_temperature, 5.0);
        assert_eq!(snapshot.tank_temperature, 0.0);
        assert_eq!(snapshot.ambiant_indoor_target_temperature, 0.0);
    }

    #[test]
    fn unparsable_field_defaults_to_zero_and_keeps_the_rest() {
        let xml = document(&[
            (TemperatureField::Tank.device_id(), "n/a"),
            (TemperatureField::TargetTank.device_id(), "52.0°C"),
        ]);
        let snapshot = decode(xml.as_bytes()).unwrap();
        assert_eq!(snapshot.tank_temperature, 0.0);
        assert_eq!(snapshot.target_tank_temperature, 52.0);
    }

    #[test]
    fn unit_suffix_is_removed_only_once() {
        assert_eq!(parse_reading("21.0°C").unwrap(), 21.0);
        assert_eq!(parse_reading(" 21.0 °C ").unwrap(), 21.0);
        assert!(parse_reading("21.0°C°C").is_err());
        assert!(parse_reading("NaN").is_err());
    }

    #[test]
    fn malformed_documents_fail() {
        let truncated = b"<values><item id='a'><value>1";
        assert!(matches!(
            decode(truncated),
            Err(DecodeError::MalformedDocument(_))
        ));
        assert!(matches!(
            decode(b"<Navigation id='0x1'></Navigation>"),
            Err(DecodeError::MalformedDocument(_))
        ));
    }

    #[test]
    fn payload_uses_fixed_field_names_in_order() {
        let measurement = expected().to_measurement(Utc::now()).unwrap();
        let text = std::str::from_utf8(measurement.payload()).unwrap();
        let mut last = 0;
        for field in TemperatureField::ALL {
            let position = text.find(field.name()).expect("field present");
            assert!(position >= last, "{} out of order", field.name());
            last = position;
        }
        let decoded: TemperatureSnapshot = measurement.decode_payload().unwrap();
        assert_eq!(decoded, expected());
        assert_eq!(
            measurement.measurement_type(),
            MeasurementType::DeviceTemperatureSet
        );
    }
}
