//! ---
//! pac_section: "03-device-source"
//! pac_subsection: "module"
//! pac_type: "source"
//! pac_scope: "code"
//! pac_description: "SWC heat-pump session, decoder and supervising source."
//! pac_version: "v0.1.0"
//! pac_owner: "tbd"
//! ---
//! Text commands understood by the control unit and parsing of its login banner.
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ProtocolError;

/// Every snapshot document starts with this element.
pub const SNAPSHOT_MARKER: &str = "<values>";
/// Verb asking the device to push a fresh snapshot.
pub const REFRESH: &str = "REFRESH";

const LOGIN_PREFIX: &str = "LOGIN;";
const GET_PREFIX: &str = "GET;";

// The snapshot resource is the second item of the first navigation section.
static RESOURCE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?s)<Navigation id='.*?'>.*?<item id='.*?'>.*?<name>.*?</name>.*?<item id='(.*?)'>",
    )
    .unwrap_or_else(|err| panic!("resource token pattern is invalid: {err}"))
});

/// `LOGIN;<pin>`
pub fn login_command(pin: &str) -> String {
    format!("{LOGIN_PREFIX}{pin}")
}

/// `GET;<resource>`
pub fn get_command(resource: &str) -> String {
    format!("{GET_PREFIX}{resource}")
}

/// Whether a raw frame is a snapshot document.
pub fn is_snapshot(payload: &[u8]) -> bool {
    payload.starts_with(SNAPSHOT_MARKER.as_bytes())
}

/// Recover the snapshot resource token from the login banner.
pub fn discover_resource_token(banner: &str) -> Result<String, ProtocolError> {
    RESOURCE_TOKEN
        .captures(banner)
        .and_then(|captures| captures.get(1))
        .map(|token| token.as_str().to_owned())
        .filter(|token| !token.is_empty())
        .ok_or(ProtocolError::UnexpectedLoginResponse)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BANNER: &str = "<Navigation id='0x4c5a88'>\n\
        <item id='0x46a1c0'><name>Informationen</name>\n\
        <item id='0x46bd50'><name>Temperaturen</name></item>\n\
        <item id='0x46c4e8'><name>Eingaenge</name></item>\n\
        </item></Navigation>";

    #[test]
    fn commands_are_formatted() {
        assert_eq!(login_command("000000"), "LOGIN;000000");
        assert_eq!(get_command("0x46bd50"), "GET;0x46bd50");
    }

    #[test]
    fn token_is_taken_from_first_navigation_section() {
        assert_eq!(discover_resource_token(BANNER).unwrap(), "0x46bd50");
    }

    #[test]
    fn banner_without_navigation_is_rejected() {
        assert_eq!(
            discover_resource_token("<error>bad pin</error>"),
            Err(ProtocolError::UnexpectedLoginResponse)
        );
        assert_eq!(
            discover_resource_token(""),
            Err(ProtocolError::UnexpectedLoginResponse)
        );
    }

    #[test]
    fn snapshot_detection_uses_raw_prefix() {
        assert!(is_snapshot(b"<values><item id='a'/></values>"));
        assert!(!is_snapshot(b" <values></values>"));
        assert!(!is_snapshot(BANNER.as_bytes()));
    }
}
