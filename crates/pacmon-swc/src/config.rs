//! ---
//! pac_section: "03-device-source"
//! pac_subsection: "module"
//! pac_type: "source"
//! pac_scope: "code"
//! pac_description: "SWC heat-pump session, decoder and supervising source."
//! pac_version: "v0.1.0"
//! pac_owner: "tbd"
//! ---
use std::fmt;
use std::time::Duration;

use pacmon_common::config::SourceSettings;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use url::Url;

use crate::error::ConfigError;

/// Poll interval used when the configured one is zero.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

const WEBSOCKET_SCHEME: &str = "ws";

/// How the session picks the resource requested with `GET;<id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceSelector {
    /// Recover the token from the login banner.
    Discover,
    /// Always request this identifier.
    Fixed(String),
}

/// Validated, immutable session configuration shared by every generation.
#[derive(Clone)]
pub struct SessionConfig {
    endpoint: String,
    poll_interval: Duration,
    pin: String,
    subprotocol: Option<HeaderValue>,
    resource: ResourceSelector,
    channel_capacity: usize,
}

impl SessionConfig {
    /// WebSocket URL of the control unit.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Delay between two `REFRESH` commands; never zero.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// PIN sent with the `LOGIN` command.
    pub fn pin(&self) -> &str {
        &self.pin
    }

    /// Sub-protocol requested during the handshake, if any.
    pub fn subprotocol(&self) -> Option<&HeaderValue> {
        self.subprotocol.as_ref()
    }

    /// Resource selection strategy for the snapshot request.
    pub fn resource(&self) -> &ResourceSelector {
        &self.resource
    }

    /// Number of measurements buffered between sessions and the consumer.
    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }
}

impl TryFrom<&SourceSettings> for SessionConfig {
    type Error = ConfigError;

    fn try_from(settings: &SourceSettings) -> Result<Self, Self::Error> {
        let endpoint = settings.endpoint.trim().to_owned();
        let url = Url::parse(&endpoint).map_err(|err| ConfigError::InvalidEndpoint {
            endpoint: endpoint.clone(),
            reason: err.to_string(),
        })?;
        if url.scheme() != WEBSOCKET_SCHEME || url.host_str().is_none() {
            return Err(ConfigError::UnsupportedScheme { endpoint });
        }

        let poll_interval = if settings.poll_interval.is_zero() {
            DEFAULT_POLL_INTERVAL
        } else {
            settings.poll_interval
        };

        let subprotocol = match settings.subprotocol.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(protocol) => Some(
                HeaderValue::from_str(protocol)
                    .map_err(|_| ConfigError::InvalidSubprotocol(protocol.to_owned()))?,
            ),
        };

        let resource = match settings.resource_id.as_deref().map(str::trim) {
            None | Some("") => ResourceSelector::Discover,
            Some(id) => ResourceSelector::Fixed(id.to_owned()),
        };

        if settings.channel_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }

        Ok(Self {
            endpoint,
            poll_interval,
            pin: settings.pin.clone(),
            subprotocol,
            resource,
            channel_capacity: settings.channel_capacity,
        })
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("endpoint", &self.endpoint)
            .field("poll_interval", &self.poll_interval)
            .field("pin", &"<redacted>")
            .field("subprotocol", &self.subprotocol)
            .field("resource", &self.resource)
            .field("channel_capacity", &self.channel_capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_websocket_url_is_rejected() {
        let err = SessionConfig::try_from(&SourceSettings::for_endpoint(
            "http://when-it-should-be-ws",
        ))
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedScheme { .. }));
    }

    #[test]
    fn unparsable_endpoint_is_rejected() {
        let err = SessionConfig::try_from(&SourceSettings::for_endpoint("not a url")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint { .. }));
    }

    #[test]
    fn zero_poll_interval_defaults_to_one_minute() {
        let settings = SourceSettings {
            poll_interval: Duration::ZERO,
            ..SourceSettings::for_endpoint("ws://when-it-should-be-ws")
        };
        let config = SessionConfig::try_from(&settings).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
    }

    #[test]
    fn resource_and_subprotocol_follow_settings() {
        let settings = SourceSettings {
            resource_id: Some("0x46bd50".into()),
            subprotocol: Some(String::new()),
            ..SourceSettings::for_endpoint("ws://10.0.0.5:8214/")
        };
        let config = SessionConfig::try_from(&settings).unwrap();
        assert_eq!(
            config.resource(),
            &ResourceSelector::Fixed("0x46bd50".into())
        );
        assert!(config.subprotocol().is_none());

        let defaults =
            SessionConfig::try_from(&SourceSettings::for_endpoint("ws://10.0.0.5:8214/")).unwrap();
        assert_eq!(defaults.resource(), &ResourceSelector::Discover);
        assert_eq!(defaults.subprotocol().unwrap(), "Lux_WS");
    }

    #[test]
    fn debug_output_hides_pin() {
        let settings = SourceSettings {
            pin: "987654".into(),
            ..SourceSettings::for_endpoint("ws://10.0.0.5:8214/")
        };
        let config = SessionConfig::try_from(&settings).unwrap();
        assert!(!format!("{config:?}").contains("987654"));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let settings = SourceSettings {
            channel_capacity: 0,
            ..SourceSettings::for_endpoint("ws://10.0.0.5:8214/")
        };
        assert_eq!(
            SessionConfig::try_from(&settings).unwrap_err(),
            ConfigError::ZeroCapacity
        );
    }
}
