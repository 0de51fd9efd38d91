//! Environment probing.
//!
//! Browser identity, device lists and client details come from the
//! embedding environment. They are injected through [`EnvironmentProbe`]
//! so the collector never reaches for process-wide state.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ============================================================================
// Types
// ============================================================================

/// Name and version pair used for browser, OS and engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameVersion {
    /// Product name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Product version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl NameVersion {
    /// Creates a populated pair.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            version: Some(version.into()),
        }
    }
}

/// Hardware platform description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// Platform class (desktop, mobile, tablet).
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub platform_type: Option<String>,
    /// Hardware vendor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    /// Hardware model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Client environment summary attached to every connection snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDetails {
    /// Browser name and version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser: Option<NameVersion>,
    /// Operating system name and version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<NameVersion>,
    /// Hardware platform.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    /// Rendering engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<NameVersion>,
}

/// One active media device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaDeviceInfo {
    /// Device identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Group the device belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// `audioinput`, `audiooutput` or `videoinput`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Human readable label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

// ============================================================================
// EnvironmentProbe
// ============================================================================

/// Source of environment metadata for connection details.
#[async_trait]
pub trait EnvironmentProbe: Send + Sync {
    /// Stable identifier of this browser instance.
    async fn browser_id(&self) -> String;

    /// Currently active media devices.
    fn active_device_list(&self) -> Vec<MediaDeviceInfo>;

    /// Browser, OS, platform and engine description.
    fn client_details(&self) -> ClientDetails;

    /// Local time zone offset from UTC, in minutes.
    fn time_zone_offset_in_minute(&self) -> i32;
}

// ============================================================================
// StaticEnvironment
// ============================================================================

/// Probe answering with fixed values.
///
/// Used when the embedding application knows its environment up front,
/// and as the default when no probe is configured.
#[derive(Debug, Clone, Default)]
pub struct StaticEnvironment {
    /// Value returned by [`EnvironmentProbe::browser_id`].
    pub browser_id: String,
    /// Value returned by [`EnvironmentProbe::active_device_list`].
    pub devices: Vec<MediaDeviceInfo>,
    /// Value returned by [`EnvironmentProbe::client_details`].
    pub client_details: ClientDetails,
    /// Value returned by [`EnvironmentProbe::time_zone_offset_in_minute`].
    pub time_zone_offset_in_minute: i32,
}

impl StaticEnvironment {
    /// Creates a probe with the given browser id and empty metadata.
    #[must_use]
    pub fn new(browser_id: impl Into<String>) -> Self {
        Self {
            browser_id: browser_id.into(),
            ..Default::default()
        }
    }

    /// Sets the reported devices.
    #[must_use]
    pub fn with_devices(mut self, devices: Vec<MediaDeviceInfo>) -> Self {
        self.devices = devices;
        self
    }

    /// Sets the reported client details.
    #[must_use]
    pub fn with_client_details(mut self, client_details: ClientDetails) -> Self {
        self.client_details = client_details;
        self
    }

    /// Sets the reported time zone offset.
    #[must_use]
    pub fn with_time_zone_offset(mut self, minutes: i32) -> Self {
        self.time_zone_offset_in_minute = minutes;
        self
    }
}

#[async_trait]
impl EnvironmentProbe for StaticEnvironment {
    async fn browser_id(&self) -> String {
        self.browser_id.clone()
    }

    fn active_device_list(&self) -> Vec<MediaDeviceInfo> {
        self.devices.clone()
    }

    fn client_details(&self) -> ClientDetails {
        self.client_details.clone()
    }

    fn time_zone_offset_in_minute(&self) -> i32 {
        self.time_zone_offset_in_minute
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_environment_answers() {
        let probe = StaticEnvironment::new("browser-1")
            .with_time_zone_offset(-120)
            .with_devices(vec![MediaDeviceInfo {
                kind: Some("audioinput".into()),
                ..Default::default()
            }]);

        assert_eq!(probe.browser_id().await, "browser-1");
        assert_eq!(probe.time_zone_offset_in_minute(), -120);
        assert_eq!(probe.active_device_list().len(), 1);
    }

    #[test]
    fn test_platform_type_field_name() {
        let platform = Platform {
            platform_type: Some("desktop".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(&platform).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "desktop" }));
    }
}
