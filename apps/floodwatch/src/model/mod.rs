//! Domain types mirrored from the flood-monitoring backend wire format.
//!
//! Everything here is plain data: the backend owns generation and
//! persistence, the client only parses, reconciles and renders. Timestamps
//! are carried as opaque strings since they are display-only on this side.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Roles issued by the backend and embedded in the bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    FieldResponder,
    Commander,
    GovernmentOfficial,
    Viewer,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Admin,
        Role::FieldResponder,
        Role::Commander,
        Role::GovernmentOfficial,
        Role::Viewer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::FieldResponder => "field_responder",
            Role::Commander => "commander",
            Role::GovernmentOfficial => "government_official",
            Role::Viewer => "viewer",
        }
    }

    pub fn parse(raw: &str) -> Option<Role> {
        Role::ALL.iter().copied().find(|role| role.as_str() == raw)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One versioned reading from a field sensor. An update with the same `id`
/// replaces the prior version wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub id: i64,
    pub sensor_id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub water_level: Option<f64>,
    #[serde(default)]
    pub rainfall: Option<f64>,
    pub timestamp: String,
}

/// Map-marker severity derived from the water level. Thresholds match the
/// backend's alerting rules (7.0 critical, 4.0 warning).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    High,
    Medium,
    Low,
    Unknown,
}

impl Severity {
    pub fn from_water_level(level: Option<f64>) -> Severity {
        match level {
            None => Severity::Unknown,
            Some(l) if l > 7.0 => Severity::High,
            Some(l) if l > 4.0 => Severity::Medium,
            Some(_) => Severity::Low,
        }
    }
}

impl SensorReading {
    pub fn severity(&self) -> Severity {
        Severity::from_water_level(self.water_level)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AlertLevel::Low => "low",
            AlertLevel::Medium => "medium",
            AlertLevel::High => "high",
            AlertLevel::Critical => "critical",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub level: AlertLevel,
    #[serde(default)]
    pub sensor_id: Option<String>,
    pub timestamp: String,
    #[serde(default)]
    pub is_resolved: bool,
}

/// Chat is append-only from the client's perspective; there is no edit or
/// delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub username: String,
    pub content: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Unknown,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Classified point for the risk heatmap. Snapshot-only: the realtime
/// channels never update these, refreshing requires a re-fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskPoint {
    #[serde(default)]
    pub sensor_id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub water_level: Option<f64>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_wire_names() {
        for role in Role::ALL {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("superuser"), None);
    }

    #[test]
    fn severity_thresholds_match_marker_colors() {
        assert_eq!(Severity::from_water_level(Some(8.1)), Severity::High);
        assert_eq!(Severity::from_water_level(Some(7.0)), Severity::Medium);
        assert_eq!(Severity::from_water_level(Some(4.5)), Severity::Medium);
        assert_eq!(Severity::from_water_level(Some(4.0)), Severity::Low);
        assert_eq!(Severity::from_water_level(Some(0.0)), Severity::Low);
        assert_eq!(Severity::from_water_level(None), Severity::Unknown);
    }

    #[test]
    fn sensor_reading_parses_backend_payload() {
        let reading: SensorReading = serde_json::from_str(
            r#"{"id":1,"sensor_id":"S1","latitude":13.08,"longitude":80.27,
                "water_level":8.1,"rainfall":2.0,"timestamp":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(reading.sensor_id, "S1");
        assert_eq!(reading.severity(), Severity::High);
    }

    #[test]
    fn risk_point_tolerates_missing_optionals() {
        let point: RiskPoint = serde_json::from_str(
            r#"{"latitude":13.0,"longitude":80.2,"risk_level":"unknown"}"#,
        )
        .unwrap();
        assert_eq!(point.risk_level, RiskLevel::Unknown);
        assert!(point.sensor_id.is_none());
        assert!(point.water_level.is_none());
    }
}
