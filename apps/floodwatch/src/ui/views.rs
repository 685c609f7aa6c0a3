//! Per-surface view state.
//!
//! Each view owns exactly one synchronized collection and nothing else
//! mutates it. The realtime channels emit events; the app loop routes them
//! to the view they concern; the view folds them in via the reconciler.

use crate::api::FieldError;
use crate::channel::ChannelState;
use crate::model::{Alert, ChatMessage, RiskPoint, Role, SensorReading};
use crate::sync::SyncedList;

/// Initial snapshot size for the live map.
pub const SENSOR_FETCH_LIMIT: usize = 50;
/// Most-recent sensor versions kept on the map.
pub const SENSOR_CAP: usize = 100;
/// The notification strip shows only the newest unresolved alerts.
pub const ALERT_CAP: usize = 2;
pub const CHAT_FETCH_LIMIT: usize = 50;

/// Live sensor map: snapshot from `/sensor-data`, folded `sensor_update`
/// deltas, bounded most-recent-first.
pub struct MapView {
    pub sensors: SyncedList<SensorReading>,
}

impl MapView {
    pub fn new() -> Self {
        Self {
            sensors: SyncedList::new(Some(SENSOR_CAP)),
        }
    }

    pub fn apply_update(&mut self, reading: SensorReading) {
        self.sensors.upsert(reading, |s| s.id);
    }
}

impl Default for MapView {
    fn default() -> Self {
        Self::new()
    }
}

/// Unresolved-alert notifications: `new_alert` upserts, `alert_resolved`
/// removes.
pub struct AlertsPanel {
    pub alerts: SyncedList<Alert>,
}

impl AlertsPanel {
    pub fn new() -> Self {
        Self {
            alerts: SyncedList::new(Some(ALERT_CAP)),
        }
    }

    pub fn apply_new(&mut self, alert: Alert) {
        self.alerts.upsert(alert, |a| a.id);
    }

    pub fn apply_resolved(&mut self, id: i64) -> bool {
        self.alerts.remove(&id, |a| a.id)
    }

    pub fn newest(&self) -> Option<&Alert> {
        self.alerts.items().first()
    }
}

impl Default for AlertsPanel {
    fn default() -> Self {
        Self::new()
    }
}

/// Chat: history snapshot plus unconditional appends; messages are never
/// revised. The input line stays populated when a send cannot go out.
pub struct ChatPanel {
    pub messages: SyncedList<ChatMessage>,
    pub input: String,
    pub connection: ChannelState,
    pub focused: bool,
}

impl ChatPanel {
    pub fn new() -> Self {
        Self {
            messages: SyncedList::new(None),
            input: String::new(),
            connection: ChannelState::Disconnected,
            focused: false,
        }
    }

    pub fn apply_message(&mut self, message: ChatMessage) {
        self.messages.append(message);
    }
}

impl Default for ChatPanel {
    fn default() -> Self {
        Self::new()
    }
}

/// Risk heatmap: snapshot-only, refreshed on demand.
pub struct RiskView {
    pub points: SyncedList<RiskPoint>,
}

impl RiskView {
    pub fn new() -> Self {
        Self {
            points: SyncedList::new(None),
        }
    }
}

impl Default for RiskView {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialField {
    Latitude,
    Longitude,
    RadiusKm,
    MinWaterLevel,
}

impl SpatialField {
    pub const ORDER: [SpatialField; 4] = [
        SpatialField::Latitude,
        SpatialField::Longitude,
        SpatialField::RadiusKm,
        SpatialField::MinWaterLevel,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SpatialField::Latitude => "latitude",
            SpatialField::Longitude => "longitude",
            SpatialField::RadiusKm => "radius (km)",
            SpatialField::MinWaterLevel => "min water level (optional)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_km: f64,
    pub min_water_level: Option<f64>,
}

/// Spatial analysis: a radius query whose results render as their own
/// collection with loading and error state isolated from the risk snapshot.
pub struct SpatialView {
    pub latitude: String,
    pub longitude: String,
    pub radius_km: String,
    pub min_water_level: String,
    pub focus: SpatialField,
    pub results: SyncedList<SensorReading>,
    pub form_error: Option<String>,
}

impl SpatialView {
    pub fn new() -> Self {
        Self {
            latitude: String::new(),
            longitude: String::new(),
            radius_km: String::new(),
            min_water_level: String::new(),
            focus: SpatialField::Latitude,
            results: SyncedList::new(None),
            form_error: None,
        }
    }

    pub fn field_mut(&mut self, field: SpatialField) -> &mut String {
        match field {
            SpatialField::Latitude => &mut self.latitude,
            SpatialField::Longitude => &mut self.longitude,
            SpatialField::RadiusKm => &mut self.radius_km,
            SpatialField::MinWaterLevel => &mut self.min_water_level,
        }
    }

    pub fn field(&self, field: SpatialField) -> &str {
        match field {
            SpatialField::Latitude => &self.latitude,
            SpatialField::Longitude => &self.longitude,
            SpatialField::RadiusKm => &self.radius_km,
            SpatialField::MinWaterLevel => &self.min_water_level,
        }
    }

    pub fn next_field(&mut self) {
        let index = SpatialField::ORDER
            .iter()
            .position(|f| *f == self.focus)
            .unwrap_or(0);
        self.focus = SpatialField::ORDER[(index + 1) % SpatialField::ORDER.len()];
    }

    pub fn parse_query(&self) -> Result<RadiusQuery, String> {
        let latitude: f64 = self
            .latitude
            .trim()
            .parse()
            .map_err(|_| "latitude must be a number".to_string())?;
        let longitude: f64 = self
            .longitude
            .trim()
            .parse()
            .map_err(|_| "longitude must be a number".to_string())?;
        let radius_km: f64 = self
            .radius_km
            .trim()
            .parse()
            .map_err(|_| "radius must be a number".to_string())?;
        if radius_km <= 0.0 {
            return Err("radius must be positive".to_string());
        }
        let min_water_level = match self.min_water_level.trim() {
            "" => None,
            raw => Some(
                raw.parse()
                    .map_err(|_| "min water level must be a number".to_string())?,
            ),
        };
        Ok(RadiusQuery {
            latitude,
            longitude,
            radius_km,
            min_water_level,
        })
    }
}

impl Default for SpatialView {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginField {
    Username,
    Password,
}

pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub focus: LoginField,
    pub busy: bool,
    pub error: Option<String>,
}

impl LoginForm {
    pub fn new() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            focus: LoginField::Username,
            busy: false,
            error: None,
        }
    }

    pub fn field_mut(&mut self) -> &mut String {
        match self.focus {
            LoginField::Username => &mut self.username,
            LoginField::Password => &mut self.password,
        }
    }
}

impl Default for LoginForm {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterField {
    Username,
    Password,
    Role,
}

pub struct RegisterForm {
    pub username: String,
    pub password: String,
    pub role_index: usize,
    pub focus: RegisterField,
    pub busy: bool,
    pub field_errors: Vec<FieldError>,
    pub error: Option<String>,
}

impl RegisterForm {
    pub fn new() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            role_index: Role::ALL.len() - 1, // default to viewer
            focus: RegisterField::Username,
            busy: false,
            field_errors: Vec::new(),
            error: None,
        }
    }

    pub fn role(&self) -> Role {
        Role::ALL[self.role_index % Role::ALL.len()]
    }

    pub fn cycle_role(&mut self) {
        self.role_index = (self.role_index + 1) % Role::ALL.len();
    }
}

impl Default for RegisterForm {
    fn default() -> Self {
        Self::new()
    }
}
