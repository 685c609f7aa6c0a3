//! Application state and the single-threaded event loop.
//!
//! All work interleaves on one loop: pending REST responses, realtime
//! channel events and key input each arrive over an mpsc receiver and are
//! folded into view state between renders. Nothing blocks; fetches run on
//! spawned tasks and report back with a ticket so a response that outlives
//! its view is discarded instead of resurrecting stale state.

pub mod render;
pub mod views;

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::Terminal;
use ratatui::backend::Backend;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::api::{ApiClient, ApiError};
use crate::auth::guard::{self, RouteDecision};
use crate::auth::{Session, SessionStore};
use crate::channel::{ChannelEvent, ChannelKind, ChannelState, ChatChannel, GeneralChannel};
use crate::config::Endpoints;
use crate::model::{Alert, ChatMessage, RiskPoint, Role, SensorReading};
use crate::protocol::GeneralEvent;
use crate::sync::{FetchTicket, SyncedList};

use views::{
    AlertsPanel, CHAT_FETCH_LIMIT, ChatPanel, LoginField, LoginForm, MapView, RadiusQuery,
    RegisterField, RegisterForm, RiskView, SENSOR_FETCH_LIMIT, SpatialView,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Register,
    Unauthorized,
    Dashboard,
    RiskMap,
    SpatialAnalysis,
}

impl Route {
    /// `None` means public; `Some(&[])` means any authenticated role.
    pub fn allowed_roles(&self) -> Option<&'static [Role]> {
        match self {
            Route::Login | Route::Register | Route::Unauthorized => None,
            Route::Dashboard | Route::RiskMap => Some(&[]),
            Route::SpatialAnalysis => Some(&[Role::Admin, Role::Commander]),
        }
    }
}

/// Results of spawned REST calls, routed back to the loop with the ticket
/// issued when the fetch began.
pub enum FetchEvent {
    LoggedIn(Result<Session, ApiError>),
    Registered(Result<(), ApiError>),
    Sensors(FetchTicket, Result<Vec<SensorReading>, ApiError>),
    Alerts(FetchTicket, Result<Vec<Alert>, ApiError>),
    ChatHistory(FetchTicket, Result<Vec<ChatMessage>, ApiError>),
    RiskPoints(FetchTicket, Result<Vec<RiskPoint>, ApiError>),
    RadiusSensors(FetchTicket, Result<Vec<SensorReading>, ApiError>),
    AlertResolveAck(Result<Alert, ApiError>),
}

pub struct Dashboard {
    pub map: MapView,
    pub alerts: AlertsPanel,
    pub chat: ChatPanel,
    pub banner: Option<String>,
}

impl Default for Dashboard {
    fn default() -> Self {
        Self {
            map: MapView::new(),
            alerts: AlertsPanel::new(),
            chat: ChatPanel::new(),
            banner: None,
        }
    }
}

struct Channels {
    general: GeneralChannel,
    chat: ChatChannel,
}

pub struct App {
    api: ApiClient,
    store: SessionStore,
    endpoints: Endpoints,
    pub route: Route,
    pub login: LoginForm,
    pub register: RegisterForm,
    pub dashboard: Dashboard,
    pub risk: RiskView,
    pub spatial: SpatialView,
    /// Login-screen notice (forced logout, registration success).
    pub notice: Option<String>,
    channels: Option<Channels>,
    channel_tx: mpsc::UnboundedSender<ChannelEvent>,
    fetch_tx: mpsc::UnboundedSender<FetchEvent>,
    pub should_quit: bool,
}

impl App {
    pub fn new(
        api: ApiClient,
        store: SessionStore,
        endpoints: Endpoints,
        channel_tx: mpsc::UnboundedSender<ChannelEvent>,
        fetch_tx: mpsc::UnboundedSender<FetchEvent>,
    ) -> Self {
        Self {
            api,
            store,
            endpoints,
            route: Route::Login,
            login: LoginForm::new(),
            register: RegisterForm::new(),
            dashboard: Dashboard::default(),
            risk: RiskView::new(),
            spatial: SpatialView::new(),
            notice: None,
            channels: None,
            channel_tx,
            fetch_tx,
            should_quit: false,
        }
    }

    pub fn session(&self) -> Option<Session> {
        self.store.current()
    }

    /// Move to a route, subject to the guard. Guard redirects override the
    /// requested destination.
    pub fn navigate(&mut self, route: Route) {
        let target = match route.allowed_roles() {
            None => route,
            Some(allowed) => match guard::authorize(&self.store, allowed) {
                RouteDecision::Permit => route,
                RouteDecision::RedirectLogin => {
                    self.unmount_dashboard();
                    self.notice = Some("please sign in".to_string());
                    Route::Login
                }
                RouteDecision::RedirectUnauthorized => Route::Unauthorized,
            },
        };
        if self.route == Route::Dashboard && target != Route::Dashboard {
            self.unmount_dashboard();
        }
        self.route = target;
        match target {
            Route::Dashboard => self.mount_dashboard(),
            Route::RiskMap => self.fetch_risk(),
            _ => {}
        }
    }

    /// Dashboard mount: initial snapshots plus both realtime channels.
    fn mount_dashboard(&mut self) {
        self.unmount_dashboard();
        self.dashboard = Dashboard::default();
        self.fetch_sensors();
        self.fetch_alerts();
        self.fetch_chat_history();

        let general = GeneralChannel::open(
            &self.endpoints,
            self.store.clone(),
            self.channel_tx.clone(),
        );
        let chat = ChatChannel::open(
            &self.endpoints,
            self.store.clone(),
            self.channel_tx.clone(),
        );
        match (general, chat) {
            (Ok(general), Ok(chat)) => self.channels = Some(Channels { general, chat }),
            (general, chat) => {
                if let Ok(general) = general {
                    general.close();
                }
                if let Ok(chat) = chat {
                    chat.close();
                }
                self.dashboard.banner = Some("realtime channels unavailable".to_string());
            }
        }
    }

    /// Close both channels. Runs on every exit path: route change, logout,
    /// 401 invalidation, quit.
    fn unmount_dashboard(&mut self) {
        if let Some(channels) = self.channels.take() {
            channels.general.close();
            channels.chat.close();
        }
        self.dashboard.chat.connection = ChannelState::Disconnected;
    }

    pub fn force_logout(&mut self, reason: &str) {
        info!(target: "ui", reason, "returning to login");
        self.store.clear();
        self.unmount_dashboard();
        self.login = LoginForm::new();
        self.notice = Some(reason.to_string());
        self.route = Route::Login;
    }

    fn fetch_sensors(&mut self) {
        let ticket = self.dashboard.map.sensors.begin_fetch();
        let api = self.api.clone();
        let tx = self.fetch_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(FetchEvent::Sensors(
                ticket,
                api.sensors(SENSOR_FETCH_LIMIT).await,
            ));
        });
    }

    fn fetch_alerts(&mut self) {
        let ticket = self.dashboard.alerts.alerts.begin_fetch();
        let api = self.api.clone();
        let tx = self.fetch_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(FetchEvent::Alerts(
                ticket,
                api.latest_unresolved_alerts().await,
            ));
        });
    }

    fn fetch_chat_history(&mut self) {
        let ticket = self.dashboard.chat.messages.begin_fetch();
        let api = self.api.clone();
        let tx = self.fetch_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(FetchEvent::ChatHistory(
                ticket,
                api.chat_messages(0, CHAT_FETCH_LIMIT).await,
            ));
        });
    }

    fn fetch_risk(&mut self) {
        let ticket = self.risk.points.begin_fetch();
        let api = self.api.clone();
        let tx = self.fetch_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(FetchEvent::RiskPoints(ticket, api.risk_map().await));
        });
    }

    fn fetch_radius(&mut self, query: RadiusQuery) {
        let ticket = self.spatial.results.begin_fetch();
        let api = self.api.clone();
        let tx = self.fetch_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(FetchEvent::RadiusSensors(
                ticket,
                api.sensors_in_radius(
                    query.latitude,
                    query.longitude,
                    query.radius_km,
                    query.min_water_level,
                )
                .await,
            ));
        });
    }

    pub fn on_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::General(GeneralEvent::SensorUpdate(reading)) => {
                self.dashboard.map.apply_update(reading);
            }
            ChannelEvent::General(GeneralEvent::NewAlert(alert)) => {
                self.dashboard.alerts.apply_new(alert);
            }
            ChannelEvent::General(GeneralEvent::AlertResolved(resolved)) => {
                self.dashboard.alerts.apply_resolved(resolved.id);
            }
            ChannelEvent::Chat(message) => self.dashboard.chat.apply_message(message),
            ChannelEvent::StateChanged {
                kind: ChannelKind::Chat,
                state,
            } => self.dashboard.chat.connection = state,
            ChannelEvent::StateChanged { .. } => {}
        }
    }

    pub fn on_fetch_event(&mut self, event: FetchEvent) {
        match event {
            FetchEvent::LoggedIn(result) => {
                self.login.busy = false;
                match result {
                    Ok(session) => {
                        info!(target: "ui", username = %session.username, role = %session.role, "logged in");
                        self.notice = None;
                        self.login = LoginForm::new();
                        self.navigate(Route::Dashboard);
                    }
                    Err(err) => self.login.error = Some(err.to_string()),
                }
            }
            FetchEvent::Registered(result) => {
                self.register.busy = false;
                match result {
                    Ok(()) => {
                        self.register = RegisterForm::new();
                        self.notice = Some("account created; sign in".to_string());
                        self.route = Route::Login;
                    }
                    Err(ApiError::Validation(fields)) => self.register.field_errors = fields,
                    Err(err) => self.register.error = Some(err.to_string()),
                }
            }
            FetchEvent::Sensors(ticket, result) => {
                if apply_fetch(&mut self.dashboard.map.sensors, ticket, result) {
                    self.force_logout("session expired; sign in again");
                }
            }
            FetchEvent::Alerts(ticket, result) => {
                if apply_fetch(&mut self.dashboard.alerts.alerts, ticket, result) {
                    self.force_logout("session expired; sign in again");
                }
            }
            FetchEvent::ChatHistory(ticket, result) => {
                if apply_fetch(&mut self.dashboard.chat.messages, ticket, result) {
                    self.force_logout("session expired; sign in again");
                }
            }
            FetchEvent::RiskPoints(ticket, result) => {
                if apply_fetch(&mut self.risk.points, ticket, result) {
                    self.force_logout("session expired; sign in again");
                }
            }
            FetchEvent::RadiusSensors(ticket, result) => {
                if apply_fetch(&mut self.spatial.results, ticket, result) {
                    self.force_logout("session expired; sign in again");
                }
            }
            FetchEvent::AlertResolveAck(result) => match result {
                Ok(alert) => {
                    self.dashboard.alerts.apply_resolved(alert.id);
                }
                Err(ApiError::Unauthorized) => {
                    self.force_logout("session expired; sign in again");
                }
                Err(err) => {
                    warn!(target: "ui", error = %err, "alert resolution failed");
                    self.dashboard.banner = Some(err.to_string());
                }
            },
        }
    }

    pub fn on_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }
        match self.route {
            Route::Login => self.on_login_key(key),
            Route::Register => self.on_register_key(key),
            Route::Unauthorized => match key.code {
                KeyCode::Esc | KeyCode::Enter => self.navigate(Route::Dashboard),
                KeyCode::Char('q') => self.should_quit = true,
                _ => {}
            },
            Route::Dashboard => self.on_dashboard_key(key),
            Route::RiskMap => self.on_risk_key(key),
            Route::SpatialAnalysis => self.on_spatial_key(key),
        }
    }

    fn on_login_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Tab | KeyCode::Up | KeyCode::Down => {
                self.login.focus = match self.login.focus {
                    LoginField::Username => LoginField::Password,
                    LoginField::Password => LoginField::Username,
                };
            }
            KeyCode::Enter => self.submit_login(),
            KeyCode::F(2) => self.route = Route::Register,
            KeyCode::Backspace => {
                self.login.field_mut().pop();
            }
            KeyCode::Char(c) => self.login.field_mut().push(c),
            _ => {}
        }
    }

    fn submit_login(&mut self) {
        if self.login.busy {
            return;
        }
        let username = self.login.username.trim().to_string();
        let password = self.login.password.clone();
        if username.is_empty() || password.is_empty() {
            self.login.error = Some("username and password are required".to_string());
            return;
        }
        self.login.busy = true;
        self.login.error = None;
        let api = self.api.clone();
        let tx = self.fetch_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(FetchEvent::LoggedIn(api.login(&username, &password).await));
        });
    }

    fn on_register_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.route = Route::Login,
            KeyCode::Tab | KeyCode::Down => {
                self.register.focus = match self.register.focus {
                    RegisterField::Username => RegisterField::Password,
                    RegisterField::Password => RegisterField::Role,
                    RegisterField::Role => RegisterField::Username,
                };
            }
            KeyCode::Enter => self.submit_register(),
            KeyCode::Left | KeyCode::Right if self.register.focus == RegisterField::Role => {
                self.register.cycle_role();
            }
            KeyCode::Backspace => match self.register.focus {
                RegisterField::Username => {
                    self.register.username.pop();
                }
                RegisterField::Password => {
                    self.register.password.pop();
                }
                RegisterField::Role => {}
            },
            KeyCode::Char(' ') if self.register.focus == RegisterField::Role => {
                self.register.cycle_role();
            }
            KeyCode::Char(c) => match self.register.focus {
                RegisterField::Username => self.register.username.push(c),
                RegisterField::Password => self.register.password.push(c),
                RegisterField::Role => {}
            },
            _ => {}
        }
    }

    fn submit_register(&mut self) {
        if self.register.busy {
            return;
        }
        let username = self.register.username.trim().to_string();
        let password = self.register.password.clone();
        if username.is_empty() || password.is_empty() {
            self.register.error = Some("username and password are required".to_string());
            return;
        }
        self.register.busy = true;
        self.register.error = None;
        self.register.field_errors.clear();
        let role = self.register.role();
        let api = self.api.clone();
        let tx = self.fetch_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(FetchEvent::Registered(
                api.register(&username, &password, role).await,
            ));
        });
    }

    fn on_dashboard_key(&mut self, key: KeyEvent) {
        if self.dashboard.chat.focused {
            match key.code {
                KeyCode::Esc | KeyCode::Tab => self.dashboard.chat.focused = false,
                KeyCode::Enter => self.send_chat(),
                KeyCode::Backspace => {
                    self.dashboard.chat.input.pop();
                }
                KeyCode::Char(c) => self.dashboard.chat.input.push(c),
                _ => {}
            }
            return;
        }
        match key.code {
            KeyCode::Tab => self.dashboard.chat.focused = true,
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('r') => {
                self.fetch_sensors();
                self.fetch_alerts();
                self.fetch_chat_history();
            }
            KeyCode::Char('x') => self.resolve_newest_alert(),
            KeyCode::Char('d') => self.dashboard.banner = None,
            KeyCode::Char('2') => self.navigate(Route::RiskMap),
            KeyCode::Char('3') => self.navigate(Route::SpatialAnalysis),
            KeyCode::Char('l') => self.force_logout("signed out"),
            _ => {}
        }
    }

    /// Queue the chat input. If the channel is not connected nothing is
    /// written and the input stays populated.
    fn send_chat(&mut self) {
        let content = self.dashboard.chat.input.trim().to_string();
        if content.is_empty() {
            return;
        }
        let sent = self
            .channels
            .as_ref()
            .map(|channels| channels.chat.send(&content))
            .unwrap_or(false);
        if sent {
            self.dashboard.chat.input.clear();
        }
    }

    fn resolve_newest_alert(&mut self) {
        let Some(id) = self.dashboard.alerts.newest().map(|a| a.id) else {
            return;
        };
        let api = self.api.clone();
        let tx = self.fetch_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(FetchEvent::AlertResolveAck(api.resolve_alert(id).await));
        });
    }

    fn on_risk_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc | KeyCode::Char('1') => self.navigate(Route::Dashboard),
            KeyCode::Char('r') => self.fetch_risk(),
            KeyCode::Char('q') => self.should_quit = true,
            _ => {}
        }
    }

    fn on_spatial_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.navigate(Route::Dashboard),
            KeyCode::Tab | KeyCode::Down => self.spatial.next_field(),
            KeyCode::Enter => self.submit_radius_query(),
            KeyCode::Backspace => {
                let focus = self.spatial.focus;
                self.spatial.field_mut(focus).pop();
            }
            KeyCode::Char(c) if c.is_ascii_digit() || c == '.' || c == '-' => {
                let focus = self.spatial.focus;
                self.spatial.field_mut(focus).push(c);
            }
            KeyCode::Char('q') => self.should_quit = true,
            _ => {}
        }
    }

    fn submit_radius_query(&mut self) {
        match self.spatial.parse_query() {
            Ok(query) => {
                self.spatial.form_error = None;
                self.fetch_radius(query);
            }
            Err(message) => self.spatial.form_error = Some(message),
        }
    }

    /// Teardown for process exit.
    pub fn shutdown(&mut self) {
        self.unmount_dashboard();
    }
}

/// Fold a snapshot result into its list. Returns true when the session was
/// rejected and the caller must force a logout.
fn apply_fetch<T>(
    list: &mut SyncedList<T>,
    ticket: FetchTicket,
    result: Result<Vec<T>, ApiError>,
) -> bool {
    match result {
        Ok(items) => {
            list.apply_snapshot(ticket, items);
            false
        }
        Err(ApiError::Unauthorized) => true,
        Err(err) => {
            list.fail(ticket, err.to_string());
            false
        }
    }
}

/// Drive the UI until quit. All inputs arrive over mpsc receivers; the loop
/// renders between events.
pub async fn run<B: Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
    mut channel_rx: mpsc::UnboundedReceiver<ChannelEvent>,
    mut fetch_rx: mpsc::UnboundedReceiver<FetchEvent>,
    mut input_rx: mpsc::UnboundedReceiver<Event>,
) -> anyhow::Result<()> {
    loop {
        terminal.draw(|frame| render::draw(frame, &app))?;
        tokio::select! {
            Some(event) = channel_rx.recv() => app.on_channel_event(event),
            Some(event) = fetch_rx.recv() => app.on_fetch_event(event),
            Some(event) = input_rx.recv() => {
                if let Event::Key(key) = event {
                    app.on_key(key);
                }
            }
            else => break,
        }
        if app.should_quit {
            break;
        }
    }
    app.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::encode_unsigned;
    use crate::channel::ChannelEvent;
    use crate::config::Endpoints;
    use crate::model::AlertLevel;
    use crate::protocol::ResolvedAlert;
    use crate::sync::LoadState;
    use async_trait::async_trait;
    use std::sync::Arc;
    use time::OffsetDateTime;

    struct NoBackend;

    #[async_trait]
    impl crate::api::HttpBackend for NoBackend {
        async fn execute(
            &self,
            _request: crate::api::HttpRequest,
        ) -> Result<crate::api::HttpResponse, ApiError> {
            Err(ApiError::Http {
                status: 503,
                detail: "offline".to_string(),
            })
        }
    }

    fn test_app() -> (App, SessionStore) {
        let store = SessionStore::new();
        let endpoints = Endpoints::new("http://backend.test").unwrap();
        let api =
            ApiClient::with_backend(endpoints.clone(), store.clone(), Arc::new(NoBackend));
        let (channel_tx, _channel_rx) = mpsc::unbounded_channel();
        let (fetch_tx, _fetch_rx) = mpsc::unbounded_channel();
        (
            App::new(api, store.clone(), endpoints, channel_tx, fetch_tx),
            store,
        )
    }

    fn sign_in(store: &SessionStore, role: &str) {
        let exp = OffsetDateTime::now_utc().unix_timestamp() + 600;
        store.set(Session::from_token(encode_unsigned("user", role, exp)).unwrap());
    }

    fn alert(id: i64) -> Alert {
        Alert {
            id,
            title: "Flood Warning".to_string(),
            description: String::new(),
            level: AlertLevel::High,
            sensor_id: None,
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            is_resolved: false,
        }
    }

    #[tokio::test]
    async fn viewer_is_redirected_from_spatial_analysis() {
        let (mut app, store) = test_app();
        sign_in(&store, "viewer");
        app.navigate(Route::SpatialAnalysis);
        assert_eq!(app.route, Route::Unauthorized);

        app.navigate(Route::RiskMap);
        assert_eq!(app.route, Route::RiskMap);
    }

    #[tokio::test]
    async fn commander_reaches_spatial_analysis() {
        let (mut app, store) = test_app();
        sign_in(&store, "commander");
        app.navigate(Route::SpatialAnalysis);
        assert_eq!(app.route, Route::SpatialAnalysis);
    }

    #[tokio::test]
    async fn unauthenticated_navigation_lands_on_login() {
        let (mut app, _store) = test_app();
        app.navigate(Route::Dashboard);
        assert_eq!(app.route, Route::Login);
        assert!(app.notice.is_some());
    }

    #[tokio::test]
    async fn new_alert_then_resolution_round_trips_through_the_panel() {
        let (mut app, store) = test_app();
        sign_in(&store, "admin");
        app.on_channel_event(ChannelEvent::General(GeneralEvent::NewAlert(alert(5))));
        assert_eq!(app.dashboard.alerts.newest().map(|a| a.id), Some(5));

        app.on_channel_event(ChannelEvent::General(GeneralEvent::AlertResolved(
            ResolvedAlert { id: 5 },
        )));
        assert!(app.dashboard.alerts.alerts.is_empty());
    }

    #[tokio::test]
    async fn chat_send_while_disconnected_keeps_the_input() {
        let (mut app, store) = test_app();
        sign_in(&store, "viewer");
        app.dashboard.chat.input = "evacuating".to_string();
        app.send_chat();
        assert_eq!(app.dashboard.chat.input, "evacuating");
    }

    #[tokio::test]
    async fn unauthorized_fetch_forces_logout() {
        let (mut app, store) = test_app();
        sign_in(&store, "admin");
        app.route = Route::Dashboard;
        let ticket = app.dashboard.map.sensors.begin_fetch();
        app.on_fetch_event(FetchEvent::Sensors(ticket, Err(ApiError::Unauthorized)));
        assert_eq!(app.route, Route::Login);
        assert!(store.current().is_none());
    }

    #[tokio::test]
    async fn failed_snapshot_surfaces_as_view_error_not_logout() {
        let (mut app, store) = test_app();
        sign_in(&store, "admin");
        app.route = Route::RiskMap;
        let ticket = app.risk.points.begin_fetch();
        app.on_fetch_event(FetchEvent::RiskPoints(
            ticket,
            Err(ApiError::Http {
                status: 500,
                detail: "db down".to_string(),
            }),
        ));
        assert!(matches!(app.risk.points.state(), LoadState::Failed(_)));
        assert_eq!(app.route, Route::RiskMap);
        assert!(store.current().is_some());
    }
}
