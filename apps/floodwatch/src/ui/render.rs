//! Ratatui layer. Pure projection of [`App`] state; no mutation here.

use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, List, ListItem, Paragraph, Row, Table, Wrap};

use crate::channel::ChannelState;
use crate::model::{AlertLevel, RiskLevel, Severity};
use crate::sync::{LoadState, SyncedList};

use super::views::{LoginField, RegisterField, SpatialField};
use super::{App, Route};

pub fn draw(frame: &mut Frame, app: &App) {
    match app.route {
        Route::Login => draw_login(frame, app),
        Route::Register => draw_register(frame, app),
        Route::Unauthorized => draw_unauthorized(frame),
        Route::Dashboard => draw_dashboard(frame, app),
        Route::RiskMap => draw_risk_map(frame, app),
        Route::SpatialAnalysis => draw_spatial(frame, app),
    }
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::High => Color::Red,
        Severity::Medium => Color::Yellow,
        Severity::Low => Color::Blue,
        Severity::Unknown => Color::DarkGray,
    }
}

fn risk_color(level: RiskLevel) -> Color {
    match level {
        RiskLevel::High => Color::Red,
        RiskLevel::Medium => Color::Yellow,
        RiskLevel::Low => Color::Green,
        RiskLevel::Unknown => Color::DarkGray,
    }
}

fn alert_color(level: AlertLevel) -> Color {
    match level {
        AlertLevel::Critical => Color::Magenta,
        AlertLevel::High => Color::Red,
        AlertLevel::Medium => Color::Yellow,
        AlertLevel::Low => Color::Green,
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.2}"),
        None => "-".to_string(),
    }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    Rect {
        x,
        y,
        width: width.min(area.width),
        height: height.min(area.height),
    }
}

fn field_line<'a>(label: &'a str, value: &'a str, focused: bool, masked: bool) -> Line<'a> {
    let shown = if masked {
        "*".repeat(value.chars().count())
    } else {
        value.to_string()
    };
    let style = if focused {
        Style::default().add_modifier(Modifier::BOLD).fg(Color::Cyan)
    } else {
        Style::default()
    };
    Line::from(vec![
        Span::styled(format!("{label:>12}: "), style),
        Span::raw(shown),
        Span::raw(if focused { "_" } else { "" }),
    ])
}

fn draw_login(frame: &mut Frame, app: &App) {
    let area = centered(frame.area(), 60, 12);
    let mut lines = vec![
        field_line(
            "username",
            &app.login.username,
            app.login.focus == LoginField::Username,
            false,
        ),
        field_line(
            "password",
            &app.login.password,
            app.login.focus == LoginField::Password,
            true,
        ),
        Line::raw(""),
    ];
    if app.login.busy {
        lines.push(Line::styled(
            "signing in...",
            Style::default().fg(Color::DarkGray),
        ));
    }
    if let Some(error) = &app.login.error {
        lines.push(Line::styled(
            error.clone(),
            Style::default().fg(Color::Red),
        ));
    }
    if let Some(notice) = &app.notice {
        lines.push(Line::styled(
            notice.clone(),
            Style::default().fg(Color::Yellow),
        ));
    }
    lines.push(Line::raw(""));
    lines.push(Line::styled(
        "enter: sign in  tab: switch field  f2: register  ctrl-c: quit",
        Style::default().fg(Color::DarkGray),
    ));
    let panel = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(" floodwatch "));
    frame.render_widget(panel, area);
}

fn draw_register(frame: &mut Frame, app: &App) {
    let area = centered(frame.area(), 64, 14);
    let mut lines = vec![
        field_line(
            "username",
            &app.register.username,
            app.register.focus == RegisterField::Username,
            false,
        ),
        field_line(
            "password",
            &app.register.password,
            app.register.focus == RegisterField::Password,
            true,
        ),
        field_line(
            "role",
            app.register.role().as_str(),
            app.register.focus == RegisterField::Role,
            false,
        ),
        Line::raw(""),
    ];
    for field_error in &app.register.field_errors {
        lines.push(Line::styled(
            field_error.to_string(),
            Style::default().fg(Color::Red),
        ));
    }
    if let Some(error) = &app.register.error {
        lines.push(Line::styled(
            error.clone(),
            Style::default().fg(Color::Red),
        ));
    }
    if app.register.busy {
        lines.push(Line::styled(
            "creating account...",
            Style::default().fg(Color::DarkGray),
        ));
    }
    lines.push(Line::raw(""));
    lines.push(Line::styled(
        "enter: create  tab: next field  left/right: role  esc: back",
        Style::default().fg(Color::DarkGray),
    ));
    let panel = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(" register "));
    frame.render_widget(panel, area);
}

fn draw_unauthorized(frame: &mut Frame) {
    let area = centered(frame.area(), 56, 6);
    let panel = Paragraph::new(vec![
        Line::styled(
            "your role does not permit this view",
            Style::default().fg(Color::Red),
        ),
        Line::raw(""),
        Line::styled(
            "enter/esc: dashboard  q: quit",
            Style::default().fg(Color::DarkGray),
        ),
    ])
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::ALL).title(" unauthorized "));
    frame.render_widget(panel, area);
}

fn draw_dashboard(frame: &mut Frame, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(4),
            Constraint::Min(5),
            Constraint::Length(1),
        ])
        .split(frame.area());

    frame.render_widget(header(app), rows[0]);
    draw_alert_strip(frame, app, rows[1]);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(62), Constraint::Percentage(38)])
        .split(rows[2]);
    draw_sensor_table(frame, app, columns[0]);
    draw_chat(frame, app, columns[1]);

    let footer = match &app.dashboard.banner {
        Some(banner) => Line::styled(
            format!("{banner}  (d to dismiss)"),
            Style::default().fg(Color::Red),
        ),
        None => Line::styled(
            "tab: chat  r: refresh  x: resolve alert  2: risk map  3: spatial  l: logout  q: quit",
            Style::default().fg(Color::DarkGray),
        ),
    };
    frame.render_widget(Paragraph::new(footer), rows[3]);
}

fn header(app: &App) -> Paragraph<'static> {
    let who = match app.session() {
        Some(session) => format!("{} ({})", session.username, session.role),
        None => "-".to_string(),
    };
    Paragraph::new(Line::from(vec![
        Span::styled(
            " floodwatch ",
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!("| {who}")),
    ]))
}

fn draw_alert_strip(frame: &mut Frame, app: &App, area: Rect) {
    let alerts = &app.dashboard.alerts.alerts;
    let lines: Vec<Line> = if alerts.is_empty() {
        vec![Line::styled(
            "no unresolved alerts",
            Style::default().fg(Color::DarkGray),
        )]
    } else {
        alerts
            .items()
            .iter()
            .map(|alert| {
                Line::from(vec![
                    Span::styled(
                        format!("[{}] ", alert.level),
                        Style::default()
                            .fg(alert_color(alert.level))
                            .add_modifier(Modifier::BOLD),
                    ),
                    Span::raw(alert.title.clone()),
                    Span::styled(
                        format!("  {}", alert.timestamp),
                        Style::default().fg(Color::DarkGray),
                    ),
                ])
            })
            .collect()
    };
    let panel = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(" alerts "));
    frame.render_widget(panel, area);
}

fn list_status<T>(list: &SyncedList<T>) -> Option<Line<'_>> {
    match list.state() {
        LoadState::Loading if list.is_empty() => Some(Line::styled(
            "loading...",
            Style::default().fg(Color::DarkGray),
        )),
        LoadState::Failed(message) => Some(Line::styled(
            message.as_str(),
            Style::default().fg(Color::Red),
        )),
        _ => None,
    }
}

fn draw_sensor_table(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title(" sensors ");
    if let Some(status) = list_status(&app.dashboard.map.sensors) {
        frame.render_widget(Paragraph::new(status).block(block), area);
        return;
    }
    let rows: Vec<Row> = app
        .dashboard
        .map
        .sensors
        .items()
        .iter()
        .map(|reading| {
            let color = severity_color(reading.severity());
            Row::new(vec![
                Cell::from(reading.sensor_id.clone()),
                Cell::from(format!("{:.4}", reading.latitude)),
                Cell::from(format!("{:.4}", reading.longitude)),
                Cell::from(fmt_opt(reading.water_level)),
                Cell::from(fmt_opt(reading.rainfall)),
                Cell::from(reading.timestamp.clone()),
            ])
            .style(Style::default().fg(color))
        })
        .collect();
    let table = Table::new(
        rows,
        [
            Constraint::Length(10),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Length(7),
            Constraint::Length(7),
            Constraint::Min(20),
        ],
    )
    .header(
        Row::new(vec!["sensor", "lat", "lon", "level", "rain", "updated"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(block);
    frame.render_widget(table, area);
}

fn draw_chat(frame: &mut Frame, app: &App, area: Rect) {
    let chat = &app.dashboard.chat;
    let badge = match chat.connection {
        ChannelState::Connected => Span::styled("live", Style::default().fg(Color::Green)),
        ChannelState::Connecting => {
            Span::styled("connecting", Style::default().fg(Color::Yellow))
        }
        ChannelState::Disconnected => {
            Span::styled("offline", Style::default().fg(Color::Red))
        }
    };
    let title = Line::from(vec![Span::raw(" chat ["), badge, Span::raw("] ")]);

    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(area);

    let block = Block::default().borders(Borders::ALL).title(title);
    if let Some(status) = list_status(&chat.messages) {
        frame.render_widget(Paragraph::new(status).block(block), sections[0]);
    } else {
        let height = sections[0].height.saturating_sub(2) as usize;
        let messages = chat.messages.items();
        let start = messages.len().saturating_sub(height);
        let items: Vec<ListItem> = messages[start..]
            .iter()
            .map(|message| {
                ListItem::new(Line::from(vec![
                    Span::styled(
                        format!("{}: ", message.username),
                        Style::default().add_modifier(Modifier::BOLD),
                    ),
                    Span::raw(message.content.clone()),
                ]))
            })
            .collect();
        frame.render_widget(List::new(items).block(block), sections[0]);
    }

    let input_style = if chat.focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let input = Paragraph::new(Line::from(vec![
        Span::raw(chat.input.clone()),
        Span::raw(if chat.focused { "_" } else { "" }),
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(input_style)
            .title(" message "),
    );
    frame.render_widget(input, sections[1]);
}

fn draw_risk_map(frame: &mut Frame, app: &App) {
    let area = frame.area();
    let rows_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(1)])
        .split(area);

    let block = Block::default().borders(Borders::ALL).title(" risk map ");
    if let Some(status) = list_status(&app.risk.points) {
        frame.render_widget(Paragraph::new(status).block(block), rows_layout[0]);
    } else {
        let rows: Vec<Row> = app
            .risk
            .points
            .items()
            .iter()
            .map(|point| {
                Row::new(vec![
                    Cell::from(point.sensor_id.clone().unwrap_or_else(|| "-".to_string())),
                    Cell::from(format!("{:.4}", point.latitude)),
                    Cell::from(format!("{:.4}", point.longitude)),
                    Cell::from(point.risk_level.to_string()),
                    Cell::from(fmt_opt(point.water_level)),
                    Cell::from(point.last_updated.clone().unwrap_or_else(|| "-".to_string())),
                ])
                .style(Style::default().fg(risk_color(point.risk_level)))
            })
            .collect();
        let table = Table::new(
            rows,
            [
                Constraint::Length(10),
                Constraint::Length(9),
                Constraint::Length(9),
                Constraint::Length(8),
                Constraint::Length(7),
                Constraint::Min(20),
            ],
        )
        .header(
            Row::new(vec!["sensor", "lat", "lon", "risk", "level", "updated"])
                .style(Style::default().add_modifier(Modifier::BOLD)),
        )
        .block(block);
        frame.render_widget(table, rows_layout[0]);
    }
    frame.render_widget(
        Paragraph::new(Line::styled(
            "r: refresh  esc/1: dashboard  q: quit",
            Style::default().fg(Color::DarkGray),
        )),
        rows_layout[1],
    );
}

fn draw_spatial(frame: &mut Frame, app: &App) {
    let rows_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(8),
            Constraint::Min(5),
            Constraint::Length(1),
        ])
        .split(frame.area());

    let mut lines: Vec<Line> = SpatialField::ORDER
        .iter()
        .map(|field| {
            field_line(
                field.label(),
                app.spatial.field(*field),
                app.spatial.focus == *field,
                false,
            )
        })
        .collect();
    if let Some(error) = &app.spatial.form_error {
        lines.push(Line::styled(
            error.clone(),
            Style::default().fg(Color::Red),
        ));
    }
    let form = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" radius query "),
    );
    frame.render_widget(form, rows_layout[0]);

    let block = Block::default().borders(Borders::ALL).title(" results ");
    if let Some(status) = list_status(&app.spatial.results) {
        frame.render_widget(Paragraph::new(status).block(block), rows_layout[1]);
    } else {
        let rows: Vec<Row> = app
            .spatial
            .results
            .items()
            .iter()
            .map(|reading| {
                Row::new(vec![
                    Cell::from(reading.sensor_id.clone()),
                    Cell::from(format!("{:.4}", reading.latitude)),
                    Cell::from(format!("{:.4}", reading.longitude)),
                    Cell::from(fmt_opt(reading.water_level)),
                    Cell::from(reading.timestamp.clone()),
                ])
                .style(Style::default().fg(severity_color(reading.severity())))
            })
            .collect();
        let table = Table::new(
            rows,
            [
                Constraint::Length(10),
                Constraint::Length(9),
                Constraint::Length(9),
                Constraint::Length(7),
                Constraint::Min(20),
            ],
        )
        .header(
            Row::new(vec!["sensor", "lat", "lon", "level", "updated"])
                .style(Style::default().add_modifier(Modifier::BOLD)),
        )
        .block(block);
        frame.render_widget(table, rows_layout[1]);
    }

    frame.render_widget(
        Paragraph::new(Line::styled(
            "enter: run query  tab: next field  esc: dashboard  q: quit",
            Style::default().fg(Color::DarkGray),
        )),
        rows_layout[2],
    );
}
