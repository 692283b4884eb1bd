//! Pure rendering of a [`ReplaySession`] onto a ratatui frame.

use ratatui::{
    prelude::*,
    symbols::Marker,
    widgets::{
        Axis, Block, BorderType, Borders, Cell, Chart, Dataset, Gauge, GraphType, Paragraph, Row,
        Table, Wrap,
    },
};

use crate::core::{Phase, ReplaySession, Snapshot};

const ACCENT: Color = Color::LightBlue;

pub fn draw_dashboard(f: &mut Frame, session: &ReplaySession) {
    let snapshot = session.snapshot();

    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(8),    // Chart + side panel
            Constraint::Length(14), // Recent points
            Constraint::Length(1), // Footer
        ])
        .split(f.size());

    draw_header(f, main_layout[0], session);

    let content_layout = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(75), Constraint::Percentage(25)])
        .split(main_layout[1]);

    if session.phase() == Phase::Error {
        draw_failure(f, content_layout[0], session);
    } else {
        draw_chart(f, content_layout[0], session, &snapshot);
    }
    draw_counters(f, content_layout[1], session, &snapshot);
    draw_recent(f, main_layout[2], &snapshot);
    draw_footer(f, main_layout[3], &snapshot);
}

fn panel(title: &str) -> Block<'_> {
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::new().fg(ACCENT))
}

fn draw_header(f: &mut Frame, area: Rect, session: &ReplaySession) {
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            "Real-Time Anomaly Detection ",
            Style::new().fg(ACCENT).add_modifier(Modifier::BOLD),
        ),
        Span::raw("| "),
        Span::styled(
            session.settings().source.series.clone(),
            Style::new().fg(Color::Cyan),
        ),
    ]))
    .alignment(Alignment::Center)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::new().fg(ACCENT))
            .border_type(BorderType::Thick),
    );
    f.render_widget(header, area);
}

fn draw_failure(f: &mut Frame, area: Rect, session: &ReplaySession) {
    let message = session.failure().unwrap_or("Session failed");
    let body = Paragraph::new(vec![
        Line::from(Span::styled(
            "Replay halted",
            Style::new().fg(Color::Red).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(message.to_string()),
        Line::from(""),
        Line::from("Fix the source path and restart."),
    ])
    .wrap(Wrap { trim: true })
    .block(panel(" Error "));
    f.render_widget(body, area);
}

fn draw_chart(f: &mut Frame, area: Rect, session: &ReplaySession, snapshot: &Snapshot) {
    let series = session.series();
    if series.is_empty() {
        let placeholder = Paragraph::new("Loading series...")
            .alignment(Alignment::Center)
            .style(Style::new().fg(Color::DarkGray))
            .block(panel(" Series "));
        f.render_widget(placeholder, area);
        return;
    }

    let shown = snapshot.points_streamed;
    let values = &series.values()[..shown];

    let line: Vec<(f64, f64)> = values
        .iter()
        .enumerate()
        .map(|(i, &v)| (i as f64, v))
        .collect();
    let flagged: Vec<(f64, f64)> = session
        .log()
        .flagged()
        .map(|p| (p.index as f64, p.value))
        .collect();
    let truth: Vec<(f64, f64)> = if session.ground_truth().available {
        session.ground_truth().mask[..shown]
            .iter()
            .zip(values)
            .enumerate()
            .filter(|(_, (gt, _))| **gt)
            .map(|(i, (_, &v))| (i as f64, v))
            .collect()
    } else {
        Vec::new()
    };

    let mut datasets = vec![Dataset::default()
        .name("value")
        .marker(Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::new().fg(Color::Cyan))
        .data(&line)];
    if !truth.is_empty() {
        datasets.push(
            Dataset::default()
                .name("ground truth")
                .marker(Marker::Dot)
                .graph_type(GraphType::Scatter)
                .style(Style::new().fg(Color::Yellow))
                .data(&truth),
        );
    }
    datasets.push(
        Dataset::default()
            .name("anomaly")
            .marker(Marker::Block)
            .graph_type(GraphType::Scatter)
            .style(Style::new().fg(Color::Red))
            .data(&flagged),
    );

    let (y_min, y_max) = value_bounds(series.values());
    let x_max = (series.len().max(2) - 1) as f64;
    let fmt_ts = |ts: Option<chrono::NaiveDateTime>| {
        ts.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default()
    };

    let chart = Chart::new(datasets)
        .block(panel(" Series "))
        .x_axis(
            Axis::default()
                .style(Style::new().fg(Color::Gray))
                .bounds([0.0, x_max])
                .labels(vec![
                    Span::raw(fmt_ts(series.first_timestamp())),
                    Span::raw(fmt_ts(series.last_timestamp())),
                ]),
        )
        .y_axis(
            Axis::default()
                .style(Style::new().fg(Color::Gray))
                .bounds([y_min, y_max])
                .labels(vec![
                    Span::raw(format!("{:.1}", y_min)),
                    Span::raw(format!("{:.1}", (y_min + y_max) / 2.0)),
                    Span::raw(format!("{:.1}", y_max)),
                ]),
        );
    f.render_widget(chart, area);
}

/// Min/max over the whole series with 5% headroom; flat series get a unit band.
fn value_bounds(values: &[f64]) -> (f64, f64) {
    let (lo, hi) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    let pad = ((hi - lo) * 0.05).max(0.5);
    (lo - pad, hi + pad)
}

fn draw_counters(f: &mut Frame, area: Rect, session: &ReplaySession, snapshot: &Snapshot) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(6), Constraint::Length(3)])
        .split(area);

    let label = Style::new().fg(Color::Gray);
    let stat = |name: &str, value: String, color: Color| {
        Line::from(vec![
            Span::styled(format!("{:<18}", name), label),
            Span::styled(value, Style::new().fg(color).add_modifier(Modifier::BOLD)),
        ])
    };

    let mut lines = vec![
        stat("Phase", snapshot.phase.to_string(), ACCENT),
        stat("Points streamed", snapshot.points_streamed.to_string(), Color::White),
        stat(
            "Anomalies flagged",
            snapshot.anomalies_flagged.to_string(),
            Color::Red,
        ),
        stat("Series length", snapshot.series_length.to_string(), Color::White),
        stat("Warm-up", snapshot.warmup.to_string(), Color::White),
        Line::from(""),
    ];

    match snapshot.metrics {
        Some(m) => {
            lines.push(stat("Precision", format!("{:.3}", m.precision), Color::LightGreen));
            lines.push(stat("Recall", format!("{:.3}", m.recall), Color::LightGreen));
            lines.push(stat("F1", format!("{:.3}", m.f1), Color::LightGreen));
        }
        None => lines.push(Line::from(Span::styled(
            "Ground truth unavailable",
            Style::new().fg(Color::DarkGray),
        ))),
    }

    if !session.warnings().is_empty() {
        lines.push(Line::from(""));
        for warning in session.warnings() {
            lines.push(Line::from(Span::styled(
                format!("! {}", warning),
                Style::new().fg(Color::Yellow),
            )));
        }
    }

    f.render_widget(
        Paragraph::new(lines)
            .wrap(Wrap { trim: true })
            .block(panel(" Live ")),
        layout[0],
    );

    let progress = snapshot.progress().clamp(0.0, 1.0);
    let gauge = Gauge::default()
        .block(panel(" Progress "))
        .gauge_style(Style::new().fg(ACCENT))
        .ratio(progress)
        .label(format!("{:.0}%", progress * 100.0));
    f.render_widget(gauge, layout[1]);
}

fn flag_cell(flag: Option<bool>) -> Cell<'static> {
    match flag {
        Some(true) => Cell::from(Span::styled("1", Style::new().fg(Color::Red))),
        Some(false) => Cell::from("0"),
        None => Cell::from(Span::styled("-", Style::new().fg(Color::DarkGray))),
    }
}

fn draw_recent(f: &mut Frame, area: Rect, snapshot: &Snapshot) {
    // newest first, as many as fit under the header row
    let visible = area.height.saturating_sub(3) as usize;
    let rows: Vec<Row> = snapshot
        .recent
        .iter()
        .rev()
        .take(visible)
        .map(|r| {
            let style = if r.predicted {
                Style::new().fg(Color::Red)
            } else {
                Style::new()
            };
            Row::new(vec![
                Cell::from(r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
                Cell::from(format!("{:.3}", r.value)),
                Cell::from(
                    r.score
                        .map(|s| format!("{:+.4}", s))
                        .unwrap_or_else(|| "warm-up".into()),
                ),
                flag_cell(Some(r.predicted)),
                flag_cell(r.actual),
            ])
            .style(style)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(20),
            Constraint::Length(12),
            Constraint::Length(10),
            Constraint::Length(5),
            Constraint::Length(5),
        ],
    )
    .header(
        Row::new(vec!["Timestamp", "Value", "Score", "Pred", "GT"])
            .style(Style::new().fg(ACCENT).add_modifier(Modifier::BOLD)),
    )
    .block(panel(" Recent points "));
    f.render_widget(table, area);
}

fn draw_footer(f: &mut Frame, area: Rect, snapshot: &Snapshot) {
    let status = match snapshot.phase {
        Phase::Done => Span::styled("Streaming complete.", Style::new().fg(Color::LightGreen)),
        Phase::Error => Span::styled("Session halted.", Style::new().fg(Color::Red)),
        phase => Span::styled(format!("{}...", phase), Style::new().fg(Color::LightYellow)),
    };
    let footer = Paragraph::new(Line::from(vec![
        status,
        Span::raw(" | "),
        Span::styled("Q/Esc: Quit", Style::new().fg(Color::LightYellow)),
    ]))
    .alignment(Alignment::Center);
    f.render_widget(footer, area);
}
