use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::Line,
    widgets::{Block, Borders, Clear, Gauge, ListItem, Paragraph},
};

use tremolo_core::track::format_duration;

use crate::viz;

use super::app::App;
use super::widgets::{centered_rect, list_panel, modal_block, truncate_label};

pub(crate) fn draw(f: &mut ratatui::Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Min(5),
            Constraint::Length(5),
        ])
        .split(f.area());

    draw_header(f, app, chunks[0]);

    if app.playlist_open {
        let middle = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);
        draw_visualizer(f, app, middle[0]);
        draw_playlist(f, app, middle[1]);
    } else {
        draw_visualizer(f, app, chunks[1]);
    }

    draw_footer(f, app, chunks[2]);

    if app.help_open {
        draw_help(f, app);
    }
}

fn draw_header(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let snap = &app.snapshot;
    let track = snap.track_index.and_then(|i| app.tracks.get(i));
    let title = track
        .map(|t| t.display_title())
        .or_else(|| snap.track_title.clone())
        .unwrap_or_else(|| "-".to_string());
    let artist = snap.track_artist.as_deref().unwrap_or("-");
    let album = track.and_then(|t| t.album.as_deref()).unwrap_or("-");
    let codec = track.and_then(|t| t.codec.as_deref()).unwrap_or("-");
    let rate = if snap.sample_rate == 0 {
        "-".to_string()
    } else if snap.resampling {
        format!("{} Hz -> {} Hz", snap.sample_rate, snap.device_rate)
    } else {
        format!("{} Hz", snap.sample_rate)
    };
    let mut details = format!("{artist} | {album} | {codec} | {rate}");
    if let Some(device) = snap.device_name.as_deref() {
        details.push_str(&format!(" | {device}"));
    }
    let header = Paragraph::new(vec![
        Line::from(format!("track: {title}")),
        Line::from(details),
    ])
    .block(Block::default().borders(Borders::ALL).title("Now Playing"));
    f.render_widget(header, area);
}

fn draw_visualizer(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!("Visualizer: {}", app.visualizer.name()));
    let inner = block.inner(area);
    f.render_widget(block, area);
    f.render_widget(
        Paragraph::new(viz::render(app.visualizer, &app.frame, inner, app.sensitivity)),
        inner,
    );
}

fn draw_playlist(f: &mut ratatui::Frame, app: &mut App, area: Rect) {
    let inner = modal_block("Playlist").inner(area);
    app.list_view_height = inner.height as usize;
    let label_width = (inner.width as usize).saturating_sub(3);

    let mut items = Vec::new();
    for (idx, track) in app.tracks.iter().enumerate() {
        let dur = track
            .duration_ms
            .map(format_duration)
            .unwrap_or_else(|| "-:--".to_string());
        let mut label = format!("{:>2}. {}  [{}]", idx + 1, track.display_title(), dur);
        if app.snapshot.track_index == Some(idx) {
            label.push_str("  [playing]");
        }
        items.push(ListItem::new(truncate_label(&label, label_width)));
    }
    if items.is_empty() {
        items.push(ListItem::new("<empty>"));
    }
    f.render_stateful_widget(list_panel("Playlist", items), area, &mut app.list_state);
}

fn draw_footer(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let footer_block = Block::default().borders(Borders::ALL).title("Status");
    let footer_inner = footer_block.inner(area);
    f.render_widget(footer_block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(footer_inner);

    f.render_widget(Paragraph::new(Line::from(status_line(app))), rows[0]);

    let snap = &app.snapshot;
    match snap.duration_ms.filter(|&d| d > 0) {
        Some(total) => {
            let gauge_chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Min(10), Constraint::Length(18)])
                .split(rows[1]);
            let ratio = (snap.position_ms as f64 / total as f64).clamp(0.0, 1.0);
            let gauge = Gauge::default()
                .ratio(ratio)
                .style(Style::default().fg(Color::Black).bg(Color::White))
                .gauge_style(Style::default().fg(Color::White).bg(Color::Black));
            f.render_widget(gauge, gauge_chunks[0]);
            f.render_widget(
                Paragraph::new(Line::from(format!(
                    "{} / {}",
                    format_duration(snap.position_ms),
                    format_duration(total)
                )))
                .alignment(Alignment::Right),
                gauge_chunks[1],
            );
        }
        None => {
            f.render_widget(
                Paragraph::new(Line::from(format!(
                    "progress: {} / -:--",
                    format_duration(snap.position_ms)
                ))),
                rows[1],
            );
        }
    }

    f.render_widget(Paragraph::new(Line::from(keys_line(app))), rows[2]);
}

fn status_line(app: &App) -> String {
    let snap = &app.snapshot;
    let mut line = format!(
        "{} | vol {}%{} | repeat {} | shuffle {}",
        snap.state,
        snap.volume,
        if snap.muted { " [muted]" } else { "" },
        snap.repeat,
        if snap.shuffle { "on" } else { "off" },
    );
    if snap.underrun_events > 0 {
        line.push_str(&format!(" | underruns {}", snap.underrun_events));
    }
    if let Some(err) = snap.last_error.as_deref() {
        line.push_str(&format!(" | {err}"));
    } else if !app.status.is_empty() {
        line.push_str(&format!(" | {}", app.status));
    }
    line
}

fn keys_line(app: &App) -> String {
    let b = &app.bindings;
    format!(
        "keys: {} pause | {}/{} track | {}/{} seek | {}/{} vol | j/k+enter select | {} viz | {} help | {} quit",
        b.play_pause,
        b.prev,
        b.next,
        b.seek_back,
        b.seek_forward,
        b.volume_down,
        b.volume_up,
        b.visualizer,
        b.help,
        b.quit,
    )
}

fn draw_help(f: &mut ratatui::Frame, app: &App) {
    let area = centered_rect(60, 70, f.area());
    f.render_widget(Clear, area);
    let b = &app.bindings;
    let help = [
        "Playback".to_string(),
        format!("  {:<10} play/pause", b.play_pause),
        format!("  {:<10} next track", b.next),
        format!("  {:<10} previous track", b.prev),
        format!("  {:<10} seek +10s", b.seek_forward),
        format!("  {:<10} seek -10s", b.seek_back),
        String::new(),
        "Mixer".to_string(),
        format!("  {:<10} volume up", b.volume_up),
        format!("  {:<10} volume down", b.volume_down),
        format!("  {:<10} mute", b.mute),
        String::new(),
        "Modes".to_string(),
        format!("  {:<10} shuffle", b.shuffle),
        format!("  {:<10} repeat mode", b.repeat),
        format!("  {:<10} next visualizer", b.visualizer),
        String::new(),
        "Playlist".to_string(),
        format!("  {:<10} toggle playlist pane", b.playlist),
        "  j/k        move selection".to_string(),
        "  PgUp/PgDn  page".to_string(),
        "  enter      play selection".to_string(),
        String::new(),
        format!("  {:<10} help", b.help),
        format!("  {:<10} quit", b.quit),
        "  esc        close".to_string(),
    ]
    .join("\n");
    f.render_widget(Paragraph::new(help).block(modal_block("Help")), area);
}
