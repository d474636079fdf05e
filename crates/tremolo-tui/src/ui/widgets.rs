use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::widgets::{Block, Borders, List, ListItem};

pub(crate) fn modal_block(title: &str) -> Block<'_> {
    Block::default().title(title).borders(Borders::ALL)
}

pub(crate) fn list_panel<'a>(title: &'a str, items: Vec<ListItem<'a>>) -> List<'a> {
    List::new(items)
        .block(modal_block(title))
        .highlight_style(Style::default().add_modifier(Modifier::BOLD))
        .highlight_symbol("▶ ")
}

/// Truncates to `max` chars, never splitting a multi-byte character.
pub(crate) fn truncate_label(label: &str, max: usize) -> String {
    let count = label.chars().count();
    if max == 0 || count <= max {
        return label.to_string();
    }
    if max <= 3 {
        return label.chars().take(max).collect();
    }
    let cut: String = label.chars().take(max - 3).collect();
    format!("{cut}...")
}

pub(crate) fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1]);
    horizontal[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_labels() {
        assert_eq!(truncate_label("short", 10), "short");
        assert_eq!(truncate_label("exact", 5), "exact");
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate_label("Björk - Jóga", 7), "Björ...");
        assert_eq!(truncate_label("héllo", 3), "hél");
    }

    #[test]
    fn centered_rect_stays_inside() {
        let r = centered_rect(60, 70, Rect::new(0, 0, 100, 50));
        assert!(r.x + r.width <= 100);
        assert!(r.y + r.height <= 50);
        assert!(r.width >= 50 && r.height >= 30);
    }
}
