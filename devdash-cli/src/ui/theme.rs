//! Colour palette and style helpers for the dashboard
//!
//! Widgets ask for styles by meaning (severity, container status, selection)
//! rather than by colour, so the palette can change in one place.

use ratatui::style::{Color, Modifier, Style};

use devdash_core::format::Severity;
use devdash_core::model::ContainerStatus;
use devdash_core::notify::Level;

/// Color palette tokens for the theme
#[derive(Clone, Debug)]
pub struct Palette {
    /// Panel border color
    pub panel_border: Color,
    /// Primary text color
    pub text: Color,
    /// Dimmed text (secondary info)
    pub text_dim: Color,
    /// Muted text (placeholders, stale data)
    pub text_muted: Color,
    /// Accent color (highlights, focus)
    pub accent: Color,
    /// Healthy values, running containers
    pub success: Color,
    /// Values between the two thresholds
    pub warn: Color,
    /// Values at or past the high threshold
    pub error: Color,
    /// Informational notices
    pub info: Color,
    /// Cursor row background
    pub selection_bg: Color,
    /// Cursor row foreground
    pub selection_fg: Color,
    /// Marked (multi-selected) rows
    pub marked: Color,
    /// Key hint text
    pub key_hint: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self::dark()
    }
}

impl Palette {
    pub fn dark() -> Self {
        Self {
            panel_border: Color::Rgb(60, 60, 60),
            text: Color::Rgb(212, 212, 212),
            text_dim: Color::Rgb(150, 150, 150),
            text_muted: Color::Rgb(100, 100, 100),
            accent: Color::Rgb(79, 193, 255),
            success: Color::Rgb(78, 201, 176),
            warn: Color::Rgb(220, 180, 100),
            error: Color::Rgb(244, 135, 113),
            info: Color::Rgb(156, 220, 254),
            selection_bg: Color::Rgb(38, 79, 120),
            selection_fg: Color::White,
            marked: Color::Rgb(197, 134, 192),
            key_hint: Color::Rgb(206, 145, 120),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Theme {
    pub palette: Palette,
}

impl Theme {
    pub fn severity_style(&self, severity: Severity) -> Style {
        let color = match severity {
            Severity::Ok => self.palette.success,
            Severity::Warn => self.palette.warn,
            Severity::Critical => self.palette.error,
        };
        Style::default().fg(color)
    }

    pub fn container_status_style(&self, status: &ContainerStatus) -> Style {
        let color = match status {
            ContainerStatus::Running => self.palette.success,
            ContainerStatus::Paused | ContainerStatus::Restarting => self.palette.warn,
            ContainerStatus::Exited => self.palette.error,
            ContainerStatus::Other(_) => self.palette.text_muted,
        };
        Style::default().fg(color)
    }

    pub fn container_status_icon(&self, status: &ContainerStatus) -> &'static str {
        match status {
            ContainerStatus::Running => "●",
            ContainerStatus::Paused => "◐",
            ContainerStatus::Restarting => "⟲",
            ContainerStatus::Exited => "✗",
            ContainerStatus::Other(_) => "?",
        }
    }

    pub fn level_style(&self, level: Level) -> Style {
        let color = match level {
            Level::Info => self.palette.info,
            Level::Success => self.palette.success,
            Level::Warning => self.palette.warn,
            Level::Error => self.palette.error,
        };
        Style::default().fg(color)
    }

    /// Style for tab/view labels
    pub fn tab_style(&self, active: bool) -> Style {
        if active {
            Style::default()
                .fg(self.palette.accent)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(self.palette.text_dim)
        }
    }

    pub fn key_hint_style(&self) -> Style {
        Style::default().fg(self.palette.key_hint)
    }

    pub fn subtle_border_style(&self) -> Style {
        Style::default().fg(self.palette.panel_border)
    }

    pub fn focused_border_style(&self) -> Style {
        Style::default().fg(self.palette.accent)
    }

    /// Row under the cursor
    pub fn selection_style(&self) -> Style {
        Style::default()
            .bg(self.palette.selection_bg)
            .fg(self.palette.selection_fg)
            .add_modifier(Modifier::BOLD)
    }

    pub fn marked_style(&self) -> Style {
        Style::default().fg(self.palette.marked)
    }

    pub fn text_style(&self) -> Style {
        Style::default().fg(self.palette.text)
    }

    pub fn text_dim_style(&self) -> Style {
        Style::default().fg(self.palette.text_dim)
    }

    pub fn text_muted_style(&self) -> Style {
        Style::default().fg(self.palette.text_muted)
    }

    pub fn accent_bold_style(&self) -> Style {
        Style::default()
            .fg(self.palette.accent)
            .add_modifier(Modifier::BOLD)
    }

    pub fn success_style(&self) -> Style {
        Style::default().fg(self.palette.success)
    }

    pub fn warn_style(&self) -> Style {
        Style::default().fg(self.palette.warn)
    }

    pub fn error_style(&self) -> Style {
        Style::default().fg(self.palette.error)
    }

    /// Column headers
    pub fn header_style(&self) -> Style {
        Style::default()
            .fg(self.palette.text)
            .add_modifier(Modifier::BOLD)
    }

    /// Compose stack group rows
    pub fn section_header_style(&self) -> Style {
        Style::default()
            .fg(self.palette.accent)
            .add_modifier(Modifier::BOLD)
    }
}

static DEFAULT_THEME: std::sync::OnceLock<Theme> = std::sync::OnceLock::new();

pub fn theme() -> &'static Theme {
    DEFAULT_THEME.get_or_init(Theme::default)
}

/// Shorthands over the global theme
pub mod styles {
    use super::*;

    pub fn severity(severity: Severity) -> Style {
        theme().severity_style(severity)
    }

    pub fn container_status(status: &ContainerStatus) -> Style {
        theme().container_status_style(status)
    }

    pub fn container_status_icon(status: &ContainerStatus) -> &'static str {
        theme().container_status_icon(status)
    }

    pub fn level(level: Level) -> Style {
        theme().level_style(level)
    }

    pub fn tab(active: bool) -> Style {
        theme().tab_style(active)
    }

    pub fn key_hint() -> Style {
        theme().key_hint_style()
    }

    pub fn border_subtle() -> Style {
        theme().subtle_border_style()
    }

    pub fn border_focused() -> Style {
        theme().focused_border_style()
    }

    pub fn selection() -> Style {
        theme().selection_style()
    }

    pub fn marked() -> Style {
        theme().marked_style()
    }

    pub fn text() -> Style {
        theme().text_style()
    }

    pub fn text_dim() -> Style {
        theme().text_dim_style()
    }

    pub fn text_muted() -> Style {
        theme().text_muted_style()
    }

    pub fn accent_bold() -> Style {
        theme().accent_bold_style()
    }

    pub fn success() -> Style {
        theme().success_style()
    }

    pub fn warn() -> Style {
        theme().warn_style()
    }

    pub fn error() -> Style {
        theme().error_style()
    }

    pub fn header() -> Style {
        theme().header_style()
    }

    pub fn section_header() -> Style {
        theme().section_header_style()
    }
}
