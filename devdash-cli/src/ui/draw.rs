use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState},
};

use devdash_core::correlate::{compose_groups, processes_by_project};
use devdash_core::format::{format_bytes, format_percent, format_rate};
use devdash_core::host::SystemColumn;
use devdash_core::model::{ContainerStatus, Snapshot};
use devdash_core::process::shorten_home;
use devdash_core::source::RuntimeAvailability;
use devdash_core::view::{ContainerColumn, DisplayContext, ProcessColumn, TableRow};

use super::app::{App, Mode, Tab};
use super::theme::styles;

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // tabs
            Constraint::Length(1), // status bar
            Constraint::Min(5),    // table
            Constraint::Length(1), // detail
            Constraint::Length(1), // prompt / notification
            Constraint::Length(1), // key hints
        ])
        .split(f.area());

    let snapshot = app.snapshot();

    draw_tabs(f, app, snapshot.as_deref(), chunks[0]);
    draw_status(f, app, snapshot.as_deref(), chunks[1]);

    match (app.tab, snapshot.as_deref()) {
        (Tab::System, _) => draw_system(f, app, chunks[2]),
        (Tab::Processes, Some(snapshot)) => {
            let ctx = app.display_context(snapshot);
            draw_processes(f, app, snapshot, &ctx, chunks[2]);
        }
        (Tab::Containers, Some(snapshot)) => {
            let ctx = app.display_context(snapshot);
            draw_containers(f, app, snapshot, &ctx, chunks[2]);
        }
        (_, None) => {
            let waiting = Paragraph::new(Line::from(Span::styled(
                "Collecting first snapshot...",
                styles::text_muted(),
            )))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(styles::border_subtle()),
            );
            f.render_widget(waiting, chunks[2]);
        }
    }
    draw_detail(f, app, snapshot.as_deref(), chunks[3]);

    draw_prompt(f, app, chunks[4]);
    draw_hints(f, app, chunks[5]);

    let area = f.area();
    match app.mode {
        Mode::Help => draw_help(f, area),
        Mode::Details => draw_details_view(f, app, area),
        Mode::Logs => draw_logs_view(f, app, area),
        _ => {}
    }
}

fn draw_tabs(f: &mut Frame, app: &App, snapshot: Option<&Snapshot>, area: Rect) {
    let (procs, projects, containers) = snapshot
        .map(|s| {
            let projects = processes_by_project(s).keys().filter(|k| k.is_some()).count();
            (s.processes.len(), projects, s.containers.len())
        })
        .unwrap_or((0, 0, 0));

    let mut spans = vec![
        Span::styled(" devdash ", styles::accent_bold()),
        Span::raw(" "),
        Span::styled(
            format!(" 1 Processes ({} in {} projects) ", procs, projects),
            styles::tab(app.tab == Tab::Processes),
        ),
        Span::raw(" "),
        Span::styled(
            format!(" 2 Containers ({}) ", containers),
            styles::tab(app.tab == Tab::Containers),
        ),
        Span::raw(" "),
        Span::styled(
            format!(" 3 System ({}) ", app.system_processes.len()),
            styles::tab(app.tab == Tab::System),
        ),
    ];
    if app.demo {
        spans.push(Span::styled("  [demo]", styles::warn()));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_status(f: &mut Frame, app: &App, snapshot: Option<&Snapshot>, area: Rect) {
    let sep = || Span::styled("  │  ", styles::text_muted());
    let mut spans = Vec::new();

    match app.host {
        Some(host) => {
            let cpu = host.cpu_percent as f64;
            spans.push(Span::styled("CPU ", styles::text_dim()));
            spans.push(Span::styled(
                format_percent(host.cpu_percent),
                styles::severity(app.thresholds.severity(cpu)),
            ));
            spans.push(sep());
            spans.push(Span::styled("Mem ", styles::text_dim()));
            spans.push(Span::styled(
                format!(
                    "{}/{}",
                    format_bytes(host.memory_used),
                    format_bytes(host.memory_total)
                ),
                styles::severity(app.thresholds.severity(host.memory_percent())),
            ));
            spans.push(sep());
            spans.push(Span::styled("Disk ", styles::text_dim()));
            spans.push(Span::styled(
                format!("{:.0}%", host.disk_percent),
                styles::severity(app.thresholds.severity(host.disk_percent)),
            ));
        }
        None => spans.push(Span::styled("host stats pending", styles::text_muted())),
    }

    spans.push(sep());
    match app.pipeline.runtime() {
        Some(RuntimeAvailability::Available) => {
            spans.push(Span::styled("● docker", styles::success()));
        }
        Some(RuntimeAvailability::Unavailable { .. }) => {
            spans.push(Span::styled("✗ docker unavailable", styles::error()));
        }
        None => spans.push(Span::styled("? docker", styles::text_muted())),
    }

    let degraded = app.pipeline.degraded_cycles();
    if degraded > 0 {
        spans.push(sep());
        let style = if app.pipeline.consecutive_failures() > 0 {
            styles::error()
        } else {
            styles::warn()
        };
        spans.push(Span::styled(format!("degraded cycles {}", degraded), style));
    }

    if let Some(snapshot) = snapshot {
        spans.push(sep());
        spans.push(Span::styled(
            format!("updated {}", snapshot.taken_at.with_timezone(&chrono::Local).format("%H:%M:%S")),
            styles::text_dim(),
        ));
    }

    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn header_cell(title: &str, active: bool, descending: bool) -> Cell<'static> {
    if active {
        let arrow = if descending { "▼" } else { "▲" };
        Cell::from(format!("{} {}", title, arrow)).style(styles::accent_bold())
    } else {
        Cell::from(title.to_string()).style(styles::header())
    }
}

fn table_block(title: String) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_focused())
        .title(Span::styled(title, styles::text()))
}

fn mark(selected: bool) -> &'static str {
    if selected { "* " } else { "  " }
}

fn draw_processes(f: &mut Frame, app: &App, snapshot: &Snapshot, ctx: &DisplayContext, area: Rect) {
    let view = &app.processes;
    let header = Row::new(
        std::iter::once(Cell::from(""))
            .chain(ProcessColumn::ALL.iter().map(|c| {
                header_cell(c.title(), view.sort_key == Some(*c), view.sort_descending)
            })),
    );

    let rows: Vec<Row> = app
        .process_rows
        .rows
        .iter()
        .filter_map(|pid| snapshot.process(*pid))
        .map(|p| {
            let selected = view.is_selected(&p.pid);
            let base = if selected { styles::marked() } else { styles::text() };
            let cells = p.cells(ctx);
            let mut out = vec![Cell::from(mark(selected))];
            for (column, text) in ProcessColumn::ALL.iter().zip(cells) {
                let style = match column {
                    ProcessColumn::Memory => styles::severity(app.thresholds.memory_severity(p.memory_mb())),
                    ProcessColumn::Cpu => styles::severity(app.thresholds.severity(p.cpu_percent as f64)),
                    ProcessColumn::Project if p.project_name.is_none() => styles::text_muted(),
                    ProcessColumn::Cwd | ProcessColumn::Command => styles::text_dim(),
                    _ => base,
                };
                out.push(Cell::from(text).style(style));
            }
            Row::new(out).style(base)
        })
        .collect();

    let widths = [
        Constraint::Length(2),
        Constraint::Length(8),
        Constraint::Length(18),
        Constraint::Length(14),
        Constraint::Length(9),
        Constraint::Length(7),
        Constraint::Length(8),
        Constraint::Length(24),
        Constraint::Min(20),
    ];

    let shown = app.process_rows.rows.len();
    let title = if shown < app.process_rows.total {
        format!(" Dev processes ({} of {}) ", shown, app.process_rows.total)
    } else {
        format!(" Dev processes ({}) ", shown)
    };

    let table = Table::new(rows, widths)
        .header(header)
        .block(table_block(title))
        .row_highlight_style(styles::selection());

    let mut state = TableState::default().with_selected(app.process_rows.cursor);
    f.render_stateful_widget(table, area, &mut state);
}

fn draw_containers(f: &mut Frame, app: &App, snapshot: &Snapshot, ctx: &DisplayContext, area: Rect) {
    let view = &app.containers;
    let header = Row::new(
        std::iter::once(Cell::from(""))
            .chain(ContainerColumn::ALL.iter().map(|c| {
                header_cell(c.title(), view.sort_key == Some(*c), view.sort_descending)
            })),
    );

    // Stack headers only make sense in the default (project-grouped) order
    let grouped = view.sort_key.is_none();
    let stacks: Vec<(Option<&str>, usize, usize)> = compose_groups(snapshot)
        .iter()
        .map(|g| {
            let running = g
                .containers
                .iter()
                .filter(|c| c.status == ContainerStatus::Running)
                .count();
            (g.project, g.containers.len(), running)
        })
        .collect();

    let mut rows: Vec<Row> = Vec::new();
    let mut cursor_row = None;
    let mut last_project: Option<Option<&str>> = None;

    for (idx, id) in app.container_rows.rows.iter().enumerate() {
        let Some(c) = snapshot.container(id) else {
            continue;
        };
        if grouped && last_project != Some(c.compose_project()) {
            let (total, running) = stacks
                .iter()
                .find(|(project, _, _)| *project == c.compose_project())
                .map(|(_, total, running)| (*total, *running))
                .unwrap_or((0, 0));
            rows.push(
                Row::new(vec![
                    Cell::from(""),
                    Cell::from("▸"),
                    Cell::from(c.compose_project().unwrap_or("standalone").to_string()),
                    Cell::from(format!("{}/{} running", running, total)),
                ])
                .style(styles::section_header()),
            );
            last_project = Some(c.compose_project());
        }
        if app.container_rows.cursor == Some(idx) {
            cursor_row = Some(rows.len());
        }

        let selected = view.is_selected(id);
        let base = if selected { styles::marked() } else { styles::text() };
        let mut out = vec![Cell::from(mark(selected))];
        for (column, text) in ContainerColumn::ALL.iter().zip(c.cells(ctx)) {
            let cell = match column {
                ContainerColumn::Status => Cell::from(format!(
                    "{} {}",
                    styles::container_status_icon(&c.status),
                    text
                ))
                .style(styles::container_status(&c.status)),
                ContainerColumn::Id | ContainerColumn::Image => Cell::from(text).style(styles::text_dim()),
                _ => Cell::from(text).style(base),
            };
            out.push(cell);
        }
        rows.push(Row::new(out).style(base));
    }

    let widths = [
        Constraint::Length(2),
        Constraint::Length(13),
        Constraint::Length(24),
        Constraint::Length(24),
        Constraint::Length(12),
        Constraint::Min(18),
        Constraint::Length(8),
        Constraint::Length(14),
        Constraint::Length(12),
    ];

    let title = match app.pipeline.runtime() {
        Some(RuntimeAvailability::Unavailable { reason }) => format!(" Containers (unavailable: {}) ", reason),
        _ => format!(" Containers ({}) ", app.container_rows.rows.len()),
    };

    let table = Table::new(rows, widths)
        .header(header)
        .block(table_block(title))
        .row_highlight_style(styles::selection());

    let mut state = TableState::default().with_selected(cursor_row);
    f.render_stateful_widget(table, area, &mut state);
}

fn draw_detail(f: &mut Frame, app: &App, snapshot: Option<&Snapshot>, area: Rect) {
    let line = match (app.tab, snapshot) {
        (Tab::System, _) => app.cursor_system_process().map(|p| {
            Line::from(vec![
                Span::styled(format!(" PID {} ", p.pid), styles::accent_bold()),
                Span::styled(p.command.clone(), styles::text()),
                Span::styled(
                    format!("  {}", p.user.as_deref().unwrap_or("-")),
                    styles::text_dim(),
                ),
            ])
        }),
        (_, None) => None,
        (Tab::Processes, Some(snapshot)) => app.cursor_process_record(snapshot).map(|p| {
            let cwd = p
                .working_directory
                .as_deref()
                .map(|d| shorten_home(d, app.home.as_deref()))
                .unwrap_or_else(|| "-".into());
            Line::from(vec![
                Span::styled(format!(" PID {} ", p.pid), styles::accent_bold()),
                Span::styled(p.command, styles::text()),
                Span::styled(format!("  in {}", cwd), styles::text_dim()),
            ])
        }),
        (Tab::Containers, Some(snapshot)) => app.cursor_container_record(snapshot).map(|c| {
            Line::from(vec![
                Span::styled(format!(" {} ", c.short_id()), styles::accent_bold()),
                Span::styled(c.name, styles::text()),
                Span::styled(format!("  {}", c.image), styles::text_dim()),
            ])
        }),
    };
    if let Some(line) = line {
        f.render_widget(Paragraph::new(line), area);
    }
}

fn draw_prompt(f: &mut Frame, app: &App, area: Rect) {
    let filter = match app.tab {
        Tab::Processes => &app.processes.filter_text,
        Tab::Containers => &app.containers.filter_text,
        Tab::System => &app.system.filter_text,
    };

    let line = match &app.mode {
        Mode::Filter => Line::from(vec![
            Span::styled(" / ", styles::key_hint()),
            Span::styled(format!("{}█", filter), styles::text()),
        ]),
        Mode::ConfirmKill(pids) => Line::from(Span::styled(
            format!(
                " Kill {}? (y/N)",
                pids.iter().map(|p| format!("PID {}", p)).collect::<Vec<_>>().join(", ")
            ),
            styles::error(),
        )),
        Mode::ConfirmStop(ids) => Line::from(Span::styled(
            format!(
                " Stop {} container{}? (y/N)",
                ids.len(),
                if ids.len() == 1 { "" } else { "s" }
            ),
            styles::error(),
        )),
        _ => match app.notifications.latest() {
            Some(n) => Line::from(vec![
                Span::styled(
                    format!(" {} ", n.at.with_timezone(&chrono::Local).format("%H:%M:%S")),
                    styles::text_muted(),
                ),
                Span::styled(n.message.clone(), styles::level(n.level)),
            ]),
            None if !filter.is_empty() => Line::from(vec![
                Span::styled(" filter: ", styles::text_dim()),
                Span::styled(filter.clone(), styles::text()),
            ]),
            None => Line::default(),
        },
    };
    f.render_widget(Paragraph::new(line), area);
}

fn draw_hints(f: &mut Frame, app: &App, area: Rect) {
    let (action, open) = match app.tab {
        Tab::Processes | Tab::System => ("kill", ("i", "details")),
        Tab::Containers => ("stop", ("l", "logs")),
    };
    let hints = [
        ("tab", "switch"),
        ("j/k", "move"),
        ("space", "mark"),
        ("/", "filter"),
        ("</>", "sort col"),
        ("s", "reverse"),
        ("x", action),
        open,
        ("e", "export"),
        ("r", "refresh"),
        ("?", "help"),
        ("q", "quit"),
    ];
    let mut spans = Vec::new();
    for (key, label) in hints {
        spans.push(Span::styled(format!(" {} ", key), styles::key_hint()));
        spans.push(Span::styled(format!("{} ", label), styles::text_dim()));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let w = width.min(area.width);
    let h = height.min(area.height);
    Rect {
        x: area.x + (area.width - w) / 2,
        y: area.y + (area.height - h) / 2,
        width: w,
        height: h,
    }
}

fn draw_help(f: &mut Frame, area: Rect) {
    let rect = centered(area, 56, 23);
    f.render_widget(Clear, rect);

    let entry = |key: &str, text: &str| {
        Line::from(vec![
            Span::styled(format!("  {:<10}", key), styles::key_hint()),
            Span::styled(text.to_string(), styles::text()),
        ])
    };
    let lines = vec![
        Line::from(Span::styled(" Navigation", styles::section_header())),
        entry("tab 1 2 3", "Switch between processes, containers, system"),
        entry("j k ↑ ↓", "Move the cursor"),
        entry("g G", "Jump to top / bottom"),
        Line::default(),
        Line::from(Span::styled(" View", styles::section_header())),
        entry("/", "Filter rows (Enter keeps, Esc clears)"),
        entry("< >", "Sort by previous / next column"),
        entry("s", "Reverse the sort direction"),
        entry("d", "Back to the default order"),
        entry("space", "Mark the row for a batch action"),
        entry("esc", "Clear marks and filter"),
        Line::default(),
        Line::from(Span::styled(" Actions", styles::section_header())),
        entry("x", "Kill process / stop container (asks first)"),
        entry("i enter", "Process details"),
        entry("l enter", "Follow container logs (esc closes)"),
        entry("e", "Export the snapshot as JSON"),
        entry("r", "Refresh now"),
        entry("q", "Quit"),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_focused())
        .title(Span::styled(" Help ", styles::accent_bold()));
    f.render_widget(Paragraph::new(lines).block(block), rect);
}

fn draw_system(f: &mut Frame, app: &App, area: Rect) {
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(7), Constraint::Min(3)])
        .split(area);
    draw_host_panel(f, app, parts[0]);
    draw_system_table(f, app, parts[1]);
}

fn bar(percent: f64, width: usize) -> String {
    let filled = ((percent.clamp(0.0, 100.0) / 100.0) * width as f64).round() as usize;
    format!("[{}{}]", "█".repeat(filled), "░".repeat(width - filled))
}

fn draw_host_panel(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_subtle())
        .title(Span::styled(" Host ", styles::text()));

    let Some(host) = app.host else {
        let waiting = Paragraph::new(Span::styled("Sampling...", styles::text_muted())).block(block);
        f.render_widget(waiting, area);
        return;
    };

    let gauge = |label: &str, percent: f64, detail: String| {
        Line::from(vec![
            Span::styled(format!(" {:<5} ", label), styles::text_dim()),
            Span::styled(bar(percent, 20), styles::severity(app.thresholds.severity(percent))),
            Span::styled(format!(" {:>5.1}%  ", percent), styles::text()),
            Span::styled(detail, styles::text_dim()),
        ])
    };

    let net = match host.net {
        Some(rates) => Line::from(vec![
            Span::styled(" Net   ", styles::text_dim()),
            Span::styled(
                format!(
                    "up {}  down {}",
                    format_rate(rates.transmitted_per_sec),
                    format_rate(rates.received_per_sec)
                ),
                styles::text(),
            ),
        ]),
        None => Line::from(Span::styled(" Net   N/A", styles::text_muted())),
    };

    let lines = vec![
        gauge(
            "CPU",
            host.cpu_percent as f64,
            format!("{} cores", host.cpu_count),
        ),
        gauge(
            "Mem",
            host.memory_percent(),
            format!("{} / {}", format_bytes(host.memory_used), format_bytes(host.memory_total)),
        ),
        gauge(
            "Swap",
            host.swap_percent(),
            format!("{} / {}", format_bytes(host.swap_used), format_bytes(host.swap_total)),
        ),
        gauge(
            "Disk",
            host.disk_percent,
            format!(
                "{} / {} ({} free)",
                format_bytes(host.disk_used),
                format_bytes(host.disk_total),
                format_bytes(host.disk_total.saturating_sub(host.disk_used))
            ),
        ),
        net,
    ];
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_system_table(f: &mut Frame, app: &App, area: Rect) {
    let view = &app.system;
    let header = Row::new(
        std::iter::once(Cell::from(""))
            .chain(SystemColumn::ALL.iter().map(|c| {
                header_cell(c.title(), view.sort_key == Some(*c), view.sort_descending)
            })),
    );

    let ctx = DisplayContext::default();
    let rows: Vec<Row> = app
        .system_rows
        .rows
        .iter()
        .filter_map(|pid| app.system_processes.iter().find(|p| p.pid == *pid))
        .map(|p| {
            let selected = view.is_selected(&p.pid);
            let base = if selected { styles::marked() } else { styles::text() };
            let mut out = vec![Cell::from(mark(selected))];
            for (column, text) in SystemColumn::ALL.iter().zip(p.cells(&ctx)) {
                let style = match column {
                    SystemColumn::Cpu => styles::severity(app.thresholds.severity(p.cpu_percent as f64)),
                    SystemColumn::Memory => styles::severity(app.thresholds.memory_severity(p.memory_mb())),
                    SystemColumn::MemoryPercent => {
                        styles::severity(app.thresholds.severity(p.memory_percent as f64))
                    }
                    SystemColumn::User | SystemColumn::Status | SystemColumn::Command => styles::text_dim(),
                    _ => base,
                };
                out.push(Cell::from(text).style(style));
            }
            Row::new(out).style(base)
        })
        .collect();

    let widths = [
        Constraint::Length(2),
        Constraint::Length(8),
        Constraint::Length(18),
        Constraint::Length(7),
        Constraint::Length(9),
        Constraint::Length(7),
        Constraint::Length(10),
        Constraint::Length(10),
        Constraint::Min(20),
    ];

    let shown = app.system_rows.rows.len();
    let title = if shown < app.system_rows.total {
        format!(" All processes ({} of {}) ", shown, app.system_rows.total)
    } else {
        format!(" All processes ({}) ", shown)
    };

    let table = Table::new(rows, widths)
        .header(header)
        .block(table_block(title))
        .row_highlight_style(styles::selection());

    let mut state = TableState::default().with_selected(app.system_rows.cursor);
    f.render_stateful_widget(table, area, &mut state);
}

fn overlay_rect(area: Rect) -> Rect {
    centered(area, area.width * 9 / 10, area.height * 8 / 10)
}

fn draw_details_view(f: &mut Frame, app: &App, area: Rect) {
    let Some(details) = &app.details else {
        return;
    };
    let rect = overlay_rect(area);
    f.render_widget(Clear, rect);

    let lines: Vec<Line> = details
        .lines(app.home.as_deref(), chrono::Utc::now())
        .into_iter()
        .map(|l| Line::from(Span::styled(l, styles::text())))
        .collect();
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_focused())
        .title(Span::styled(
            format!(" Process details: {} ", details.title()),
            styles::accent_bold(),
        ))
        .title_bottom(Span::styled(" j/k scroll  esc close ", styles::text_dim()));
    f.render_widget(
        Paragraph::new(lines)
            .block(block)
            .scroll((app.details_scroll, 0)),
        rect,
    );
}

fn draw_logs_view(f: &mut Frame, app: &App, area: Rect) {
    let Some(buffer) = &app.logs else {
        return;
    };
    let rect = overlay_rect(area);
    f.render_widget(Clear, rect);

    let height = rect.height.saturating_sub(2) as usize;
    let mut lines: Vec<Line> = buffer
        .visible(height)
        .into_iter()
        .map(|l| Line::from(Span::styled(l.to_string(), styles::text())))
        .collect();
    if buffer.is_empty() {
        lines.push(Line::from(Span::styled("Waiting for output...", styles::text_muted())));
    }

    let state = match buffer.ended() {
        Some(reason) => Span::styled(format!(" ended: {} ", reason), styles::warn()),
        None if buffer.is_following() => Span::styled(" following ", styles::success()),
        None => Span::styled(" scrolled, f to follow ", styles::text_dim()),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_focused())
        .title(Span::styled(format!(" Logs: {} ", buffer.title()), styles::accent_bold()))
        .title_bottom(Line::from(vec![
            state,
            Span::styled(" j/k scroll  esc close ", styles::text_dim()),
        ]));
    f.render_widget(Paragraph::new(lines).block(block), rect);
}
