//! Dashboard state and key handling
//!
//! `App` owns the pipeline and the table views. Everything here is
//! synchronous and free of terminal I/O; effects that need the runtime
//! (refresh, kill, stop, inspect, follow logs) come back out of `handle_key`
//! as a `Command`.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use devdash_core::config::DevdashConfig;
use devdash_core::export::export_to_dir;
use devdash_core::format::Thresholds;
use devdash_core::host::{ProcessDetails, SystemColumn, SystemProcess, SystemView};
use devdash_core::logs::LogBuffer;
use devdash_core::model::{ContainerId, ContainerRecord, Pid, ProcessRecord, Snapshot};
use devdash_core::notify::{self, Notification, NotificationLog};
use devdash_core::pipeline::Pipeline;
use devdash_core::process::RuntimeMatcher;
use devdash_core::source::RuntimeAvailability;
use devdash_core::view::{
    ContainerColumn, ContainerView, DisplayContext, ProcessColumn, ProcessView, Projection,
};

use crate::poller::Update;
use crate::system::HostStats;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tab {
    Processes,
    Containers,
    System,
}

impl Tab {
    fn next(self) -> Self {
        match self {
            Tab::Processes => Tab::Containers,
            Tab::Containers => Tab::System,
            Tab::System => Tab::Processes,
        }
    }

    fn previous(self) -> Self {
        self.next().next()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    Normal,
    Filter,
    ConfirmKill(Vec<Pid>),
    ConfirmStop(Vec<ContainerId>),
    Help,
    /// Showing `App::details`
    Details,
    /// Showing `App::logs`
    Logs,
}

/// Effects the event loop has to carry out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Quit,
    Refresh,
    Kill(Vec<Pid>),
    Stop(Vec<ContainerId>),
    Inspect(Pid),
    FollowLogs(ContainerId),
}

const PAGE: isize = 10;
const LOG_PAGE: usize = 10;

pub struct App {
    pub pipeline: Pipeline,
    pub tab: Tab,
    pub mode: Mode,
    pub processes: ProcessView,
    pub containers: ContainerView,
    pub system: SystemView,
    pub process_rows: Projection<Pid>,
    pub container_rows: Projection<ContainerId>,
    pub system_rows: Projection<Pid>,
    pub system_processes: Vec<SystemProcess>,
    /// Pid whose details were requested and have not arrived yet
    pub inspecting: Option<Pid>,
    pub details: Option<ProcessDetails>,
    pub details_scroll: u16,
    pub logs: Option<LogBuffer>,
    pub notifications: NotificationLog,
    pub host: Option<HostStats>,
    pub thresholds: Thresholds,
    pub matcher: RuntimeMatcher,
    pub home: Option<PathBuf>,
    pub export_dir: PathBuf,
    pub demo: bool,
}

fn empty_projection<Id>() -> Projection<Id> {
    Projection {
        rows: Vec::new(),
        cursor: None,
        total: 0,
    }
}

impl App {
    pub fn new(
        pipeline: Pipeline,
        config: &DevdashConfig,
        home: Option<PathBuf>,
        export_dir: PathBuf,
    ) -> Self {
        Self {
            pipeline,
            tab: Tab::Processes,
            mode: Mode::Normal,
            processes: ProcessView::new().with_row_limit(config.process_limit),
            containers: ContainerView::new(),
            system: SystemView::new().with_row_limit(config.process_limit),
            process_rows: empty_projection(),
            container_rows: empty_projection(),
            system_rows: empty_projection(),
            system_processes: Vec::new(),
            inspecting: None,
            details: None,
            details_scroll: 0,
            logs: None,
            notifications: NotificationLog::default(),
            host: None,
            thresholds: config.thresholds(),
            matcher: config.runtime_matcher(),
            home,
            export_dir,
            demo: false,
        }
    }

    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.pipeline.current()
    }

    pub fn display_context(&self, snapshot: &Snapshot) -> DisplayContext {
        DisplayContext::for_snapshot(snapshot, self.home.clone())
    }

    /// Re-apply every view to the latest data.
    pub fn reproject(&mut self) {
        let ctx = DisplayContext {
            now: Utc::now(),
            home: self.home.clone(),
        };
        self.system_rows = self.system.apply_rows(self.system_processes.iter().collect(), &ctx);

        let Some(snapshot) = self.pipeline.current() else {
            return;
        };
        let ctx = self.display_context(&snapshot);
        self.process_rows = self.processes.apply(&snapshot, &ctx);
        self.container_rows = self.containers.apply(&snapshot, &ctx);
    }

    pub fn handle_update(&mut self, update: Update) {
        match update {
            Update::Cycle(outcome) => {
                let report = self.pipeline.ingest(outcome);
                for event in &report.events {
                    if let Some(n) = notify::from_event(event, &self.matcher) {
                        self.notifications.push(n);
                    }
                }
                self.notifications
                    .extend(report.notices.iter().map(notify::from_notice));
                if report.published {
                    self.reproject();
                    self.end_logs_of_vanished_container();
                }
            }
            Update::Host(stats) => self.host = Some(stats),
            Update::System(processes) => {
                self.system_processes = processes;
                self.reproject();
            }
            Update::Action(n) => self.notifications.push(n),
            Update::Details { pid, details } => {
                if self.inspecting != Some(pid) {
                    return;
                }
                self.inspecting = None;
                match details {
                    Some(details) => {
                        self.details = Some(details);
                        self.details_scroll = 0;
                        if self.mode == Mode::Normal {
                            self.mode = Mode::Details;
                        }
                    }
                    None => self
                        .notifications
                        .push(Notification::warning(format!("PID {} no longer exists", pid))),
                }
            }
            Update::Log { id, line } => {
                if let Some(buffer) = self.logs.as_mut().filter(|b| b.container_id == id) {
                    buffer.push(line);
                }
            }
            Update::LogEnded { id, reason } => {
                if let Some(buffer) = self.logs.as_mut().filter(|b| b.container_id == id) {
                    buffer.end(reason);
                }
            }
        }
    }

    fn end_logs_of_vanished_container(&mut self) {
        // An unreachable runtime says nothing about the container itself
        if !matches!(self.pipeline.runtime(), Some(RuntimeAvailability::Available)) {
            return;
        }
        let Some(snapshot) = self.pipeline.current() else {
            return;
        };
        if let Some(buffer) = self.logs.as_mut() {
            if snapshot.container(&buffer.container_id).is_none() {
                buffer.end("container is no longer running");
            }
        }
    }

    /// Container whose log stream should be running right now.
    pub fn log_target(&self) -> Option<&ContainerId> {
        if self.mode != Mode::Logs {
            return None;
        }
        self.logs
            .as_ref()
            .filter(|b| b.ended().is_none())
            .map(|b| &b.container_id)
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Command> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Some(Command::Quit);
        }

        match self.mode.clone() {
            Mode::Filter => {
                self.handle_filter_key(key.code);
                None
            }
            Mode::ConfirmKill(pids) => {
                self.mode = Mode::Normal;
                matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter)
                    .then_some(Command::Kill(pids))
            }
            Mode::ConfirmStop(ids) => {
                self.mode = Mode::Normal;
                matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter)
                    .then_some(Command::Stop(ids))
            }
            Mode::Help => {
                self.mode = Mode::Normal;
                None
            }
            Mode::Details => {
                self.handle_details_key(key.code);
                None
            }
            Mode::Logs => {
                self.handle_logs_key(key.code);
                None
            }
            Mode::Normal => self.handle_normal_key(key.code),
        }
    }

    fn handle_details_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Down | KeyCode::Char('j') => {
                self.details_scroll = self.details_scroll.saturating_add(1);
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.details_scroll = self.details_scroll.saturating_sub(1);
            }
            _ => {
                self.details = None;
                self.mode = Mode::Normal;
            }
        }
    }

    fn handle_logs_key(&mut self, code: KeyCode) {
        let Some(buffer) = self.logs.as_mut() else {
            self.mode = Mode::Normal;
            return;
        };
        match code {
            KeyCode::Up | KeyCode::Char('k') => buffer.scroll_up(1),
            KeyCode::Down | KeyCode::Char('j') => buffer.scroll_down(1),
            KeyCode::PageUp => buffer.scroll_up(LOG_PAGE),
            KeyCode::PageDown => buffer.scroll_down(LOG_PAGE),
            KeyCode::Home | KeyCode::Char('g') => buffer.scroll_up(usize::MAX / 2),
            KeyCode::End | KeyCode::Char('G') | KeyCode::Char('f') => buffer.follow(),
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('l') => {
                self.logs = None;
                self.mode = Mode::Normal;
            }
            _ => {}
        }
    }

    fn handle_filter_key(&mut self, code: KeyCode) {
        let filter = match self.tab {
            Tab::Processes => &mut self.processes.filter_text,
            Tab::Containers => &mut self.containers.filter_text,
            Tab::System => &mut self.system.filter_text,
        };
        match code {
            KeyCode::Enter => self.mode = Mode::Normal,
            KeyCode::Esc => {
                filter.clear();
                self.mode = Mode::Normal;
            }
            KeyCode::Backspace => {
                filter.pop();
            }
            KeyCode::Char(c) => filter.push(c),
            _ => return,
        }
        self.reproject();
    }

    fn handle_normal_key(&mut self, code: KeyCode) -> Option<Command> {
        match code {
            KeyCode::Char('q') => return Some(Command::Quit),
            KeyCode::Char('r') => return Some(Command::Refresh),
            KeyCode::Tab => self.tab = self.tab.next(),
            KeyCode::BackTab => self.tab = self.tab.previous(),
            KeyCode::Char('1') => self.tab = Tab::Processes,
            KeyCode::Char('2') => self.tab = Tab::Containers,
            KeyCode::Char('3') => self.tab = Tab::System,
            KeyCode::Down | KeyCode::Char('j') => self.move_cursor(1),
            KeyCode::Up | KeyCode::Char('k') => self.move_cursor(-1),
            KeyCode::PageDown => self.move_cursor(PAGE),
            KeyCode::PageUp => self.move_cursor(-PAGE),
            KeyCode::Home | KeyCode::Char('g') => self.move_cursor(isize::MIN / 2),
            KeyCode::End | KeyCode::Char('G') => self.move_cursor(isize::MAX / 2),
            KeyCode::Char(' ') => self.toggle_mark(),
            KeyCode::Char('/') => self.mode = Mode::Filter,
            KeyCode::Esc => {
                match self.tab {
                    Tab::Processes => {
                        self.processes.clear_selection();
                        self.processes.set_filter("");
                    }
                    Tab::Containers => {
                        self.containers.clear_selection();
                        self.containers.set_filter("");
                    }
                    Tab::System => {
                        self.system.clear_selection();
                        self.system.set_filter("");
                    }
                }
                self.reproject();
            }
            KeyCode::Char('>') | KeyCode::Right => self.shift_sort_column(1),
            KeyCode::Char('<') | KeyCode::Left => self.shift_sort_column(-1),
            KeyCode::Char('s') => self.flip_sort(),
            KeyCode::Char('d') => {
                self.processes.clear_sort();
                self.containers.clear_sort();
                self.system.clear_sort();
                self.reproject();
            }
            KeyCode::Char('x') => self.request_action(),
            KeyCode::Char('i') => return self.request_details(),
            KeyCode::Char('l') => return self.request_logs(),
            KeyCode::Enter => {
                return match self.tab {
                    Tab::Containers => self.request_logs(),
                    Tab::Processes | Tab::System => self.request_details(),
                };
            }
            KeyCode::Char('e') => self.export_snapshot(),
            KeyCode::Char('?') => self.mode = Mode::Help,
            _ => {}
        }
        None
    }

    fn move_cursor(&mut self, delta: isize) {
        match self.tab {
            Tab::Processes => self.processes.move_cursor(&self.process_rows, delta),
            Tab::Containers => self.containers.move_cursor(&self.container_rows, delta),
            Tab::System => self.system.move_cursor(&self.system_rows, delta),
        }
        self.reproject();
    }

    fn toggle_mark(&mut self) {
        match self.tab {
            Tab::Processes => {
                if let Some(pid) = self.processes.cursor {
                    self.processes.toggle_selected(pid);
                }
            }
            Tab::Containers => {
                if let Some(id) = self.containers.cursor.clone() {
                    self.containers.toggle_selected(id);
                }
            }
            Tab::System => {
                if let Some(pid) = self.system.cursor {
                    self.system.toggle_selected(pid);
                }
            }
        }
        self.move_cursor(1);
    }

    /// Move the sort key one column left or right. A column picked this way
    /// always starts ascending.
    fn shift_sort_column(&mut self, step: isize) {
        fn next<C: Copy + PartialEq>(all: &[C], current: Option<C>, step: isize) -> C {
            let n = all.len() as isize;
            let idx = match current.and_then(|c| all.iter().position(|x| *x == c)) {
                Some(i) => (i as isize + step).rem_euclid(n),
                None if step < 0 => n - 1,
                None => 0,
            };
            all[idx as usize]
        }

        match self.tab {
            Tab::Processes => {
                let column = next(&ProcessColumn::ALL, self.processes.sort_key, step);
                self.processes.toggle_sort(column);
            }
            Tab::Containers => {
                let column = next(&ContainerColumn::ALL, self.containers.sort_key, step);
                self.containers.toggle_sort(column);
            }
            Tab::System => {
                let column = next(&SystemColumn::ALL, self.system.sort_key, step);
                self.system.toggle_sort(column);
            }
        }
        self.reproject();
    }

    fn flip_sort(&mut self) {
        match self.tab {
            Tab::Processes => {
                let column = self.processes.sort_key.unwrap_or(ProcessColumn::Memory);
                self.processes.toggle_sort(column);
            }
            Tab::Containers => {
                let column = self.containers.sort_key.unwrap_or(ContainerColumn::Name);
                self.containers.toggle_sort(column);
            }
            Tab::System => {
                let column = self.system.sort_key.unwrap_or(SystemColumn::Memory);
                self.system.toggle_sort(column);
            }
        }
        self.reproject();
    }

    fn request_action(&mut self) {
        match self.tab {
            Tab::Processes => {
                let targets = self.processes.targets();
                if !targets.is_empty() {
                    self.mode = Mode::ConfirmKill(targets);
                }
            }
            Tab::Containers => {
                let targets = self.containers.targets();
                if !targets.is_empty() {
                    self.mode = Mode::ConfirmStop(targets);
                }
            }
            Tab::System => {
                let targets = self.system.targets();
                if !targets.is_empty() {
                    self.mode = Mode::ConfirmKill(targets);
                }
            }
        }
    }

    fn request_details(&mut self) -> Option<Command> {
        let pid = match self.tab {
            Tab::Processes => self.processes.cursor,
            Tab::System => self.system.cursor,
            Tab::Containers => {
                self.notifications
                    .push(Notification::warning("Details are for processes; press l for logs"));
                return None;
            }
        }?;
        self.inspecting = Some(pid);
        Some(Command::Inspect(pid))
    }

    fn request_logs(&mut self) -> Option<Command> {
        if self.tab != Tab::Containers {
            self.notifications
                .push(Notification::warning("Select a container to view its logs"));
            return None;
        }
        let snapshot = self.pipeline.current()?;
        let container = self.cursor_container_record(&snapshot)?;
        self.logs = Some(LogBuffer::new(container.id.clone(), container.name));
        self.mode = Mode::Logs;
        Some(Command::FollowLogs(container.id))
    }

    pub fn export_snapshot(&mut self) {
        let Some(snapshot) = self.pipeline.current() else {
            self.notifications
                .push(Notification::warning("Nothing to export yet"));
            return;
        };
        let n = match export_to_dir(&snapshot, &self.export_dir) {
            Ok(path) => Notification::success(format!("Snapshot saved to {}", path.display())),
            Err(e) => {
                log::error!("export failed: {}", e);
                Notification::error(format!("Export failed: {}", e))
            }
        };
        self.notifications.push(n);
    }

    /// Record under the process cursor, looked up by identity.
    pub fn cursor_process_record(&self, snapshot: &Snapshot) -> Option<ProcessRecord> {
        self.processes.cursor.and_then(|pid| snapshot.process(pid).cloned())
    }

    pub fn cursor_container_record(&self, snapshot: &Snapshot) -> Option<ContainerRecord> {
        self.containers
            .cursor
            .as_ref()
            .and_then(|id| snapshot.container(id).cloned())
    }

    pub fn cursor_system_process(&self) -> Option<&SystemProcess> {
        let pid = self.system.cursor?;
        self.system_processes.iter().find(|p| p.pid == pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crossterm::event::KeyEventKind;
    use devdash_core::cycle::CycleOutcome;
    use devdash_core::notify::Level;
    use devdash_core::resolver::ProjectResolver;
    use devdash_core::source::ContainerScan;
    use std::path::Path;

    use crate::collectors::DemoManifestReader;

    fn record(pid: Pid, project: &str, ports: &[u16], mb: u64) -> ProcessRecord {
        ProcessRecord {
            pid,
            name: "node".into(),
            command: format!("node {}.js", project),
            working_directory: Some(Path::new("/demo").join(project)),
            listening_ports: ports.iter().copied().collect(),
            memory_bytes: mb * 1024 * 1024,
            cpu_percent: 1.0,
            start_time: None,
            project_name: None,
        }
    }

    fn cycle(processes: Vec<ProcessRecord>) -> Update {
        Update::Cycle(CycleOutcome::Collected {
            processes,
            containers: ContainerScan::available(vec![]),
            taken_at: Utc::now(),
        })
    }

    fn container(id: &str, name: &str) -> ContainerRecord {
        ContainerRecord {
            id: id.into(),
            name: name.into(),
            image: "postgres:16".into(),
            status: devdash_core::model::ContainerStatus::Running,
            ports: Vec::new(),
            start_time: None,
            compose: None,
        }
    }

    fn container_cycle(containers: ContainerScan) -> Update {
        Update::Cycle(CycleOutcome::Collected {
            processes: Vec::new(),
            containers,
            taken_at: Utc::now(),
        })
    }

    fn system_process(pid: Pid, name: &str, mb: u64) -> SystemProcess {
        SystemProcess {
            pid,
            name: name.into(),
            user: Some("dev".into()),
            status: "Sleeping".into(),
            command: name.into(),
            memory_bytes: mb * 1024 * 1024,
            memory_percent: 1.0,
            cpu_percent: 0.5,
        }
    }

    fn app(export_dir: PathBuf) -> App {
        let config = DevdashConfig::default();
        let pipeline = Pipeline::new(
            ProjectResolver::new(Box::new(DemoManifestReader)),
            config.watched_ports.clone(),
        );
        App::new(pipeline, &config, None, export_dir)
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: crossterm::event::KeyEventState::NONE,
        }
    }

    #[test]
    fn test_cycles_feed_views_and_notifications() {
        let mut app = app(PathBuf::from("/unused"));
        app.handle_update(cycle(vec![record(1, "api", &[3000], 100)]));
        assert_eq!(app.process_rows.rows, vec![1]);
        assert!(app.notifications.is_empty());

        app.handle_update(cycle(vec![
            record(1, "api", &[3000], 100),
            record(2, "web", &[5173], 200),
        ]));
        assert_eq!(app.process_rows.rows, vec![2, 1]);
        let latest = app.notifications.latest().unwrap();
        assert_eq!(latest.message, "New node process PID 2 on port 5173");

        app.handle_update(cycle(vec![record(2, "web", &[5173], 200)]));
        assert_eq!(app.notifications.latest().unwrap().level, Level::Warning);
        let snapshot = app.snapshot().unwrap();
        assert_eq!(snapshot.processes[&2].project_name.as_deref(), Some("web"));
    }

    #[test]
    fn test_kill_targets_cursor_identity() {
        let mut app = app(PathBuf::from("/unused"));
        app.handle_update(cycle(vec![record(1, "a", &[], 100), record(2, "b", &[], 200)]));

        app.handle_key(key(KeyCode::Down));
        assert_eq!(app.processes.cursor, Some(2));

        // A refresh reorders the rows; the cursor stays on pid 2
        app.handle_update(cycle(vec![record(1, "a", &[], 900), record(2, "b", &[], 200)]));
        assert_eq!(app.process_rows.rows, vec![1, 2]);

        assert_eq!(app.handle_key(key(KeyCode::Char('x'))), None);
        assert_eq!(app.mode, Mode::ConfirmKill(vec![2]));
        assert_eq!(
            app.handle_key(key(KeyCode::Char('y'))),
            Some(Command::Kill(vec![2]))
        );
        assert_eq!(app.mode, Mode::Normal);
    }

    #[test]
    fn test_cancelled_confirmation_does_nothing() {
        let mut app = app(PathBuf::from("/unused"));
        app.handle_update(cycle(vec![record(1, "a", &[], 100)]));
        app.handle_key(key(KeyCode::Down));
        app.handle_key(key(KeyCode::Char('x')));
        assert_eq!(app.handle_key(key(KeyCode::Char('n'))), None);
        assert_eq!(app.mode, Mode::Normal);
    }

    #[test]
    fn test_marked_rows_form_a_batch() {
        let mut app = app(PathBuf::from("/unused"));
        app.handle_update(cycle(vec![
            record(1, "a", &[], 300),
            record(2, "b", &[], 200),
            record(3, "c", &[], 100),
        ]));
        app.handle_key(key(KeyCode::Down));
        app.handle_key(key(KeyCode::Char(' ')));
        app.handle_key(key(KeyCode::Char(' ')));
        assert_eq!(app.processes.targets(), vec![1, 2]);

        // pid 1 exits: it drops out of the selection
        app.handle_update(cycle(vec![record(2, "b", &[], 200), record(3, "c", &[], 100)]));
        app.handle_key(key(KeyCode::Char('x')));
        assert_eq!(app.mode, Mode::ConfirmKill(vec![2]));
    }

    #[test]
    fn test_filter_mode_edits_live() {
        let mut app = app(PathBuf::from("/unused"));
        app.handle_update(cycle(vec![record(1, "api", &[], 100), record(2, "web", &[], 200)]));

        app.handle_key(key(KeyCode::Char('/')));
        for c in "api".chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
        assert_eq!(app.process_rows.rows, vec![1]);
        // q is text while filtering, not quit
        assert_eq!(app.handle_key(key(KeyCode::Char('q'))), None);
        assert!(app.process_rows.is_empty());

        app.handle_key(key(KeyCode::Esc));
        assert_eq!(app.mode, Mode::Normal);
        assert_eq!(app.process_rows.rows.len(), 2);
    }

    #[test]
    fn test_sort_keys() {
        let mut app = app(PathBuf::from("/unused"));
        app.handle_update(cycle(vec![record(5, "a", &[], 100), record(3, "b", &[], 200)]));

        app.handle_key(key(KeyCode::Char('>')));
        assert_eq!(app.processes.sort_key, Some(ProcessColumn::Pid));
        assert_eq!(app.process_rows.rows, vec![3, 5]);

        app.handle_key(key(KeyCode::Char('s')));
        assert!(app.processes.sort_descending);
        assert_eq!(app.process_rows.rows, vec![5, 3]);

        app.handle_key(key(KeyCode::Char('d')));
        assert_eq!(app.processes.sort_key, None);
        assert_eq!(app.process_rows.rows, vec![3, 5]);
    }

    #[test]
    fn test_export_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path().to_path_buf());
        app.handle_key(key(KeyCode::Char('e')));
        assert_eq!(app.notifications.latest().unwrap().level, Level::Warning);

        app.handle_update(cycle(vec![record(1, "a", &[], 100)]));
        app.handle_key(key(KeyCode::Char('e')));
        let n = app.notifications.latest().unwrap();
        assert_eq!(n.level, Level::Success);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_system_tab_lists_all_processes() {
        let mut app = app(PathBuf::from("/unused"));
        app.system.row_limit = Some(2);
        app.handle_update(Update::System(vec![
            system_process(1, "init", 5),
            system_process(300, "postgres", 400),
            system_process(700, "chrome", 900),
        ]));
        assert_eq!(app.system_rows.rows, vec![700, 300]);
        assert_eq!(app.system_rows.total, 3);

        app.handle_key(key(KeyCode::Char('3')));
        assert_eq!(app.tab, Tab::System);
        app.handle_key(key(KeyCode::Down));
        app.handle_key(key(KeyCode::Down));
        assert_eq!(app.cursor_system_process().map(|p| p.pid), Some(300));

        app.handle_key(key(KeyCode::Char('x')));
        assert_eq!(app.mode, Mode::ConfirmKill(vec![300]));
        app.handle_key(key(KeyCode::Char('n')));

        app.handle_key(key(KeyCode::Char('/')));
        for c in "init".chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
        assert_eq!(app.system_rows.rows, vec![1]);
        assert_eq!(app.processes.filter_text, "");
    }

    #[test]
    fn test_tab_key_cycles_three_tabs() {
        let mut app = app(PathBuf::from("/unused"));
        app.handle_key(key(KeyCode::Tab));
        assert_eq!(app.tab, Tab::Containers);
        app.handle_key(key(KeyCode::Tab));
        assert_eq!(app.tab, Tab::System);
        app.handle_key(key(KeyCode::Tab));
        assert_eq!(app.tab, Tab::Processes);
        app.handle_key(key(KeyCode::BackTab));
        assert_eq!(app.tab, Tab::System);
    }

    #[test]
    fn test_details_open_for_the_requested_pid() {
        let mut app = app(PathBuf::from("/unused"));
        app.handle_update(cycle(vec![record(1, "api", &[3000], 100)]));
        app.handle_key(key(KeyCode::Down));

        assert_eq!(app.handle_key(key(KeyCode::Char('i'))), Some(Command::Inspect(1)));
        assert_eq!(app.inspecting, Some(1));

        // A late answer for another pid is ignored
        app.handle_update(Update::Details {
            pid: 2,
            details: Some(ProcessDetails::default()),
        });
        assert_eq!(app.mode, Mode::Normal);

        app.handle_update(Update::Details {
            pid: 1,
            details: Some(ProcessDetails {
                pid: 1,
                name: "node".into(),
                ..Default::default()
            }),
        });
        assert_eq!(app.mode, Mode::Details);
        assert_eq!(app.details.as_ref().map(|d| d.pid), Some(1));

        app.handle_key(key(KeyCode::Down));
        assert_eq!(app.details_scroll, 1);
        app.handle_key(key(KeyCode::Esc));
        assert_eq!(app.mode, Mode::Normal);
        assert!(app.details.is_none());

        assert_eq!(app.handle_key(key(KeyCode::Enter)), Some(Command::Inspect(1)));
        app.handle_update(Update::Details {
            pid: 1,
            details: None,
        });
        assert_eq!(app.mode, Mode::Normal);
        assert_eq!(app.notifications.latest().unwrap().message, "PID 1 no longer exists");
    }

    #[test]
    fn test_logs_are_keyed_by_container() {
        let mut app = app(PathBuf::from("/unused"));
        let db = container("aaaa1111", "db-1");
        let cache = container("bbbb2222", "cache-1");
        app.handle_update(container_cycle(ContainerScan::available(vec![
            db.clone(),
            cache.clone(),
        ])));

        app.handle_key(key(KeyCode::Char('2')));
        app.handle_key(key(KeyCode::Down));
        let cursor = app.containers.cursor.clone().unwrap();
        assert_eq!(
            app.handle_key(key(KeyCode::Char('l'))),
            Some(Command::FollowLogs(cursor.clone()))
        );
        assert_eq!(app.mode, Mode::Logs);
        assert_eq!(app.log_target(), Some(&cursor));

        let other = if cursor == db.id { &cache.id } else { &db.id };
        app.handle_update(Update::Log {
            id: other.clone(),
            line: "stale".into(),
        });
        app.handle_update(Update::Log {
            id: cursor.clone(),
            line: "ready".into(),
        });
        let buffer = app.logs.as_ref().unwrap();
        assert_eq!(buffer.visible(10), vec!["ready"]);

        // q closes the log view instead of quitting
        assert_eq!(app.handle_key(key(KeyCode::Char('q'))), None);
        assert_eq!(app.mode, Mode::Normal);
        assert!(app.logs.is_none());
        assert_eq!(app.log_target(), None);
    }

    #[test]
    fn test_logs_end_when_container_goes() {
        let mut app = app(PathBuf::from("/unused"));
        let db = container("aaaa1111", "db-1");
        app.handle_update(container_cycle(ContainerScan::available(vec![db.clone()])));
        app.handle_key(key(KeyCode::Char('2')));
        app.handle_key(key(KeyCode::Down));
        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.log_target(), Some(&db.id));

        // An outage does not end the stream
        app.handle_update(container_cycle(ContainerScan::unavailable("daemon down")));
        assert_eq!(app.log_target(), Some(&db.id));

        app.handle_update(container_cycle(ContainerScan::available(vec![])));
        assert_eq!(app.log_target(), None);
        let buffer = app.logs.as_ref().unwrap();
        assert_eq!(buffer.ended(), Some("container is no longer running"));
        assert_eq!(app.mode, Mode::Logs);
    }

    #[test]
    fn test_logs_and_details_need_the_right_tab() {
        let mut app = app(PathBuf::from("/unused"));
        app.handle_update(cycle(vec![record(1, "api", &[], 100)]));
        app.handle_key(key(KeyCode::Down));
        assert_eq!(app.handle_key(key(KeyCode::Char('l'))), None);
        assert_eq!(app.notifications.latest().unwrap().level, Level::Warning);

        app.handle_key(key(KeyCode::Char('2')));
        assert_eq!(app.handle_key(key(KeyCode::Char('i'))), None);
        assert_eq!(app.inspecting, None);
    }
}
