//! Per-table view state carried across snapshots
//!
//! A `ViewState` outlives every snapshot. On each refresh it is re-projected
//! onto the new snapshot: filter, then sort, then prune selection and cursor
//! down to identities that still exist. Projection is idempotent.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::format::{format_memory_mb, format_percent, format_ports, uptime_since};
use crate::model::{ContainerId, ContainerRecord, Pid, ProcessRecord, Snapshot};
use crate::process::shorten_home;

/// Formatting inputs that are not part of a record.
#[derive(Clone, Debug, Default)]
pub struct DisplayContext {
    pub now: DateTime<Utc>,
    pub home: Option<PathBuf>,
}

impl DisplayContext {
    /// Uptimes are measured against the snapshot time so projection stays
    /// deterministic for a given snapshot.
    pub fn for_snapshot(snapshot: &Snapshot, home: Option<PathBuf>) -> Self {
        Self {
            now: snapshot.taken_at,
            home,
        }
    }
}

/// A record that can be shown as a table row.
pub trait TableRow {
    type Id: Ord + Clone + std::fmt::Debug;
    type Column: Copy + PartialEq + std::fmt::Debug;

    fn row_id(&self) -> Self::Id;

    /// Displayed cell text, one per column, in column order.
    fn cells(&self, ctx: &DisplayContext) -> Vec<String>;

    fn compare_by(&self, other: &Self, column: Self::Column) -> Ordering;

    /// Order used when the user has not picked a sort column.
    fn default_order(&self, other: &Self) -> Ordering;
}

/// Rows that live in a `Snapshot`.
pub trait SnapshotRows: TableRow + Sized {
    fn rows(snapshot: &Snapshot) -> Vec<&Self>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessColumn {
    Pid,
    Project,
    Ports,
    Memory,
    Cpu,
    Uptime,
    Cwd,
    Command,
}

impl ProcessColumn {
    pub const ALL: [ProcessColumn; 8] = [
        ProcessColumn::Pid,
        ProcessColumn::Project,
        ProcessColumn::Ports,
        ProcessColumn::Memory,
        ProcessColumn::Cpu,
        ProcessColumn::Uptime,
        ProcessColumn::Cwd,
        ProcessColumn::Command,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            ProcessColumn::Pid => "PID",
            ProcessColumn::Project => "Project",
            ProcessColumn::Ports => "Ports",
            ProcessColumn::Memory => "Memory",
            ProcessColumn::Cpu => "CPU",
            ProcessColumn::Uptime => "Uptime",
            ProcessColumn::Cwd => "Directory",
            ProcessColumn::Command => "Command",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerColumn {
    Id,
    Name,
    Image,
    Status,
    Ports,
    Uptime,
    Project,
    Service,
}

impl ContainerColumn {
    pub const ALL: [ContainerColumn; 8] = [
        ContainerColumn::Id,
        ContainerColumn::Name,
        ContainerColumn::Image,
        ContainerColumn::Status,
        ContainerColumn::Ports,
        ContainerColumn::Uptime,
        ContainerColumn::Project,
        ContainerColumn::Service,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            ContainerColumn::Id => "ID",
            ContainerColumn::Name => "Name",
            ContainerColumn::Image => "Image",
            ContainerColumn::Status => "Status",
            ContainerColumn::Ports => "Ports",
            ContainerColumn::Uptime => "Uptime",
            ContainerColumn::Project => "Project",
            ContainerColumn::Service => "Service",
        }
    }
}

pub(crate) fn cmp_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

pub(crate) fn cmp_opt_text(a: Option<&str>, b: Option<&str>) -> Ordering {
    // Missing values sort after present ones
    match (a, b) {
        (Some(a), Some(b)) => cmp_text(a, b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Longer uptime means an earlier start; unknown starts count as youngest.
fn cmp_uptime(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

impl TableRow for ProcessRecord {
    type Id = Pid;
    type Column = ProcessColumn;

    fn row_id(&self) -> Pid {
        self.pid
    }

    fn cells(&self, ctx: &DisplayContext) -> Vec<String> {
        vec![
            self.pid.to_string(),
            self.project_name.clone().unwrap_or_else(|| "-".into()),
            format_ports(self.listening_ports.iter().copied()),
            format_memory_mb(self.memory_mb()),
            format_percent(self.cpu_percent),
            uptime_since(self.start_time, ctx.now),
            self.working_directory
                .as_deref()
                .map(|p| shorten_home(p, ctx.home.as_deref()))
                .unwrap_or_else(|| "-".into()),
            self.command.clone(),
        ]
    }

    fn compare_by(&self, other: &Self, column: ProcessColumn) -> Ordering {
        match column {
            ProcessColumn::Pid => self.pid.cmp(&other.pid),
            ProcessColumn::Project => {
                cmp_opt_text(self.project_name.as_deref(), other.project_name.as_deref())
            }
            ProcessColumn::Ports => self
                .listening_ports
                .first()
                .cmp(&other.listening_ports.first()),
            ProcessColumn::Memory => self.memory_bytes.cmp(&other.memory_bytes),
            ProcessColumn::Cpu => self.cpu_percent.total_cmp(&other.cpu_percent),
            ProcessColumn::Uptime => cmp_uptime(self.start_time, other.start_time),
            ProcessColumn::Cwd => self.working_directory.cmp(&other.working_directory),
            ProcessColumn::Command => cmp_text(&self.command, &other.command),
        }
    }

    fn default_order(&self, other: &Self) -> Ordering {
        other.memory_bytes.cmp(&self.memory_bytes)
    }
}

impl SnapshotRows for ProcessRecord {
    fn rows(snapshot: &Snapshot) -> Vec<&Self> {
        snapshot.processes.values().collect()
    }
}

impl TableRow for ContainerRecord {
    type Id = ContainerId;
    type Column = ContainerColumn;

    fn row_id(&self) -> ContainerId {
        self.id.clone()
    }

    fn cells(&self, ctx: &DisplayContext) -> Vec<String> {
        let ports = if self.ports.is_empty() {
            "-".to_string()
        } else {
            self.ports
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        vec![
            self.short_id().to_string(),
            self.name.clone(),
            self.image.clone(),
            self.status.to_string(),
            ports,
            uptime_since(self.start_time, ctx.now),
            self.compose_project().unwrap_or("-").to_string(),
            self.compose_service().unwrap_or("-").to_string(),
        ]
    }

    fn compare_by(&self, other: &Self, column: ContainerColumn) -> Ordering {
        match column {
            ContainerColumn::Id => self.id.cmp(&other.id),
            ContainerColumn::Name => cmp_text(&self.name, &other.name),
            ContainerColumn::Image => cmp_text(&self.image, &other.image),
            ContainerColumn::Status => cmp_text(self.status.label(), other.status.label()),
            ContainerColumn::Ports => {
                let first = |c: &ContainerRecord| c.ports.first().map(|p| (p.host_port, p.container_port));
                first(self).cmp(&first(other))
            }
            ContainerColumn::Uptime => cmp_uptime(self.start_time, other.start_time),
            ContainerColumn::Project => {
                cmp_opt_text(self.compose_project(), other.compose_project())
            }
            ContainerColumn::Service => {
                cmp_opt_text(self.compose_service(), other.compose_service())
            }
        }
    }

    fn default_order(&self, other: &Self) -> Ordering {
        cmp_opt_text(self.compose_project(), other.compose_project())
            .then_with(|| cmp_opt_text(self.compose_service(), other.compose_service()))
            .then_with(|| cmp_text(&self.name, &other.name))
    }
}

impl SnapshotRows for ContainerRecord {
    fn rows(snapshot: &Snapshot) -> Vec<&Self> {
        snapshot.containers.values().collect()
    }
}

/// Ordered, filtered row ids plus where the cursor sits among them.
#[derive(Clone, Debug, PartialEq)]
pub struct Projection<Id> {
    pub rows: Vec<Id>,
    pub cursor: Option<usize>,
    /// Rows in the snapshot before filtering and limiting.
    pub total: usize,
}

impl<Id> Projection<Id> {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct ViewState<R: TableRow> {
    pub sort_key: Option<R::Column>,
    pub sort_descending: bool,
    pub selected: BTreeSet<R::Id>,
    pub filter_text: String,
    pub cursor: Option<R::Id>,
    /// Visible position of the cursor at the last projection. Used to re-anchor
    /// the cursor when its row disappears.
    cursor_index: Option<usize>,
    pub row_limit: Option<usize>,
}

impl<R: TableRow> Default for ViewState<R> {
    fn default() -> Self {
        Self {
            sort_key: None,
            sort_descending: false,
            selected: BTreeSet::new(),
            filter_text: String::new(),
            cursor: None,
            cursor_index: None,
            row_limit: None,
        }
    }
}

impl<R: TableRow> ViewState<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_row_limit(mut self, limit: usize) -> Self {
        self.row_limit = Some(limit);
        self
    }

    /// Re-apply this state to a fresh set of rows.
    pub fn apply_rows(&mut self, all: Vec<&R>, ctx: &DisplayContext) -> Projection<R::Id> {
        let total = all.len();
        let present: BTreeSet<R::Id> = all.iter().map(|r| r.row_id()).collect();

        self.selected.retain(|id| present.contains(id));

        let needle = self.filter_text.trim().to_lowercase();
        let mut visible: Vec<&R> = all
            .into_iter()
            .filter(|row| {
                needle.is_empty()
                    || row
                        .cells(ctx)
                        .iter()
                        .any(|cell| cell.to_lowercase().contains(&needle))
            })
            .collect();

        visible.sort_by(|a, b| self.compare(*a, *b));
        if let Some(limit) = self.row_limit {
            visible.truncate(limit);
        }

        let rows: Vec<R::Id> = visible.iter().map(|r| r.row_id()).collect();

        if self.cursor.as_ref().is_some_and(|id| !present.contains(id)) {
            // Re-anchor at the same visible position, like a list that closed a gap
            self.cursor = self
                .cursor_index
                .and_then(|idx| rows.get(idx.min(rows.len().saturating_sub(1))))
                .cloned();
        }
        let cursor = self
            .cursor
            .as_ref()
            .and_then(|id| rows.iter().position(|r| r == id));
        if cursor.is_some() {
            self.cursor_index = cursor;
        }

        Projection { rows, cursor, total }
    }

    fn compare(&self, a: &R, b: &R) -> Ordering {
        let primary = match self.sort_key {
            Some(column) => {
                let ord = a.compare_by(b, column);
                if self.sort_descending { ord.reverse() } else { ord }
            }
            None => a.default_order(b),
        };
        primary.then_with(|| a.row_id().cmp(&b.row_id()))
    }

    /// Same column flips direction, a new column starts ascending.
    pub fn toggle_sort(&mut self, column: R::Column) {
        if self.sort_key == Some(column) {
            self.sort_descending = !self.sort_descending;
        } else {
            self.sort_key = Some(column);
            self.sort_descending = false;
        }
    }

    pub fn clear_sort(&mut self) {
        self.sort_key = None;
        self.sort_descending = false;
    }

    pub fn set_filter(&mut self, text: impl Into<String>) {
        self.filter_text = text.into();
    }

    pub fn toggle_selected(&mut self, id: R::Id) {
        if !self.selected.remove(&id) {
            self.selected.insert(id);
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    pub fn is_selected(&self, id: &R::Id) -> bool {
        self.selected.contains(id)
    }

    /// Move the cursor by `delta` rows within the last projection.
    pub fn move_cursor(&mut self, projection: &Projection<R::Id>, delta: isize) {
        if projection.rows.is_empty() {
            self.cursor = None;
            self.cursor_index = None;
            return;
        }
        let last = projection.rows.len() as isize - 1;
        let from = projection.cursor.map(|c| c as isize).unwrap_or(-1);
        let to = if from < 0 && delta < 0 {
            0
        } else {
            (from + delta).clamp(0, last) as usize
        };
        self.cursor = Some(projection.rows[to].clone());
        self.cursor_index = Some(to);
    }

    /// Identities an action should target: the selection if any, otherwise
    /// the row under the cursor.
    pub fn targets(&self) -> Vec<R::Id> {
        if self.selected.is_empty() {
            self.cursor.iter().cloned().collect()
        } else {
            self.selected.iter().cloned().collect()
        }
    }
}

impl<R: SnapshotRows> ViewState<R> {
    /// Re-apply this state to a snapshot.
    pub fn apply(&mut self, snapshot: &Snapshot, ctx: &DisplayContext) -> Projection<R::Id> {
        self.apply_rows(R::rows(snapshot), ctx)
    }
}

pub type ProcessView = ViewState<ProcessRecord>;
pub type ContainerView = ViewState<ContainerRecord>;
