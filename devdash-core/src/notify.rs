//! User-facing notifications built from lifecycle events and pipeline health.
//!
//! The diff engine only produces events. Turning them into messages, and
//! deciding which ones are worth showing, happens here.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::diff::LifecycleEvent;
use crate::format::format_ports;
use crate::model::short_container_id;
use crate::pipeline::HealthNotice;
use crate::process::RuntimeMatcher;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub level: Level,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            at: Utc::now(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Level::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(Level::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Level::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Level::Error, message)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `None` for events that are not worth interrupting the user for.
pub fn from_event(event: &LifecycleEvent, matcher: &RuntimeMatcher) -> Option<Notification> {
    let family = matcher.family_label();
    match event {
        LifecycleEvent::ProcessDisappeared { process } => {
            let message = if process.listening_ports.is_empty() {
                format!("{} process PID {} exited", capitalize(family), process.pid)
            } else {
                format!(
                    "{} process PID {} (port {}) exited",
                    capitalize(family),
                    process.pid,
                    format_ports(process.listening_ports.iter().copied())
                )
            };
            Some(Notification::warning(message))
        }
        LifecycleEvent::ProcessAppeared { process } => {
            if process.listening_ports.is_empty() {
                return None;
            }
            Some(Notification::info(format!(
                "New {} process PID {} on port {}",
                family,
                process.pid,
                format_ports(process.listening_ports.iter().copied())
            )))
        }
        LifecycleEvent::ContainerDisappeared { container } => Some(Notification::warning(format!(
            "Docker container {} stopped",
            short_container_id(&container.id)
        ))),
        LifecycleEvent::ContainerAppeared { container } => Some(Notification::info(format!(
            "Docker container {} started ({})",
            container.name, container.image
        ))),
        LifecycleEvent::PortBoundByUntracked { port, pid } => Some(Notification::info(format!(
            "Watched port {} active (PID {})",
            port, pid
        ))),
    }
}

pub fn from_notice(notice: &HealthNotice) -> Notification {
    match notice {
        HealthNotice::RuntimeUnavailable { reason } => {
            Notification::warning(format!("Container runtime unavailable: {}", reason))
        }
        HealthNotice::RuntimeRestored => Notification::success("Container runtime reachable again"),
        HealthNotice::CollectionDegraded { consecutive } => Notification::error(format!(
            "Collection failing: {} cycles in a row timed out, showing stale data",
            consecutive
        )),
        HealthNotice::CollectionRecovered => Notification::success("Collection recovered"),
    }
}

/// Bounded, newest-last history of notifications.
#[derive(Clone, Debug)]
pub struct NotificationLog {
    entries: VecDeque<Notification>,
    capacity: usize,
}

impl NotificationLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, notification: Notification) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(notification);
    }

    pub fn extend<I: IntoIterator<Item = Notification>>(&mut self, items: I) {
        for n in items {
            self.push(n);
        }
    }

    pub fn latest(&self) -> Option<&Notification> {
        self.entries.back()
    }

    /// Newest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &Notification> {
        self.entries.iter().rev().take(n)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for NotificationLog {
    fn default() -> Self {
        Self::new(50)
    }
}
