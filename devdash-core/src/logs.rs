//! Scrollback for a followed container log

use std::collections::VecDeque;

use crate::model::{ContainerId, short_container_id};

/// Lines kept per followed container.
pub const LOG_CAPACITY: usize = 2_000;

/// Bounded buffer for one container's output. New lines are dropped once the
/// stream has ended.
#[derive(Clone, Debug)]
pub struct LogBuffer {
    pub container_id: ContainerId,
    pub container_name: String,
    lines: VecDeque<String>,
    cap: usize,
    /// Lines scrolled up from the newest; 0 follows new output
    scroll: usize,
    ended: Option<String>,
}

impl LogBuffer {
    pub fn new(container_id: ContainerId, container_name: impl Into<String>) -> Self {
        Self::with_capacity(container_id, container_name, LOG_CAPACITY)
    }

    pub fn with_capacity(
        container_id: ContainerId,
        container_name: impl Into<String>,
        cap: usize,
    ) -> Self {
        Self {
            container_id,
            container_name: container_name.into(),
            lines: VecDeque::new(),
            cap: cap.max(1),
            scroll: 0,
            ended: None,
        }
    }

    pub fn title(&self) -> String {
        format!(
            "{} ({})",
            self.container_name,
            short_container_id(&self.container_id)
        )
    }

    pub fn push(&mut self, line: String) {
        if self.ended.is_some() {
            return;
        }
        self.lines.push_back(line);
        if self.lines.len() > self.cap {
            self.lines.pop_front();
        }
        // Keep a scrolled view on the same lines
        if self.scroll > 0 {
            self.scroll = (self.scroll + 1).min(self.lines.len().saturating_sub(1));
        }
    }

    /// Only the first reason is kept.
    pub fn end(&mut self, reason: impl Into<String>) {
        if self.ended.is_none() {
            self.ended = Some(reason.into());
        }
    }

    pub fn ended(&self) -> Option<&str> {
        self.ended.as_deref()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn is_following(&self) -> bool {
        self.scroll == 0
    }

    pub fn scroll_up(&mut self, n: usize) {
        self.scroll = (self.scroll + n).min(self.lines.len().saturating_sub(1));
    }

    pub fn scroll_down(&mut self, n: usize) {
        self.scroll = self.scroll.saturating_sub(n);
    }

    pub fn follow(&mut self) {
        self.scroll = 0;
    }

    /// Up to `height` lines, ending `scroll` lines above the newest.
    pub fn visible(&self, height: usize) -> Vec<&str> {
        let end = self.lines.len() - self.scroll.min(self.lines.len());
        let start = end.saturating_sub(height);
        self.lines.range(start..end).map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(cap: usize, n: usize) -> LogBuffer {
        let mut buf = LogBuffer::with_capacity("abc123".into(), "api-1", cap);
        for i in 0..n {
            buf.push(format!("line {}", i));
        }
        buf
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let buf = filled(3, 5);
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.visible(10), vec!["line 2", "line 3", "line 4"]);
        assert_eq!(buf.visible(2), vec!["line 3", "line 4"]);
    }

    #[test]
    fn test_scrolled_view_stays_put() {
        let mut buf = filled(100, 10);
        buf.scroll_up(3);
        assert!(!buf.is_following());
        assert_eq!(buf.visible(2), vec!["line 5", "line 6"]);

        buf.push("line 10".into());
        assert_eq!(buf.visible(2), vec!["line 5", "line 6"]);

        buf.scroll_up(1_000);
        assert_eq!(buf.visible(2), vec!["line 0"]);

        buf.follow();
        assert_eq!(buf.visible(1), vec!["line 10"]);
        buf.scroll_down(5);
        assert!(buf.is_following());
    }

    #[test]
    fn test_ended_buffer_ignores_lines() {
        let mut buf = filled(10, 2);
        buf.end("container stopped");
        buf.end("exit status 1");
        buf.push("late".into());
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.ended(), Some("container stopped"));
        assert_eq!(buf.title(), "api-1 (abc123)");
    }

    #[test]
    fn test_empty_buffer() {
        let mut buf = filled(10, 0);
        assert!(buf.is_empty());
        buf.scroll_up(4);
        assert!(buf.is_following());
        assert!(buf.visible(5).is_empty());
    }
}
