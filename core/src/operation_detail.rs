use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OperationStatus {
    None,
    Executing,
    Success,
    Error,
    Info,
}

/// One node of the operation log tree shown to the operator. A command run
/// by a driver becomes one node whose children hold its output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationDetail {
    pub description: String,
    pub status: OperationStatus,
    pub started_at: DateTime<Utc>,
    pub elapsed: Option<Duration>,
    pub children: Vec<OperationDetail>,
    #[serde(skip)]
    started: Option<Instant>,
}

impl OperationDetail {
    pub fn new(description: impl Into<String>, status: OperationStatus) -> Self {
        Self {
            description: description.into(),
            status,
            started_at: Utc::now(),
            elapsed: None,
            children: Vec::new(),
            started: Some(Instant::now()),
        }
    }

    pub fn add_child(&mut self, child: OperationDetail) -> &mut OperationDetail {
        self.children.push(child);
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    pub fn last_child_mut(&mut self) -> Option<&mut OperationDetail> {
        self.children.last_mut()
    }

    /// Set the final status and stop the clock.
    pub fn set_status(&mut self, status: OperationStatus) {
        self.status = status;
        if let Some(started) = self.started {
            self.elapsed = Some(started.elapsed());
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == OperationStatus::Success
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let marker = match self.status {
            OperationStatus::None => " ",
            OperationStatus::Executing => "…",
            OperationStatus::Success => "✓",
            OperationStatus::Error => "✗",
            OperationStatus::Info => "i",
        };
        let indent = "  ".repeat(depth);
        let mut lines = self.description.lines();
        writeln!(f, "{}[{}] {}", indent, marker, lines.next().unwrap_or(""))?;
        for line in lines {
            writeln!(f, "{}    {}", indent, line)?;
        }
        for child in &self.children {
            child.write_tree(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for OperationDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_nest_and_status_stops_clock() {
        let mut root = OperationDetail::new("check file system", OperationStatus::None);
        let cmd = root.add_child(OperationDetail::new("e2fsck -f -y -v /dev/sdb1", OperationStatus::Executing));
        cmd.add_child(OperationDetail::new("pass 1", OperationStatus::None));
        cmd.set_status(OperationStatus::Success);

        assert_eq!(root.children.len(), 1);
        let cmd = root.last_child_mut().unwrap();
        assert!(cmd.succeeded());
        assert!(cmd.elapsed.is_some());
        assert_eq!(cmd.children[0].description, "pass 1");
    }

    #[test]
    fn display_renders_tree() {
        let mut root = OperationDetail::new("label", OperationStatus::None);
        root.add_child(OperationDetail::new("e2label /dev/sdb1 \"x\"", OperationStatus::Error));
        let text = root.to_string();
        assert!(text.contains("[✗] e2label"));
        assert!(text.lines().nth(1).unwrap().starts_with("  "));
    }
}
