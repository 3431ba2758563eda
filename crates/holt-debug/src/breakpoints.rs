//! Breakpoint set reconciliation.
//!
//! `set_breakpoints` takes the full requested set and the orchestrator diffs
//! it against what the session already has, issuing remote calls for the
//! delta only. Identity is (canonical path, line); re-requesting the same
//! location with a different condition is a replace, not a second breakpoint.

use std::path::PathBuf;

/// A requested breakpoint: canonical file path + 1-based line, with an
/// optional condition expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Breakpoint {
    pub path: PathBuf,
    pub line: u32,
    pub condition: Option<String>,
}

impl Breakpoint {
    pub fn new(path: impl Into<PathBuf>, line: u32) -> Self {
        Self {
            path: path.into(),
            line,
            condition: None,
        }
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    fn same_location(&self, other: &Breakpoint) -> bool {
        self.path == other.path && self.line == other.line
    }
}

/// A breakpoint the session holds, together with what the editor knows about
/// it. `remote_id` is `None` until the session has a live adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionBreakpoint {
    pub breakpoint: Breakpoint,
    pub remote_id: Option<u64>,
    pub verified: bool,
}

impl SessionBreakpoint {
    pub fn pending(breakpoint: Breakpoint) -> Self {
        Self {
            breakpoint,
            remote_id: None,
            verified: false,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BreakpointDelta {
    /// Breakpoints to add (including replacements for condition changes).
    pub add: Vec<Breakpoint>,
    /// Session breakpoints to remove remotely and locally.
    pub remove: Vec<SessionBreakpoint>,
}

impl BreakpointDelta {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Diff the requested set against the session's current set.
///
/// Unchanged breakpoints appear in neither list, so re-issuing an identical
/// set produces an empty delta and zero remote calls.
pub fn diff_breakpoints(
    current: &[SessionBreakpoint],
    requested: &[Breakpoint],
) -> BreakpointDelta {
    // Dedup the request by location, last spelling wins (replace, not add).
    let mut wanted: Vec<Breakpoint> = Vec::new();
    for bp in requested {
        match wanted.iter_mut().find(|w| w.same_location(bp)) {
            Some(existing) => *existing = bp.clone(),
            None => wanted.push(bp.clone()),
        }
    }

    let mut delta = BreakpointDelta::default();

    for cur in current {
        let keep = wanted
            .iter()
            .any(|w| w.same_location(&cur.breakpoint) && w.condition == cur.breakpoint.condition);
        if !keep {
            delta.remove.push(cur.clone());
        }
    }

    for want in wanted {
        let unchanged = current
            .iter()
            .any(|c| c.breakpoint.same_location(&want) && c.breakpoint.condition == want.condition);
        if !unchanged {
            delta.add.push(want);
        }
    }

    delta
}

#[cfg(test)]
mod tests {
    use super::*;

    fn held(path: &str, line: u32, condition: Option<&str>, id: u64) -> SessionBreakpoint {
        SessionBreakpoint {
            breakpoint: Breakpoint {
                path: PathBuf::from(path),
                line,
                condition: condition.map(str::to_string),
            },
            remote_id: Some(id),
            verified: true,
        }
    }

    #[test]
    fn identical_sets_produce_an_empty_delta() {
        let current = vec![held("/w/a.py", 10, None, 1), held("/w/a.py", 20, Some("x > 1"), 2)];
        let requested = vec![
            Breakpoint::new("/w/a.py", 10),
            Breakpoint::new("/w/a.py", 20).with_condition("x > 1"),
        ];

        assert!(diff_breakpoints(&current, &requested).is_empty());
    }

    #[test]
    fn only_the_delta_is_issued() {
        let current = vec![held("/w/a.py", 10, None, 1), held("/w/b.py", 5, None, 2)];
        let requested = vec![Breakpoint::new("/w/a.py", 10), Breakpoint::new("/w/c.py", 7)];

        let delta = diff_breakpoints(&current, &requested);
        assert_eq!(delta.add, vec![Breakpoint::new("/w/c.py", 7)]);
        assert_eq!(delta.remove, vec![held("/w/b.py", 5, None, 2)]);
    }

    #[test]
    fn changing_a_condition_is_a_replace() {
        let current = vec![held("/w/a.py", 10, Some("x > 1"), 1)];
        let requested = vec![Breakpoint::new("/w/a.py", 10).with_condition("x > 2")];

        let delta = diff_breakpoints(&current, &requested);
        assert_eq!(delta.remove.len(), 1);
        assert_eq!(delta.add.len(), 1);
        assert_eq!(delta.add[0].condition.as_deref(), Some("x > 2"));
    }

    #[test]
    fn duplicate_locations_in_one_request_collapse_to_the_last() {
        let requested = vec![
            Breakpoint::new("/w/a.py", 10).with_condition("first"),
            Breakpoint::new("/w/a.py", 10).with_condition("second"),
        ];

        let delta = diff_breakpoints(&[], &requested);
        assert_eq!(delta.add.len(), 1);
        assert_eq!(delta.add[0].condition.as_deref(), Some("second"));
    }

    #[test]
    fn an_empty_request_clears_everything() {
        let current = vec![held("/w/a.py", 10, None, 1), held("/w/b.py", 5, None, 2)];
        let delta = diff_breakpoints(&current, &[]);
        assert!(delta.add.is_empty());
        assert_eq!(delta.remove.len(), 2);
    }
}
