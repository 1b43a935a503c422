//! Undo grouping.
//!
//! The host owns the undo stack; this crate only needs to open a labelled
//! entry and hold it while related edits land. Dropping the scope value
//! closes the entry.

use crate::ids::TrackId;

/// External undo stack.
pub trait History {
    /// Open entry; closed when dropped.
    type Scope;

    fn push(&mut self, label: &str) -> Self::Scope;
}

/// History that records nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullHistory;

impl History for NullHistory {
    type Scope = ();

    fn push(&mut self, _label: &str) -> Self::Scope {}
}

struct OpenScope<S> {
    label: String,
    track: TrackId,
    _scope: S,
}

/// At most one open undo entry, keyed by label and track.
pub struct ChangeScopes<H: History> {
    history: H,
    open: Option<OpenScope<H::Scope>>,
}

impl<H: History> ChangeScopes<H> {
    pub fn new(history: H) -> Self {
        Self {
            history,
            open: None,
        }
    }

    /// Make sure a scope for `(label, track)` is open. Returns `true` when a
    /// new one was pushed; any other open scope is closed first.
    pub fn enter(&mut self, label: &str, track: TrackId) -> bool {
        if let Some(open) = &self.open {
            if open.label == label && open.track == track {
                return false;
            }
        }
        // Close before pushing so the host never sees two entries nested.
        self.open = None;
        let scope = self.history.push(label);
        self.open = Some(OpenScope {
            label: label.to_owned(),
            track,
            _scope: scope,
        });
        true
    }

    pub fn close(&mut self) {
        self.open = None;
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn current_label(&self) -> Option<&str> {
        self.open.as_ref().map(|o| o.label.as_str())
    }

    pub fn current_track(&self) -> Option<TrackId> {
        self.open.as_ref().map(|o| o.track)
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut H {
        &mut self.history
    }
}

impl<H: History + Default> Default for ChangeScopes<H> {
    fn default() -> Self {
        Self::new(H::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Counting {
        pushed: Vec<String>,
        closed: Rc<Cell<usize>>,
    }

    struct Guard(Rc<Cell<usize>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    impl History for Counting {
        type Scope = Guard;

        fn push(&mut self, label: &str) -> Guard {
            self.pushed.push(label.to_owned());
            Guard(self.closed.clone())
        }
    }

    #[test]
    fn same_label_and_track_share_a_scope() {
        let mut scopes = ChangeScopes::new(Counting::default());
        assert!(scopes.enter("edit", TrackId(0)));
        assert!(!scopes.enter("edit", TrackId(0)));
        assert_eq!(scopes.history().pushed.len(), 1);
        assert_eq!(scopes.history().closed.get(), 0);
    }

    #[test]
    fn label_or_track_change_reopens() {
        let mut scopes = ChangeScopes::new(Counting::default());
        scopes.enter("edit", TrackId(0));
        assert!(scopes.enter("edit", TrackId(1)));
        assert!(scopes.enter("move", TrackId(1)));
        assert_eq!(scopes.history().pushed, vec!["edit", "edit", "move"]);
        assert_eq!(scopes.history().closed.get(), 2);
        scopes.close();
        assert_eq!(scopes.history().closed.get(), 3);
        assert!(!scopes.is_open());
    }
}
