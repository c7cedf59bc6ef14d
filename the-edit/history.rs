//! Action marks over the event log.
//!
//! History never stores edits itself; it partitions the event log into
//! actions. Each action is a [`Mark::Action`] naming its first event and owns
//! every event up to the next action's first event.
//!
//! Undo walks back along the *reachable* actions: the ones a linear undo/redo
//! sequence can still visit. Starting a new action after undoing pushes a
//! [`Mark::Elision`] first, which removes the undone actions (the redo branch)
//! from the chain without touching the log:
//!
//! ```text
//! marks:  A0 A1 A2            undo, undo   → redo = 2
//! marks:  A0 A1 A2 E(2) A3    new action   → chain: A3, A0
//! ```
//!
//! An elision of `k` skips the previous `k` reachable actions. Elisions that
//! are themselves skipped keep their effect, so walking back a running total of
//! pending skips is enough to find the chain.

use std::ops::Range;

use thiserror::Error;

/// Result type for history operations.
pub type Result<T> = std::result::Result<T, HistoryError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HistoryError {
  #[error("history cannot be cleared while an action is open")]
  ActionOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
  Action { first_event: usize },
  Elision { count: usize },
}

/// An action selected for undo or redo, not yet applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Jump {
  /// Index of the action's mark.
  pub mark:   usize,
  /// Events to replay: backwards for undo, forwards for redo.
  pub events: Range<usize>,
}

/// Forensic description of one recorded action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionInfo {
  pub mark:      usize,
  pub events:    Range<usize>,
  /// Still on the undo/redo chain. Elided actions stay in the log but can
  /// never be visited again.
  pub reachable: bool,
  /// Reachable and currently undone (redo would re-apply it).
  pub undone:    bool,
}

#[derive(Debug, Default)]
pub struct History {
  marks:  Vec<Mark>,
  /// Reachable actions currently undone.
  redo:   usize,
  /// Nesting depth of open actions.
  depth:  usize,
  /// Whether the open action already pushed its mark.
  marked: bool,
}

impl History {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn marks(&self) -> &[Mark] {
    &self.marks
  }

  #[inline]
  pub fn depth(&self) -> usize {
    self.depth
  }

  #[inline]
  pub fn is_open(&self) -> bool {
    self.depth > 0
  }

  #[inline]
  pub fn redo_count(&self) -> usize {
    self.redo
  }

  /// Open an action. Nested calls join the outermost action.
  pub fn begin(&mut self) {
    if self.depth == 0 {
      self.marked = false;
    }
    self.depth += 1;
  }

  /// Close the innermost open action.
  pub fn end(&mut self) {
    debug_assert!(self.depth > 0, "unbalanced action end");
    self.depth = self.depth.saturating_sub(1);
  }

  /// Note that event `event` was appended to the log inside the open action.
  ///
  /// The first event of an action pushes its mark, preceded by an elision of
  /// the redo branch if there is one.
  pub fn record(&mut self, event: usize) {
    debug_assert!(self.depth > 0, "event recorded outside of an action");
    if self.marked {
      return;
    }
    if self.redo > 0 {
      self.marks.push(Mark::Elision { count: self.redo });
      self.redo = 0;
    }
    self.marks.push(Mark::Action { first_event: event });
    self.marked = true;
  }

  /// Mark indices of the reachable actions, newest first.
  pub fn reachable(&self) -> Vec<usize> {
    let mut chain = Vec::new();
    let mut skip = 0;
    for (index, mark) in self.marks.iter().enumerate().rev() {
      match *mark {
        Mark::Elision { count } => skip += count,
        Mark::Action { .. } if skip > 0 => skip -= 1,
        Mark::Action { .. } => chain.push(index),
      }
    }
    chain
  }

  /// Events owned by the action at `mark`.
  pub fn events(&self, mark: usize, event_count: usize) -> Range<usize> {
    let Some(Mark::Action { first_event }) = self.marks.get(mark).copied() else {
      return 0..0;
    };
    let end = self.marks[mark + 1..]
      .iter()
      .find_map(|mark| {
        match *mark {
          Mark::Action { first_event } => Some(first_event),
          Mark::Elision { .. } => None,
        }
      })
      .unwrap_or(event_count);
    first_event..end
  }

  pub fn can_undo(&self) -> bool {
    !self.is_open() && self.redo < self.reachable().len()
  }

  pub fn can_redo(&self) -> bool {
    !self.is_open() && self.redo > 0
  }

  /// The action an undo would revert.
  pub fn undo(&self, event_count: usize) -> Option<Jump> {
    if self.is_open() {
      return None;
    }
    let mark = *self.reachable().get(self.redo)?;
    Some(Jump {
      mark,
      events: self.events(mark, event_count),
    })
  }

  /// The action a redo would re-apply.
  pub fn redo(&self, event_count: usize) -> Option<Jump> {
    if self.is_open() || self.redo == 0 {
      return None;
    }
    let mark = *self.reachable().get(self.redo - 1)?;
    Some(Jump {
      mark,
      events: self.events(mark, event_count),
    })
  }

  /// Record that the jump returned by [`History::undo`] was applied.
  pub fn apply_undo(&mut self) {
    self.redo += 1;
  }

  /// Record that the jump returned by [`History::redo`] was applied.
  pub fn apply_redo(&mut self) {
    self.redo = self.redo.saturating_sub(1);
  }

  /// Forget every action. The caller clears the log alongside.
  pub fn clear(&mut self) -> Result<()> {
    if self.is_open() {
      return Err(HistoryError::ActionOpen);
    }
    self.marks.clear();
    self.redo = 0;
    Ok(())
  }

  pub fn actions(&self, event_count: usize) -> Vec<ActionInfo> {
    let chain = self.reachable();
    self
      .marks
      .iter()
      .enumerate()
      .filter(|(_, mark)| matches!(mark, Mark::Action { .. }))
      .map(|(mark, _)| {
        let position = chain.iter().position(|&reachable| reachable == mark);
        ActionInfo {
          mark,
          events: self.events(mark, event_count),
          reachable: position.is_some(),
          undone: position.is_some_and(|position| position < self.redo),
        }
      })
      .collect()
  }
}

#[cfg(test)]
mod test {
  use super::*;

  /// Opens an action, records `events` consecutive events, closes it.
  fn commit(history: &mut History, log: &mut usize, events: usize) {
    history.begin();
    for _ in 0..events {
      history.record(*log);
      *log += 1;
    }
    history.end();
  }

  fn undo(history: &mut History, log: usize) -> Option<Range<usize>> {
    let jump = history.undo(log)?;
    history.apply_undo();
    Some(jump.events)
  }

  fn redo(history: &mut History, log: usize) -> Option<Range<usize>> {
    let jump = history.redo(log)?;
    history.apply_redo();
    Some(jump.events)
  }

  #[test]
  fn test_action_ranges() {
    let mut history = History::new();
    let mut log = 0;
    commit(&mut history, &mut log, 2);
    commit(&mut history, &mut log, 0);
    commit(&mut history, &mut log, 3);

    assert_eq!(history.marks().len(), 2, "empty actions leave no mark");
    assert_eq!(undo(&mut history, log), Some(2..5));
    assert_eq!(undo(&mut history, log), Some(0..2));
    assert_eq!(undo(&mut history, log), None);
    assert_eq!(redo(&mut history, log), Some(0..2));
    assert_eq!(redo(&mut history, log), Some(2..5));
    assert_eq!(redo(&mut history, log), None);
  }

  #[test]
  fn test_nested_actions_coalesce() {
    let mut history = History::new();
    history.begin();
    history.record(0);
    history.begin();
    history.record(1);
    history.end();
    history.record(2);
    history.end();

    assert_eq!(history.marks(), &[Mark::Action { first_event: 0 }]);
    assert_eq!(history.undo(3).map(|jump| jump.events), Some(0..3));
  }

  #[test]
  fn test_elision() {
    let mut history = History::new();
    let mut log = 0;
    commit(&mut history, &mut log, 1); // A0
    commit(&mut history, &mut log, 1); // A1
    commit(&mut history, &mut log, 1); // A2
    undo(&mut history, log);
    undo(&mut history, log);
    commit(&mut history, &mut log, 1); // A3 elides A2, A1

    assert_eq!(history.redo(log), None);
    assert_eq!(undo(&mut history, log), Some(3..4));
    assert_eq!(undo(&mut history, log), Some(0..1));
    assert_eq!(undo(&mut history, log), None);

    let reachable: Vec<bool> = history
      .actions(log)
      .iter()
      .map(|action| action.reachable)
      .collect();
    assert_eq!(reachable, vec![true, false, false, true]);
  }

  #[test]
  fn test_nested_elision() {
    let mut history = History::new();
    let mut log = 0;
    commit(&mut history, &mut log, 1); // A0
    commit(&mut history, &mut log, 1); // A1
    undo(&mut history, log);
    commit(&mut history, &mut log, 1); // A2, elides A1
    undo(&mut history, log);
    undo(&mut history, log);
    commit(&mut history, &mut log, 1); // A3, elides A2 and A0

    assert_eq!(history.reachable().len(), 1);
    assert_eq!(undo(&mut history, log), Some(3..4));
    assert_eq!(undo(&mut history, log), None);
  }

  #[test]
  fn test_open_action_blocks_jumps_and_clear() {
    let mut history = History::new();
    let mut log = 0;
    commit(&mut history, &mut log, 1);
    history.begin();
    assert!(history.undo(log).is_none());
    assert!(!history.can_undo());
    assert_eq!(history.clear(), Err(HistoryError::ActionOpen));
    history.end();

    assert!(history.can_undo());
    history.clear().unwrap();
    assert!(history.marks().is_empty());
    assert!(!history.can_undo());
  }

  #[test]
  fn test_actions_report_undone() {
    let mut history = History::new();
    let mut log = 0;
    commit(&mut history, &mut log, 2);
    commit(&mut history, &mut log, 1);
    undo(&mut history, log);

    let actions = history.actions(log);
    assert_eq!(actions.len(), 2);
    assert_eq!(actions[0].events, 0..2);
    assert!(!actions[0].undone);
    assert!(actions[1].undone && actions[1].reachable);
  }
}
