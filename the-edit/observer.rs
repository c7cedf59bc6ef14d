//! Change notifications.
//!
//! An [`Observer`] is told about every change the editor makes to the tree or
//! the selections, both while editing and while undoing or redoing. The
//! notifications an observer cares about are declared up front through
//! [`Observer::NOTIFY`]; the editor skips the bookkeeping (cloning old values,
//! walking moved ranges) for anything not requested.
//!
//! Callbacks get shared references only and run while the editor is borrowed,
//! so an observer cannot edit the tree from inside a notification.

use bitflags::bitflags;

use crate::{
  path::Path,
  reflect::Node,
};

bitflags! {
  /// Set of notifications an observer subscribes to.
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
  pub struct Notify: u8 {
    const VALUE_CHANGED      = 1 << 0;
    const ELEMENT_ADDED      = 1 << 1;
    const ELEMENT_REMOVED    = 1 << 2;
    const ELEMENT_MOVED      = 1 << 3;
    const SELECTIONS_CHANGED = 1 << 4;
  }
}

#[allow(unused_variables)]
pub trait Observer<T> {
  const NOTIFY: Notify = Notify::all();

  /// The node at `path` was replaced.
  fn value_changed(&mut self, tree: &T, path: &Path, old: &dyn Node, new: &dyn Node) {}

  /// An element was inserted at `index` of the array at `path`.
  fn element_added(&mut self, tree: &T, path: &Path, index: usize) {}

  /// The element at `index` of the array at `path` was removed.
  fn element_removed(&mut self, tree: &T, path: &Path, index: usize) {}

  /// The element at `from` now lives at `to`.
  fn element_moved(&mut self, tree: &T, path: &Path, from: usize, to: usize) {}

  /// The selection list of the array at `path` changed to `selection`.
  fn selections_changed(&mut self, tree: &T, path: &Path, selection: &[usize]) {}
}

impl<T> Observer<T> for () {
  const NOTIFY: Notify = Notify::empty();
}

/// Observer that records every notification, handy for tests and tooling.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recorder {
  pub events: Vec<Notification>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
  ValueChanged {
    path: Path,
    old:  String,
    new:  String,
  },
  ElementAdded {
    path:  Path,
    index: usize,
  },
  ElementRemoved {
    path:  Path,
    index: usize,
  },
  ElementMoved {
    path: Path,
    from: usize,
    to:   usize,
  },
  SelectionsChanged {
    path:      Path,
    selection: Vec<usize>,
  },
}

impl Recorder {
  pub fn take(&mut self) -> Vec<Notification> {
    std::mem::take(&mut self.events)
  }
}

impl<T> Observer<T> for Recorder {
  fn value_changed(&mut self, _: &T, path: &Path, old: &dyn Node, new: &dyn Node) {
    self.events.push(Notification::ValueChanged {
      path: path.clone(),
      old:  format!("{old:?}"),
      new:  format!("{new:?}"),
    });
  }

  fn element_added(&mut self, _: &T, path: &Path, index: usize) {
    self.events.push(Notification::ElementAdded {
      path: path.clone(),
      index,
    });
  }

  fn element_removed(&mut self, _: &T, path: &Path, index: usize) {
    self.events.push(Notification::ElementRemoved {
      path: path.clone(),
      index,
    });
  }

  fn element_moved(&mut self, _: &T, path: &Path, from: usize, to: usize) {
    self.events.push(Notification::ElementMoved {
      path: path.clone(),
      from,
      to,
    });
  }

  fn selections_changed(&mut self, _: &T, path: &Path, selection: &[usize]) {
    self.events.push(Notification::SelectionsChanged {
      path:      path.clone(),
      selection: selection.to_vec(),
    });
  }
}
