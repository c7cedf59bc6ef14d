//! The editor: a tree, its selections and the history of every change.
//!
//! All edits go through [`Editor`] methods (see the `agent` module for the
//! full set). Each one is validated before anything is touched, applied,
//! mirrored onto the selections, reported to the [`Observer`] and appended to
//! the event log as one self-contained event. Events are grouped into actions,
//! which are the unit of undo and redo.
//!
//! ```
//! use the_edit::{Editor, Route};
//!
//! the_edit::reflect! {
//!   #[derive(Debug, Clone, PartialEq)]
//!   pub struct Doc {
//!     pub title: String,
//!     pub items: Vec<u32>,
//!   }
//! }
//!
//! let mut editor = Editor::new(Doc { title: "a".into(), items: vec![] });
//! let items = Route::root().field(Doc::ITEMS);
//! {
//!   let mut action = editor.begin_action();
//!   action.append(&items, 1u32).unwrap();
//!   action.append(&items, 2u32).unwrap();
//! }
//! editor.set(&Route::root().field(Doc::TITLE), String::from("b")).unwrap();
//!
//! assert!(editor.undo());
//! assert_eq!(editor.tree().title, "a");
//! assert!(editor.undo());
//! assert!(editor.tree().items.is_empty());
//! assert!(editor.redo());
//! assert_eq!(editor.tree().items, vec![1, 2]);
//! ```

use std::{
  fmt,
  ops::{
    Deref,
    DerefMut,
    Range,
  },
};

use thiserror::Error;
use tracing::{
  debug,
  trace,
  warn,
};

use crate::{
  agent::Compound,
  codec::{
    Decoder,
    Encoder,
  },
  config::Config,
  history::{
    ActionInfo,
    History,
    HistoryError,
  },
  log::{
    EventLog,
    Opcode,
  },
  moves::Rotation,
  observer::{
    Notify,
    Observer,
  },
  path::{
    self,
    Path,
    PathError,
    Route,
  },
  reflect::{
    Growable,
    Kind,
    Node,
    Seq,
    Value,
  },
  replay::Direction,
  selection::{
    Removal,
    SelectionError,
    Selections,
    Snapshot,
  },
};

pub type Result<T> = std::result::Result<T, EditError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EditError {
  #[error(transparent)]
  Path(#[from] PathError),
  #[error(transparent)]
  Selection(#[from] SelectionError),
  #[error(transparent)]
  History(#[from] HistoryError),
  #[error("{path} holds {found}, not {expected}")]
  TypeMismatch {
    path:     Path,
    expected: &'static str,
    found:    &'static str,
  },
  #[error("{path} is not an array")]
  NotAnArray { path: Path },
  #[error("{path} is a fixed-length array")]
  FixedLength { path: Path },
  #[error("index {index} is out of bounds for {path} (len: {len})")]
  IndexOutOfBounds { path: Path, index: usize, len: usize },
  #[error("route {0} fans out over a selection, this operation needs a single target")]
  SelectionRoute(Route),
  #[error("cannot apply {op:?} to the value at {path}")]
  Arithmetic { path: Path, op: Compound },
  /// A count, index or length of `len` would not fit the index width logged
  /// for `path`.
  #[error("{len} does not fit the index width of {path}")]
  Overflow { path: Path, len: usize },
}

/// Forensic description of one logged event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventInfo {
  pub index:  usize,
  pub opcode: Option<Opcode>,
  /// Route decoded against the current shape of the tree.
  pub route:  Route,
  /// Size of the whole event in bytes.
  pub len:    usize,
}

impl fmt::Display for EventInfo {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.opcode {
      Some(opcode) => write!(f, "#{} {} {}", self.index, opcode, self.route)?,
      None => write!(f, "#{} <unknown> {}", self.index, self.route)?,
    }
    write!(f, " ({} bytes)", self.len)
  }
}

pub struct Editor<T: Value, O: Observer<T> = ()> {
  pub(crate) tree:       T,
  pub(crate) selections: Selections,
  pub(crate) observer:   O,
  pub(crate) log:        EventLog,
  pub(crate) history:    History,
  pub(crate) config:     Config,
}

impl<T: Value> Editor<T> {
  pub fn new(tree: T) -> Self {
    Self::with_observer(tree, ())
  }
}

impl<T: Value, O: Observer<T>> Editor<T, O> {
  pub fn with_observer(tree: T, observer: O) -> Self {
    Self::with_config(tree, observer, Config::default())
  }

  pub fn with_config(tree: T, observer: O, config: Config) -> Self {
    debug_assert_eq!(T::KIND, Kind::Struct, "the root of an edited tree must be a struct");
    Self {
      tree,
      selections: Selections::default(),
      observer,
      log: EventLog::with_capacity(config.log_capacity, config.event_capacity),
      history: History::default(),
      config,
    }
  }

  #[inline]
  pub fn tree(&self) -> &T {
    &self.tree
  }

  #[inline]
  pub fn selections(&self) -> &Selections {
    &self.selections
  }

  /// Selection list of the array addressed by `route`.
  pub fn selection(&self, route: &Route) -> Result<&[usize]> {
    let path = path::resolve(route, &self.tree)?;
    Ok(self.selections.get(&path))
  }

  #[inline]
  pub fn observer(&self) -> &O {
    &self.observer
  }

  #[inline]
  pub fn observer_mut(&mut self) -> &mut O {
    &mut self.observer
  }

  #[inline]
  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn into_inner(self) -> T {
    self.tree
  }

  /// Open an action. Every edit made through the returned guard (or through
  /// nested guards) is undone and redone as one unit. The action closes when
  /// the guard is dropped.
  pub fn begin_action(&mut self) -> Action<'_, T, O> {
    self.history.begin();
    Action { editor: self }
  }

  pub fn can_undo(&self) -> bool {
    self.history.can_undo()
  }

  pub fn can_redo(&self) -> bool {
    self.history.can_redo()
  }

  /// Revert the most recent reachable action. Returns `false` if there is
  /// nothing to undo or an action is open.
  pub fn undo(&mut self) -> bool {
    if self.history.is_open() {
      warn!("undo requested while an action is open");
      return false;
    }
    let Some(jump) = self.history.undo(self.log.len()) else {
      return false;
    };
    debug!(mark = jump.mark, events = ?jump.events, "undo");
    for event in jump.events.rev() {
      self.replay(event, Direction::Undo);
    }
    self.history.apply_undo();
    true
  }

  /// Re-apply the most recently undone action. Returns `false` if there is
  /// nothing to redo or an action is open.
  pub fn redo(&mut self) -> bool {
    if self.history.is_open() {
      warn!("redo requested while an action is open");
      return false;
    }
    let Some(jump) = self.history.redo(self.log.len()) else {
      return false;
    };
    debug!(mark = jump.mark, events = ?jump.events, "redo");
    for event in jump.events {
      self.replay(event, Direction::Redo);
    }
    self.history.apply_redo();
    true
  }

  /// Drop every recorded event and action. The tree and selections stay as
  /// they are.
  pub fn clear_history(&mut self) -> Result<()> {
    self.history.clear()?;
    debug!(events = self.log.len(), bytes = self.log.byte_len(), "history cleared");
    self.log.clear();
    Ok(())
  }

  #[inline]
  pub fn event_count(&self) -> usize {
    self.log.len()
  }

  /// Raw bytes of event `index`.
  pub fn event_bytes(&self, index: usize) -> Option<&[u8]> {
    self.log.event(index)
  }

  pub fn event(&self, index: usize) -> Option<EventInfo> {
    let bytes = self.log.event(index)?;
    let mut dec = Decoder::new(bytes);
    let (route, _) = path::decode(&mut dec, &self.tree);
    let opcode = Opcode::try_from(dec.u8()).ok();
    Some(EventInfo {
      index,
      opcode,
      route,
      len: bytes.len(),
    })
  }

  pub fn actions(&self) -> Vec<ActionInfo> {
    self.history.actions(self.log.len())
  }

  pub fn action_events(&self) -> Vec<Range<usize>> {
    self
      .actions()
      .into_iter()
      .map(|action| action.events)
      .collect()
  }

  /// Run `edit` inside an implicit action.
  pub(crate) fn with_action<R>(&mut self, edit: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
    let mut action = self.begin_action();
    edit(&mut *action)
  }

  /// Append a finished event to the log and to the open action.
  pub(crate) fn commit(&mut self, opcode: Opcode, event: Encoder) {
    let index = self.log.push(event.as_bytes());
    self.history.record(index);
    trace!(index, %opcode, bytes = event.len(), "recorded event");
  }

  pub(crate) fn scope(&mut self) -> Scope<'_, T, O> {
    Scope {
      tree:       &mut self.tree,
      selections: &mut self.selections,
      observer:   &mut self.observer,
      notify:     true,
    }
  }
}

impl<T: Value + fmt::Debug, O: Observer<T>> fmt::Debug for Editor<T, O> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Editor")
      .field("tree", &self.tree)
      .field("selections", &self.selections)
      .field("events", &self.log.len())
      .field("history", &self.history)
      .finish()
  }
}

/// An open action. Derefs to the editor; closes the action when dropped.
pub struct Action<'a, T: Value, O: Observer<T>> {
  editor: &'a mut Editor<T, O>,
}

impl<T: Value, O: Observer<T>> Deref for Action<'_, T, O> {
  type Target = Editor<T, O>;

  fn deref(&self) -> &Self::Target {
    self.editor
  }
}

impl<T: Value, O: Observer<T>> DerefMut for Action<'_, T, O> {
  fn deref_mut(&mut self) -> &mut Self::Target {
    self.editor
  }
}

impl<T: Value, O: Observer<T>> Drop for Action<'_, T, O> {
  fn drop(&mut self) {
    self.editor.history.end();
  }
}

/// Mutable view of the parts an edit touches, shared by live edits and
/// replay. Structural effects that need no typed value live here so both
/// paths mirror selections and notify the same way.
pub(crate) struct Scope<'a, T, O> {
  pub tree:       &'a mut T,
  pub selections: &'a mut Selections,
  pub observer:   &'a mut O,
  pub notify:     bool,
}

impl<T: Value, O: Observer<T>> Scope<'_, T, O> {
  #[inline]
  pub fn wants(&self, notify: Notify) -> bool {
    self.notify && <O as Observer<T>>::NOTIFY.contains(notify)
  }

  pub fn node(&self, path: &Path) -> &dyn Node {
    path::node_at(&*self.tree, path).unwrap_or_else(|| panic!("no node at {path}"))
  }

  pub fn node_mut(&mut self, path: &Path) -> &mut dyn Node {
    path::node_at_mut(&mut *self.tree, path).unwrap_or_else(|| panic!("no node at {path}"))
  }

  pub fn seq_mut(&mut self, path: &Path) -> &mut dyn Seq {
    self
      .node_mut(path)
      .as_seq_mut()
      .unwrap_or_else(|| panic!("{path} is not an array"))
  }

  pub fn growable(&mut self, path: &Path) -> &mut dyn Growable {
    self
      .seq_mut(path)
      .growable()
      .unwrap_or_else(|| panic!("{path} is not a growable array"))
  }

  pub fn vec_mut<V: Value>(&mut self, path: &Path) -> &mut Vec<V> {
    self
      .node_mut(path)
      .downcast_mut::<Vec<V>>()
      .unwrap_or_else(|| panic!("{path} is not a Vec<{}>", std::any::type_name::<V>()))
  }

  /// Swap `value` into the node at `path`, leaving the previous contents in
  /// `value`. Nested selections are restored from `snapshot` when given,
  /// otherwise trimmed to what the new value still holds.
  pub fn replace(
    &mut self,
    path: &Path,
    value: &mut dyn Node,
    snapshot: Option<Snapshot>,
  ) {
    let node = path::node_at_mut(&mut *self.tree, path)
      .unwrap_or_else(|| panic!("no node at {path}"));
    let swapped = node.swap_with(value);
    debug_assert!(swapped, "value type does not match the node at {path}");
    match snapshot {
      Some(snapshot) => self.selections.restore_subtree(path, snapshot),
      None => self.selections.retain_valid(path, &*node),
    }
    self.changed(path, value);
  }

  pub fn changed(&mut self, path: &Path, old: &dyn Node) {
    if self.wants(Notify::VALUE_CHANGED) {
      let new = path::node_at(&*self.tree, path).unwrap_or_else(|| panic!("no node at {path}"));
      self.observer.value_changed(&*self.tree, path, old, new);
    }
  }

  pub fn added(&mut self, path: &Path, indices: Range<usize>) {
    if self.wants(Notify::ELEMENT_ADDED) {
      for index in indices {
        self.observer.element_added(&*self.tree, path, index);
      }
    }
  }

  pub fn removed(&mut self, path: &Path, index: usize) {
    if self.wants(Notify::ELEMENT_REMOVED) {
      self.observer.element_removed(&*self.tree, path, index);
    }
  }

  /// Remove element `index`, returning what the selections need to put it
  /// back.
  pub fn remove(&mut self, path: &Path, index: usize) -> Removal {
    let removal = self.selections.remove_index(path, index);
    self.growable(path).remove_element(index);
    self.removed(path, index);
    removal
  }

  pub fn selection_changed(&mut self, path: &Path) {
    if self.wants(Notify::SELECTIONS_CHANGED) {
      self
        .observer
        .selections_changed(&*self.tree, path, self.selections.get(path));
    }
  }

  pub fn rotate(&mut self, path: &Path, rotation: Rotation) {
    if rotation.is_identity() {
      return;
    }
    self.seq_mut(path).rotate(rotation);
    self.selections.rotate(path, rotation);
    if self.wants(Notify::ELEMENT_MOVED) {
      for from in rotation.start..rotation.end {
        let to = rotation.map_index(from);
        self.observer.element_moved(&*self.tree, path, from, to);
      }
    }
  }

  pub fn swap(&mut self, path: &Path, a: usize, b: usize) {
    self.seq_mut(path).swap(a, b);
    self.selections.swap(path, a, b);
    if self.wants(Notify::ELEMENT_MOVED) {
      self.observer.element_moved(&*self.tree, path, a, b);
      self.observer.element_moved(&*self.tree, path, b, a);
    }
  }

  /// Reorder the array so that `new[k] == old[order[k]]`.
  pub fn permute(&mut self, path: &Path, order: &[usize]) {
    self.seq_mut(path).permute(order);
    self.selections.permute(path, order);
    if self.wants(Notify::ELEMENT_MOVED) {
      for (to, &from) in order.iter().enumerate() {
        if from != to {
          self.observer.element_moved(&*self.tree, path, from, to);
        }
      }
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::observer::Recorder;

  crate::reflect! {
    #[derive(Debug, Clone, PartialEq)]
    struct Doc {
      name:  String,
      items: Vec<i32>,
    }
  }

  fn doc() -> Doc {
    Doc {
      name:  "doc".into(),
      items: vec![1, 2, 3],
    }
  }

  #[test]
  fn test_action_groups_events() {
    let mut editor = Editor::new(doc());
    let items = Route::root().field(Doc::ITEMS);
    {
      let mut action = editor.begin_action();
      action.append(&items, 4).unwrap();
      action.remove(&items, 0).unwrap();
      assert!(!action.undo(), "undo is refused inside an action");
    }
    assert_eq!(editor.event_count(), 2);
    assert_eq!(editor.action_events(), vec![0..2]);

    assert!(editor.undo());
    assert_eq!(editor.tree(), &doc());
    assert!(!editor.undo());
  }

  #[test]
  fn test_clear_history() {
    let mut editor = Editor::new(doc());
    let name = Route::root().field(Doc::NAME);
    editor.set(&name, String::from("x")).unwrap();
    {
      let mut action = editor.begin_action();
      assert_eq!(
        action.clear_history(),
        Err(EditError::History(HistoryError::ActionOpen))
      );
    }
    editor.clear_history().unwrap();
    assert_eq!(editor.event_count(), 0);
    assert!(!editor.can_undo());
    assert_eq!(editor.tree().name, "x");
  }

  #[test]
  fn test_event_info() {
    let mut editor = Editor::new(doc());
    editor
      .insert(&Route::root().field(Doc::ITEMS), 1, 9)
      .unwrap();
    let info = editor.event(0).unwrap();
    assert_eq!(info.opcode, Some(Opcode::Insert));
    assert_eq!(info.route, Route::root().field(Doc::ITEMS));
    assert_eq!(info.len, editor.event_bytes(0).unwrap().len());
    assert!(info.to_string().starts_with("#0 Insert .1"));
    assert!(editor.event(1).is_none());
  }

  struct Tripwire;

  impl Observer<Doc> for Tripwire {
    const NOTIFY: Notify = Notify::ELEMENT_ADDED;

    fn element_added(&mut self, _: &Doc, _: &Path, _: usize) {
      panic!("tripped");
    }
  }

  #[test]
  fn test_panicking_edit_closes_its_action() {
    let mut editor = Editor::with_observer(doc(), Tripwire);
    let name = Route::root().field(Doc::NAME);
    editor.set(&name, String::from("x")).unwrap();

    let items = Route::root().field(Doc::ITEMS);
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
      editor.append(&items, 4)
    }));
    assert!(result.is_err());

    assert!(editor.undo());
    assert_eq!(editor.tree().name, "doc");
  }

  #[test]
  fn test_quiet_replay() {
    let config = Config {
      notify_on_replay: false,
      ..Config::default()
    };
    let mut editor = Editor::with_config(doc(), Recorder::default(), config);
    editor.swap(&Route::root().field(Doc::ITEMS), 0, 2).unwrap();
    assert_eq!(editor.observer_mut().take().len(), 2);
    assert!(editor.undo());
    assert!(editor.observer().events.is_empty());
    assert_eq!(editor.tree().items, vec![1, 2, 3]);
  }
}
