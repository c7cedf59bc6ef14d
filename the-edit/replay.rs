//! Undo and redo of logged events.
//!
//! An event carries everything needed to run it in either direction. Replay
//! decodes the route against the current tree (which is in the exact state
//! the event left it in, or found it in), then re-derives the effect from the
//! payload. Structural effects go through the same [`Scope`] helpers live
//! edits use, so selections and observers see the same changes both ways.
//!
//! Replay trusts the log: an event that does not fit the tree means the log
//! was corrupted and panics.

use tracing::trace;

use crate::{
  codec::{
    Decoder,
    IndexWidth,
  },
  editor::{
    Editor,
    Scope,
  },
  log::Opcode,
  moves::{
    self,
    Rotation,
  },
  observer::Observer,
  path::{
    self,
    Path,
    Route,
  },
  reflect::{
    Node,
    Value,
  },
  selection::{
    Removal,
    Snapshot,
  },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  Undo,
  Redo,
}

impl<T: Value, O: Observer<T>> Editor<T, O> {
  /// Run event `event` backwards or forwards.
  pub(crate) fn replay(&mut self, event: usize, direction: Direction) {
    let Editor {
      tree,
      selections,
      observer,
      log,
      config,
      ..
    } = self;
    let bytes = log
      .event(event)
      .unwrap_or_else(|| panic!("event {event} is missing from the log"));
    let mut dec = Decoder::new(bytes);
    let (route, width) = path::decode(&mut dec, &*tree);
    let opcode = Opcode::try_from(dec.u8()).unwrap_or_else(|err| panic!("event {event}: {err}"));
    trace!(event, %opcode, ?direction, %route, "replay");

    let mut replay = Replay {
      scope: Scope {
        tree,
        selections,
        observer,
        notify: config.notify_on_replay,
      },
      dec,
      route,
      width,
      undo: direction == Direction::Undo,
    };
    replay.run(opcode);
  }
}

struct Replay<'a, 'b, T, O> {
  scope: Scope<'a, T, O>,
  dec:   Decoder<'b>,
  route: Route,
  width: IndexWidth,
  undo:  bool,
}

impl<'b, T: Value, O: Observer<T>> Replay<'_, 'b, T, O> {
  fn run(&mut self, opcode: Opcode) {
    match opcode {
      Opcode::Reset => {
        let path = self.path();
        let default = self.scope.node(&path).default_boxed();
        self.replace_each(&[path], self.width, Some(default));
      },
      Opcode::Set => {
        let targets = self.targets();
        self.replace_each(&targets, self.width, None);
      },
      Opcode::SetFamily => {
        let targets = self.targets();
        let Some(first) = targets.first() else {
          return;
        };
        let shared = self.scope.node(first).decode_dyn(&mut self.dec, self.width);
        self.replace_each(&targets, self.width, Some(shared));
      },
      Opcode::SetMany => {
        let path = self.path();
        let targets: Vec<Path> = self
          .dec
          .indices(self.width)
          .into_iter()
          .map(|index| path.child(index))
          .collect();
        let Some(first) = targets.first() else {
          return;
        };
        let shared = self
          .scope
          .node(first)
          .decode_dyn(&mut self.dec, IndexWidth::DEFAULT);
        self.replace_each(&targets, IndexWidth::DEFAULT, Some(shared));
      },
      Opcode::Assign | Opcode::AssignDefault => self.assign(opcode == Opcode::Assign),
      Opcode::Reserve => {
        let path = self.path();
        let requested = self.dec.varint() as usize;
        let previous = self.dec.varint() as usize;
        let growable = self.scope.growable(&path);
        if self.undo {
          growable.shrink_to(previous);
        } else {
          growable.reserve(requested);
        }
      },
      Opcode::Trim => {
        let path = self.path();
        let previous = self.dec.varint() as usize;
        let growable = self.scope.growable(&path);
        if self.undo {
          growable.reserve(previous);
        } else {
          growable.shrink_to(0);
        }
      },
      Opcode::Append => self.append(1),
      Opcode::AppendMany => {
        let count = self.dec.index(self.width);
        self.append(count);
      },
      Opcode::Insert | Opcode::InsertMany => self.insert(opcode == Opcode::InsertMany),
      Opcode::Remove => self.remove(1),
      Opcode::RemoveMany | Opcode::RemoveSelected => {
        let count = self.dec.index(self.width);
        self.remove(count);
      },
      Opcode::Sort | Opcode::SortDescending => {
        let path = self.path();
        let mut order = self.dec.indices(self.width);
        if self.undo {
          order = moves::invert_permutation(&order);
        }
        self.scope.permute(&path, &order);
      },
      Opcode::Swap => {
        let path = self.path();
        let a = self.dec.index(self.width);
        let b = self.dec.index(self.width);
        self.scope.swap(&path, a, b);
      },
      Opcode::MoveUp
      | Opcode::MoveDown
      | Opcode::MoveTop
      | Opcode::MoveBottom
      | Opcode::MoveTo => self.rotate(),
      Opcode::Select
      | Opcode::SelectMany
      | Opcode::Deselect
      | Opcode::DeselectMany
      | Opcode::Toggle
      | Opcode::ToggleMany
      | Opcode::SelectAll
      | Opcode::ClearSelections
      | Opcode::SortSelection
      | Opcode::SortSelectionDescending => self.selection(opcode),
    }
  }

  fn path(&self) -> Path {
    path::resolve(&self.route, &*self.scope.tree)
      .unwrap_or_else(|err| panic!("cannot replay at {}: {err}", self.route))
  }

  fn targets(&self) -> Vec<Path> {
    path::expand(&self.route, &*self.scope.tree, &*self.scope.selections)
      .unwrap_or_else(|err| panic!("cannot replay at {}: {err}", self.route))
  }

  /// Replay one `[new] old snapshot` record per target. `shared` is the new
  /// value when it was written once for all targets instead of per record.
  fn replace_each(&mut self, targets: &[Path], width: IndexWidth, shared: Option<Box<dyn Node>>) {
    let Some(first) = targets.first() else {
      return;
    };
    let per_record = shared.is_none();
    let node = self.scope.node(first);
    let records: Vec<Decoder<'b>> = targets
      .iter()
      .map(|_| {
        let start = self.dec.clone();
        if per_record {
          node.skip_dyn(&mut self.dec, width);
        }
        node.skip_dyn(&mut self.dec, width);
        Snapshot::decode(&mut self.dec);
        start
      })
      .collect();

    if self.undo {
      for (path, mut dec) in targets.iter().zip(records).rev() {
        let node = self.scope.node(path);
        if per_record {
          node.skip_dyn(&mut dec, width);
        }
        let mut old = node.decode_dyn(&mut dec, width);
        let snapshot = Snapshot::decode(&mut dec);
        self.scope.replace(path, old.as_mut(), Some(snapshot));
      }
    } else {
      for (path, mut dec) in targets.iter().zip(records) {
        let mut new = match &shared {
          Some(value) => value.boxed(),
          None => self.scope.node(path).decode_dyn(&mut dec, width),
        };
        self.scope.replace(path, new.as_mut(), None);
      }
    }
  }

  fn assign(&mut self, with_element: bool) {
    let path = self.path();
    let len = self.dec.index(self.width);
    let mut value = self.scope.node(&path).default_boxed();
    let growable = value
      .as_seq_mut()
      .and_then(|seq| seq.growable())
      .unwrap_or_else(|| panic!("{path} is not a growable array"));
    if with_element {
      growable.assign_decoded(len, &mut self.dec);
    } else {
      growable.assign_default(len);
    }
    self.replace_each(&[path], self.width, Some(value));
  }

  fn len(&self, path: &Path) -> usize {
    self
      .scope
      .node(path)
      .as_seq()
      .map_or(0, |seq| seq.len())
  }

  fn append(&mut self, count: usize) {
    let path = self.path();
    let len = self.len(&path);
    if self.undo {
      for index in (len - count..len).rev() {
        self.scope.remove(&path, index);
      }
    } else {
      let growable = self.scope.growable(&path);
      for _ in 0..count {
        growable.push_decoded(&mut self.dec);
      }
      self.scope.added(&path, len..len + count);
    }
  }

  fn insert(&mut self, many: bool) {
    let path = self.path();
    let at = self.dec.index(self.width);
    let count = if many {
      self.dec.index(self.width)
    } else {
      1
    };
    if self.undo {
      for index in (at..at + count).rev() {
        self.scope.remove(&path, index);
      }
    } else {
      let growable = self.scope.growable(&path);
      for offset in 0..count {
        growable.insert_decoded(at + offset, &mut self.dec);
      }
      self.scope.selections.insert_shift(&path, at, count);
      self.scope.added(&path, at..at + count);
    }
  }

  /// Replay `count` records of `index element removal`, logged high to low.
  fn remove(&mut self, count: usize) {
    let path = self.path();
    let width = self.width;
    let probe = self
      .scope
      .node(&path)
      .as_seq()
      .map(|seq| seq.probe())
      .unwrap_or_else(|| panic!("{path} is not an array"));
    let records: Vec<Decoder<'b>> = (0..count)
      .map(|_| {
        let start = self.dec.clone();
        self.dec.index(width);
        probe.skip_dyn(&mut self.dec, IndexWidth::DEFAULT);
        Removal::decode(&mut self.dec, width);
        start
      })
      .collect();

    if self.undo {
      for mut dec in records.into_iter().rev() {
        let index = dec.index(width);
        self.scope.growable(&path).insert_decoded(index, &mut dec);
        let removal = Removal::decode(&mut dec, width);
        self.scope.selections.restore_index(&path, index, removal);
        self.scope.added(&path, index..index + 1);
      }
    } else {
      for mut dec in records {
        let index = dec.index(width);
        self.scope.remove(&path, index);
      }
    }
  }

  fn rotate(&mut self) {
    let path = self.path();
    let count = self.dec.varint() as usize;
    let script: Vec<Rotation> = (0..count)
      .map(|_| {
        let start = self.dec.index(self.width);
        let mid = self.dec.index(self.width);
        let end = self.dec.index(self.width);
        Rotation::new(start, mid, end)
      })
      .collect();
    if self.undo {
      for rotation in script.into_iter().rev() {
        self.scope.rotate(&path, rotation.inverse());
      }
    } else {
      for rotation in script {
        self.scope.rotate(&path, rotation);
      }
    }
  }

  fn selection(&mut self, opcode: Opcode) {
    let path = self.path();
    let width = self.width;
    let len = self.len(&path);
    let undo = self.undo;
    let dec = &mut self.dec;
    let selections = &mut *self.scope.selections;

    match opcode {
      Opcode::Select | Opcode::SelectMany => {
        let indices = if opcode == Opcode::Select {
          vec![dec.index(width)]
        } else {
          dec.indices(width)
        };
        for index in indices {
          if undo {
            selections.pop(&path);
          } else {
            selections.push(&path, index);
          }
        }
      },
      Opcode::Deselect | Opcode::DeselectMany => {
        let count = if opcode == Opcode::Deselect {
          1
        } else {
          dec.index(width)
        };
        let records: Vec<(usize, usize)> = (0..count)
          .map(|_| (dec.index(width), dec.index(width)))
          .collect();
        if undo {
          for (index, position) in records.into_iter().rev() {
            selections.reinsert(&path, position, index);
          }
        } else {
          for (_, position) in records {
            selections.take(&path, position);
          }
        }
      },
      Opcode::Toggle | Opcode::ToggleMany => {
        let count = if opcode == Opcode::Toggle {
          1
        } else {
          dec.index(width)
        };
        let records: Vec<(usize, Option<usize>)> = (0..count)
          .map(|_| {
            let index = dec.index(width);
            let position = dec.flag().then(|| dec.index(width));
            (index, position)
          })
          .collect();
        if undo {
          for (index, position) in records.into_iter().rev() {
            match position {
              Some(position) => selections.reinsert(&path, position, index),
              None => {
                selections.pop(&path);
              },
            }
          }
        } else {
          for (index, position) in records {
            match position {
              Some(position) => {
                selections.take(&path, position);
              },
              None => selections.push(&path, index),
            }
          }
        }
      },
      Opcode::SelectAll | Opcode::ClearSelections => {
        let previous = dec.indices(width);
        let list = if undo {
          previous
        } else if opcode == Opcode::SelectAll {
          (0..len).collect()
        } else {
          Vec::new()
        };
        selections.replace(&path, list);
      },
      Opcode::SortSelection | Opcode::SortSelectionDescending => {
        let mut order = dec.indices(width);
        if undo {
          order = moves::invert_permutation(&order);
        }
        selections.permute_list(&path, &order);
      },
      _ => unreachable!("{opcode} does not edit selections"),
    }

    self.scope.selection_changed(&path);
  }
}
