//! Live edits.
//!
//! Every public method here is one edit of the tree or of its selections. The
//! pattern is always the same:
//!
//! 1. open an implicit action (joining the caller's, if one is open);
//! 2. encode the route and validate everything the edit needs: shape, element
//!    type, bounds, index widths and selection state. A failure returns before anything is
//!    touched, so the tree, the selections and the log stay unchanged;
//! 3. write the opcode and payload while applying the change, mirroring it
//!    onto the selections and notifying the observer;
//! 4. commit the event.
//!
//! Edits that would change nothing (an empty index list, an already sorted
//! array, a move blocked at an end) record no event at all.

use std::any::type_name;

use paste::paste;

use crate::{
  codec::{
    Encoder,
    IndexWidth,
  },
  editor::{
    EditError,
    Editor,
    Result,
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
    Seq,
    Value,
  },
};

/// Compound assignment operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compound {
  Add,
  Sub,
  Mul,
  Div,
  Rem,
  Xor,
  And,
  Or,
}

/// Values that support [`Editor::compound`].
///
/// Returns `None` when the operation is undefined for the operands, e.g.
/// integer division by zero or a bitwise operation on floats.
pub trait Arithmetic: Value {
  fn compound(&self, op: Compound, rhs: &Self) -> Option<Self>;
}

macro_rules! integer_arithmetic {
  ($($ty:ty),* $(,)?) => {
    $(
      impl Arithmetic for $ty {
        fn compound(&self, op: Compound, rhs: &Self) -> Option<Self> {
          let (lhs, rhs) = (*self, *rhs);
          match op {
            Compound::Add => Some(lhs.wrapping_add(rhs)),
            Compound::Sub => Some(lhs.wrapping_sub(rhs)),
            Compound::Mul => Some(lhs.wrapping_mul(rhs)),
            Compound::Div => lhs.checked_div(rhs),
            Compound::Rem => lhs.checked_rem(rhs),
            Compound::Xor => Some(lhs ^ rhs),
            Compound::And => Some(lhs & rhs),
            Compound::Or => Some(lhs | rhs),
          }
        }
      }
    )*
  };
}

integer_arithmetic!(u8, i8, u16, i16, u32, i32, u64, i64, u128, i128, usize, isize);

macro_rules! float_arithmetic {
  ($($ty:ty),* $(,)?) => {
    $(
      impl Arithmetic for $ty {
        fn compound(&self, op: Compound, rhs: &Self) -> Option<Self> {
          match op {
            Compound::Add => Some(self + rhs),
            Compound::Sub => Some(self - rhs),
            Compound::Mul => Some(self * rhs),
            Compound::Div => Some(self / rhs),
            Compound::Rem => Some(self % rhs),
            Compound::Xor | Compound::And | Compound::Or => None,
          }
        }
      }
    )*
  };
}

float_arithmetic!(f32, f64);

impl Arithmetic for bool {
  fn compound(&self, op: Compound, rhs: &Self) -> Option<Self> {
    match op {
      Compound::Xor => Some(self ^ rhs),
      Compound::And => Some(self & rhs),
      Compound::Or => Some(self | rhs),
      _ => None,
    }
  }
}

/// Which elements of an array an edit applies to.
#[derive(Debug, Clone, Copy)]
enum Pick<'a> {
  One(usize),
  Many(&'a [usize]),
  Selected,
}

#[derive(Debug, Clone, Copy)]
enum Motion {
  Up,
  Down,
  Top,
  Bottom,
  To(usize),
}

impl Motion {
  fn opcode(self) -> Opcode {
    match self {
      Motion::Up => Opcode::MoveUp,
      Motion::Down => Opcode::MoveDown,
      Motion::Top => Opcode::MoveTop,
      Motion::Bottom => Opcode::MoveBottom,
      Motion::To(_) => Opcode::MoveTo,
    }
  }

  fn plan(self, len: usize, indices: &[usize]) -> Vec<Rotation> {
    match self {
      Motion::Up => moves::plan_move_up(indices),
      Motion::Down => moves::plan_move_down(len, indices),
      Motion::Top => moves::plan_move_to(len, indices, 0),
      Motion::Bottom => moves::plan_move_to(len, indices, len),
      Motion::To(target) => moves::plan_move_to(len, indices, target),
    }
  }
}

/// A resolved single-node edit: its path and the event under construction.
struct Target {
  path:  Path,
  width: IndexWidth,
  event: Encoder,
}

macro_rules! compound_shorthands {
  ($($op:ident),* $(,)?) => {
    paste! {
      $(
        #[doc = "Shorthand for [`Editor::compound`] with [`Compound::" $op "`]."]
        pub fn [<$op:lower _assign>]<V: Arithmetic>(&mut self, route: &Route, rhs: V) -> Result<()> {
          self.compound(route, Compound::$op, rhs)
        }
      )*
    }
  };
}

macro_rules! motions {
  ($($name:ident => $motion:expr),* $(,)?) => {
    paste! {
      $(
        pub fn $name(&mut self, route: &Route, index: usize) -> Result<()> {
          self.move_picked(route, Pick::One(index), $motion)
        }

        pub fn [<$name _many>](&mut self, route: &Route, indices: &[usize]) -> Result<()> {
          self.move_picked(route, Pick::Many(indices), $motion)
        }

        pub fn [<$name _selected>](&mut self, route: &Route) -> Result<()> {
          self.move_picked(route, Pick::Selected, $motion)
        }
      )*
    }
  };
}

fn check_index(path: &Path, index: usize, len: usize) -> Result<()> {
  if index >= len {
    return Err(EditError::IndexOutOfBounds {
      path: path.clone(),
      index,
      len,
    });
  }
  Ok(())
}

/// A count, index or length logged for `path` must fit its width.
fn check_width(path: &Path, len: usize, width: IndexWidth) -> Result<()> {
  if !width.fits(len) {
    return Err(EditError::Overflow {
      path: path.clone(),
      len,
    });
  }
  Ok(())
}

/// Every count and length inside `value` must fit when it is logged at
/// `width`.
fn check_value(path: &Path, value: &dyn Node, width: IndexWidth) -> Result<()> {
  match value.overflow_dyn(width) {
    Some(len) => {
      Err(EditError::Overflow {
        path: path.clone(),
        len,
      })
    },
    None => Ok(()),
  }
}

// Lookups and validation.
impl<T: Value, O: Observer<T>> Editor<T, O> {
  fn target(&self, route: &Route) -> Result<Target> {
    if route.has_selection() {
      return Err(EditError::SelectionRoute(route.clone()));
    }
    let mut event = Encoder::new();
    let width = path::encode(route, &self.tree, &mut event)?;
    let path = path::resolve(route, &self.tree)?;
    Ok(Target { path, width, event })
  }

  /// The node at a path that was just resolved.
  fn node_at(&self, path: &Path) -> &dyn Node {
    path::node_at(&self.tree, path).unwrap_or_else(|| panic!("no node at {path}"))
  }

  fn value_at<V: Value>(&self, path: &Path) -> Result<&V> {
    let node = self.node_at(path);
    node
      .downcast_ref::<V>()
      .ok_or_else(|| EditError::TypeMismatch {
        path:     path.clone(),
        expected: type_name::<V>(),
        found:    node.type_name(),
      })
  }

  fn seq_at(&self, path: &Path) -> Result<&dyn Seq> {
    self
      .node_at(path)
      .as_seq()
      .ok_or_else(|| EditError::NotAnArray { path: path.clone() })
  }

  /// Length of the array at `path`, which must be able to grow and shrink.
  fn growable_len(&self, path: &Path) -> Result<usize> {
    let seq = self.seq_at(path)?;
    if seq.fixed_len().is_some() {
      return Err(EditError::FixedLength { path: path.clone() });
    }
    Ok(seq.len())
  }

  /// Length of the array at `path`, which must be a `Vec<V>`.
  fn vec_len<V: Value>(&self, path: &Path) -> Result<usize> {
    let len = self.growable_len(path)?;
    self.value_at::<Vec<V>>(path)?;
    Ok(len)
  }

  /// The array at `path`, whose elements must be `V`.
  fn elements_of<V: Value>(&self, path: &Path) -> Result<&dyn Seq> {
    let seq = self.seq_at(path)?;
    let probe = seq.probe();
    if !probe.is::<V>() {
      return Err(EditError::TypeMismatch {
        path:     path.clone(),
        expected: type_name::<V>(),
        found:    probe.type_name(),
      });
    }
    Ok(seq)
  }

  /// Sorted, unique, bounds-checked indices for `pick`.
  fn pick(&self, path: &Path, len: usize, pick: Pick<'_>) -> Result<Vec<usize>> {
    let mut indices = match pick {
      Pick::One(index) => vec![index],
      Pick::Many(indices) => indices.to_vec(),
      Pick::Selected => self.selections.get(path).to_vec(),
    };
    indices.sort_unstable();
    indices.dedup();
    for &index in &indices {
      check_index(path, index, len)?;
    }
    Ok(indices)
  }
}

// Whole-value edits.
impl<T: Value, O: Observer<T>> Editor<T, O> {
  /// Restore the node at `route` to its type's default value.
  pub fn reset(&mut self, route: &Route) -> Result<()> {
    self.with_action(|editor| {
      let Target {
        path,
        width,
        mut event,
      } = editor.target(route)?;
      check_value(&path, editor.node_at(&path), width)?;
      event.u8(Opcode::Reset as u8);

      let mut scope = editor.scope();
      let snapshot = scope.selections.subtree(&path);
      let mut old = scope.node(&path).default_boxed();
      scope.replace(&path, old.as_mut(), None);
      old.encode_dyn(&mut event, width);
      snapshot.encode(&mut event);

      editor.commit(Opcode::Reset, event);
      Ok(())
    })
  }

  /// Replace the node at `route` with `value`.
  ///
  /// A route with a selection step sets every selected target to the same
  /// value and is logged once, as a family.
  pub fn set<V: Value>(&mut self, route: &Route, value: V) -> Result<()> {
    self.with_action(|editor| {
      let mut event = Encoder::new();
      let width = path::encode(route, &editor.tree, &mut event)?;
      let targets = path::expand(route, &editor.tree, &editor.selections)?;
      for path in &targets {
        editor.value_at::<V>(path)?;
        check_value(path, &value, width)?;
        check_value(path, editor.node_at(path), width)?;
      }
      if targets.is_empty() {
        return Ok(());
      }

      if route.has_selection() {
        event.u8(Opcode::SetFamily as u8);
        value.encode(&mut event, width);
        let values = std::iter::repeat_n(value, targets.len());
        editor.write_sets(Opcode::SetFamily, event, width, &targets, values);
      } else {
        event.u8(Opcode::Set as u8);
        editor.write_sets(Opcode::Set, event, width, &targets, std::iter::once(value));
      }
      Ok(())
    })
  }

  /// Set every selected element of the array at `route` to `value`.
  pub fn set_selected<V: Value>(&mut self, route: &Route, value: V) -> Result<()> {
    self.set(&route.clone().selected(), value)
  }

  /// Set the elements at `indices` of the array at `route` to `value`.
  pub fn set_many<V: Value>(&mut self, route: &Route, indices: &[usize], value: V) -> Result<()> {
    self.with_action(|editor| {
      let Target {
        path,
        width,
        mut event,
      } = editor.target(route)?;
      let len = editor.elements_of::<V>(&path)?.len();
      check_width(&path, len, width)?;
      check_width(&path, indices.len(), width)?;
      check_value(&path, &value, IndexWidth::DEFAULT)?;
      for &index in indices {
        check_index(&path, index, len)?;
        let element = path.child(index);
        check_value(&element, editor.node_at(&element), IndexWidth::DEFAULT)?;
      }
      if indices.is_empty() {
        return Ok(());
      }

      event.u8(Opcode::SetMany as u8);
      event.indices(indices, width);
      value.encode(&mut event, IndexWidth::DEFAULT);
      let targets: Vec<Path> = indices.iter().map(|&index| path.child(index)).collect();
      let values = std::iter::repeat_n(value, targets.len());
      editor.write_sets(Opcode::SetMany, event, IndexWidth::DEFAULT, &targets, values);
      Ok(())
    })
  }

  /// Combine the value at `route` with `rhs` in place (`+=`, `-=`, ...).
  ///
  /// With a selection step every selected target is combined. The edit is
  /// logged as a plain set, so undo does not need to invert the operator.
  pub fn compound<V: Arithmetic>(&mut self, route: &Route, op: Compound, rhs: V) -> Result<()> {
    self.with_action(|editor| {
      let mut event = Encoder::new();
      let width = path::encode(route, &editor.tree, &mut event)?;
      let targets = path::expand(route, &editor.tree, &editor.selections)?;
      let values = targets
        .iter()
        .map(|path| {
          let old = editor.value_at::<V>(path)?;
          let new = old
            .compound(op, &rhs)
            .ok_or_else(|| EditError::Arithmetic {
              path: path.clone(),
              op,
            })?;
          check_value(path, old, width)?;
          check_value(path, &new, width)?;
          Ok(new)
        })
        .collect::<Result<Vec<V>>>()?;
      if targets.is_empty() {
        return Ok(());
      }

      event.u8(Opcode::Set as u8);
      editor.write_sets(Opcode::Set, event, width, &targets, values);
      Ok(())
    })
  }

  compound_shorthands!(Add, Sub, Mul, Div, Rem, Xor, And, Or);

  /// Swap each value into its target and finish the event. A plain set writes
  /// the new value in every record; families and `SetMany` wrote it once up
  /// front.
  fn write_sets<V: Value>(
    &mut self,
    opcode: Opcode,
    mut event: Encoder,
    width: IndexWidth,
    targets: &[Path],
    values: impl IntoIterator<Item = V>,
  ) {
    let mut scope = self.scope();
    for (path, value) in targets.iter().zip(values) {
      if opcode == Opcode::Set {
        value.encode(&mut event, width);
      }
      let snapshot = scope.selections.subtree(path);
      let mut old: Box<dyn Node> = Box::new(value);
      scope.replace(path, old.as_mut(), None);
      old.encode_dyn(&mut event, width);
      snapshot.encode(&mut event);
    }
    self.commit(opcode, event);
  }

  /// Replace the array at `route` with `len` copies of `value`.
  pub fn assign<V: Value>(&mut self, route: &Route, len: usize, value: V) -> Result<()> {
    self.with_action(|editor| {
      let Target {
        path,
        width,
        mut event,
      } = editor.target(route)?;
      editor.vec_len::<V>(&path)?;
      check_width(&path, len, width)?;
      check_value(&path, &value, IndexWidth::DEFAULT)?;
      check_value(&path, editor.node_at(&path), width)?;

      event.u8(Opcode::Assign as u8);
      event.index(len, width);
      value.encode(&mut event, IndexWidth::DEFAULT);
      let mut old: Box<dyn Node> = Box::new(vec![value; len]);
      editor.write_replace(Opcode::Assign, event, width, &path, old.as_mut());
      Ok(())
    })
  }

  /// Replace the array at `route` with `len` default elements.
  pub fn assign_default(&mut self, route: &Route, len: usize) -> Result<()> {
    self.with_action(|editor| {
      let Target {
        path,
        width,
        mut event,
      } = editor.target(route)?;
      editor.growable_len(&path)?;
      check_width(&path, len, width)?;
      check_value(&path, editor.node_at(&path), width)?;

      event.u8(Opcode::AssignDefault as u8);
      event.index(len, width);
      let mut old = editor.node_at(&path).default_boxed();
      if let Some(growable) = old.as_seq_mut().and_then(|seq| seq.growable()) {
        growable.assign_default(len);
      }
      editor.write_replace(Opcode::AssignDefault, event, width, &path, old.as_mut());
      Ok(())
    })
  }

  fn write_replace(
    &mut self,
    opcode: Opcode,
    mut event: Encoder,
    width: IndexWidth,
    path: &Path,
    value: &mut dyn Node,
  ) {
    let mut scope = self.scope();
    let snapshot = scope.selections.subtree(path);
    scope.replace(path, value, None);
    value.encode_dyn(&mut event, width);
    snapshot.encode(&mut event);
    self.commit(opcode, event);
  }
}

// Capacity.
impl<T: Value, O: Observer<T>> Editor<T, O> {
  /// Make room for at least `capacity` elements in total.
  pub fn reserve(&mut self, route: &Route, capacity: usize) -> Result<()> {
    self.with_action(|editor| {
      let Target {
        path, mut event, ..
      } = editor.target(route)?;
      editor.growable_len(&path)?;
      let current = editor.seq_at(&path)?.capacity();
      if capacity <= current {
        return Ok(());
      }

      event.u8(Opcode::Reserve as u8);
      event.varint(capacity as u64);
      event.varint(current as u64);
      editor.scope().growable(&path).reserve(capacity);
      editor.commit(Opcode::Reserve, event);
      Ok(())
    })
  }

  /// Release unused capacity.
  pub fn trim(&mut self, route: &Route) -> Result<()> {
    self.with_action(|editor| {
      let Target {
        path, mut event, ..
      } = editor.target(route)?;
      let len = editor.growable_len(&path)?;
      let current = editor.seq_at(&path)?.capacity();
      if current == len {
        return Ok(());
      }

      event.u8(Opcode::Trim as u8);
      event.varint(current as u64);
      editor.scope().growable(&path).shrink_to(0);
      editor.commit(Opcode::Trim, event);
      Ok(())
    })
  }
}

// Growth and shrinkage.
impl<T: Value, O: Observer<T>> Editor<T, O> {
  pub fn append<V: Value>(&mut self, route: &Route, value: V) -> Result<()> {
    self.with_action(|editor| {
      let Target {
        path,
        width,
        mut event,
      } = editor.target(route)?;
      let len = editor.vec_len::<V>(&path)?;
      check_width(&path, len + 1, width)?;
      check_value(&path, &value, IndexWidth::DEFAULT)?;

      event.u8(Opcode::Append as u8);
      value.encode(&mut event, IndexWidth::DEFAULT);
      let mut scope = editor.scope();
      scope.vec_mut::<V>(&path).push(value);
      scope.added(&path, len..len + 1);
      editor.commit(Opcode::Append, event);
      Ok(())
    })
  }

  pub fn append_many<V: Value>(
    &mut self,
    route: &Route,
    values: impl IntoIterator<Item = V>,
  ) -> Result<()> {
    let values: Vec<V> = values.into_iter().collect();
    self.with_action(|editor| {
      let Target {
        path,
        width,
        mut event,
      } = editor.target(route)?;
      let len = editor.vec_len::<V>(&path)?;
      check_width(&path, len + values.len(), width)?;
      for value in &values {
        check_value(&path, value, IndexWidth::DEFAULT)?;
      }
      if values.is_empty() {
        return Ok(());
      }

      event.u8(Opcode::AppendMany as u8);
      event.index(values.len(), width);
      for value in &values {
        value.encode(&mut event, IndexWidth::DEFAULT);
      }
      let count = values.len();
      let mut scope = editor.scope();
      scope.vec_mut::<V>(&path).extend(values);
      scope.added(&path, len..len + count);
      editor.commit(Opcode::AppendMany, event);
      Ok(())
    })
  }

  /// Insert `value` before the element at `index` (`index == len` appends).
  pub fn insert<V: Value>(&mut self, route: &Route, index: usize, value: V) -> Result<()> {
    self.insert_many(route, index, [value])
  }

  pub fn insert_many<V: Value>(
    &mut self,
    route: &Route,
    index: usize,
    values: impl IntoIterator<Item = V>,
  ) -> Result<()> {
    let values: Vec<V> = values.into_iter().collect();
    self.with_action(|editor| {
      let Target {
        path,
        width,
        mut event,
      } = editor.target(route)?;
      let len = editor.vec_len::<V>(&path)?;
      check_index(&path, index, len + 1)?;
      check_width(&path, len + values.len(), width)?;
      for value in &values {
        check_value(&path, value, IndexWidth::DEFAULT)?;
      }
      if values.is_empty() {
        return Ok(());
      }

      let count = values.len();
      let opcode = if count == 1 {
        Opcode::Insert
      } else {
        Opcode::InsertMany
      };
      event.u8(opcode as u8);
      event.index(index, width);
      if opcode == Opcode::InsertMany {
        event.index(count, width);
      }
      for value in &values {
        value.encode(&mut event, IndexWidth::DEFAULT);
      }

      let mut scope = editor.scope();
      scope.vec_mut::<V>(&path).splice(index..index, values);
      scope.selections.insert_shift(&path, index, count);
      scope.added(&path, index..index + count);
      editor.commit(opcode, event);
      Ok(())
    })
  }

  pub fn remove(&mut self, route: &Route, index: usize) -> Result<()> {
    self.remove_picked(route, Pick::One(index), Opcode::Remove)
  }

  /// Remove the elements at `indices`, in any order. Duplicates count once.
  pub fn remove_many(&mut self, route: &Route, indices: &[usize]) -> Result<()> {
    self.remove_picked(route, Pick::Many(indices), Opcode::RemoveMany)
  }

  pub fn remove_selected(&mut self, route: &Route) -> Result<()> {
    self.remove_picked(route, Pick::Selected, Opcode::RemoveSelected)
  }

  fn remove_picked(&mut self, route: &Route, pick: Pick<'_>, opcode: Opcode) -> Result<()> {
    self.with_action(|editor| {
      let Target {
        path,
        width,
        mut event,
      } = editor.target(route)?;
      let len = editor.growable_len(&path)?;
      check_width(&path, len, width)?;
      let indices = editor.pick(&path, len, pick)?;
      for &index in &indices {
        let element = path.child(index);
        check_value(&element, editor.node_at(&element), IndexWidth::DEFAULT)?;
      }
      if indices.is_empty() {
        return Ok(());
      }

      event.u8(opcode as u8);
      if opcode != Opcode::Remove {
        event.index(indices.len(), width);
      }
      let mut scope = editor.scope();
      for &index in indices.iter().rev() {
        event.index(index, width);
        scope.seq_mut(&path).encode_element(index, &mut event);
        scope.remove(&path, index).encode(&mut event, width);
      }
      editor.commit(opcode, event);
      Ok(())
    })
  }
}

// Reordering.
impl<T: Value, O: Observer<T>> Editor<T, O> {
  /// Stable ascending sort of the array at `route`.
  pub fn sort<V: Value + Ord>(&mut self, route: &Route) -> Result<()> {
    self.sort_elements::<V>(route, false)
  }

  /// Stable descending sort of the array at `route`.
  pub fn sort_descending<V: Value + Ord>(&mut self, route: &Route) -> Result<()> {
    self.sort_elements::<V>(route, true)
  }

  fn sort_elements<V: Value + Ord>(&mut self, route: &Route, descending: bool) -> Result<()> {
    self.with_action(|editor| {
      let Target {
        path,
        width,
        mut event,
      } = editor.target(route)?;
      let seq = editor.elements_of::<V>(&path)?;
      check_width(&path, seq.len(), width)?;
      let elements: Vec<&V> = (0..seq.len())
        .filter_map(|index| seq.element(index)?.downcast_ref::<V>())
        .collect();
      let mut order: Vec<usize> = (0..elements.len()).collect();
      if descending {
        order.sort_by(|&a, &b| elements[b].cmp(elements[a]));
      } else {
        order.sort_by(|&a, &b| elements[a].cmp(elements[b]));
      }
      if moves::is_identity(&order) {
        return Ok(());
      }

      let opcode = if descending {
        Opcode::SortDescending
      } else {
        Opcode::Sort
      };
      event.u8(opcode as u8);
      event.indices(&order, width);
      editor.scope().permute(&path, &order);
      editor.commit(opcode, event);
      Ok(())
    })
  }

  pub fn swap(&mut self, route: &Route, a: usize, b: usize) -> Result<()> {
    self.with_action(|editor| {
      let Target {
        path,
        width,
        mut event,
      } = editor.target(route)?;
      let len = editor.seq_at(&path)?.len();
      check_width(&path, len, width)?;
      check_index(&path, a, len)?;
      check_index(&path, b, len)?;
      if a == b {
        return Ok(());
      }

      event.u8(Opcode::Swap as u8);
      event.index(a, width);
      event.index(b, width);
      editor.scope().swap(&path, a, b);
      editor.commit(Opcode::Swap, event);
      Ok(())
    })
  }

  motions! {
    move_up => Motion::Up,
    move_down => Motion::Down,
    move_top => Motion::Top,
    move_bottom => Motion::Bottom,
  }

  /// Move the element at `index` so that it ends up at `target`.
  pub fn move_to(&mut self, route: &Route, index: usize, target: usize) -> Result<()> {
    self.move_picked(route, Pick::One(index), Motion::To(target))
  }

  /// Move the elements at `indices` so that they occupy `target..target + k`
  /// in their original relative order. `target` is clamped to `len - k`.
  pub fn move_to_many(&mut self, route: &Route, indices: &[usize], target: usize) -> Result<()> {
    self.move_picked(route, Pick::Many(indices), Motion::To(target))
  }

  pub fn move_to_selected(&mut self, route: &Route, target: usize) -> Result<()> {
    self.move_picked(route, Pick::Selected, Motion::To(target))
  }

  fn move_picked(&mut self, route: &Route, pick: Pick<'_>, motion: Motion) -> Result<()> {
    self.with_action(|editor| {
      let Target {
        path,
        width,
        mut event,
      } = editor.target(route)?;
      let len = editor.seq_at(&path)?.len();
      check_width(&path, len, width)?;
      let indices = editor.pick(&path, len, pick)?;
      let script = motion.plan(len, &indices);
      if script.is_empty() {
        return Ok(());
      }

      let opcode = motion.opcode();
      event.u8(opcode as u8);
      event.varint(script.len() as u64);
      let mut scope = editor.scope();
      for &rotation in &script {
        event.index(rotation.start, width);
        event.index(rotation.mid, width);
        event.index(rotation.end, width);
        scope.rotate(&path, rotation);
      }
      editor.commit(opcode, event);
      Ok(())
    })
  }
}

// Selections.
impl<T: Value, O: Observer<T>> Editor<T, O> {
  /// Run a selection edit on the array at `route`. `edit` validates and applies
  /// the change and writes the payload; it returns `false` for a no-op.
  fn edit_selection(
    &mut self,
    route: &Route,
    opcode: Opcode,
    edit: impl FnOnce(&mut Self, &Path, usize, IndexWidth, &mut Encoder) -> Result<bool>,
  ) -> Result<()> {
    self.with_action(|editor| {
      let Target {
        path,
        width,
        mut event,
      } = editor.target(route)?;
      let len = editor.seq_at(&path)?.len();
      check_width(&path, len, width)?;
      event.u8(opcode as u8);
      if !edit(editor, &path, len, width, &mut event)? {
        return Ok(());
      }
      editor.scope().selection_changed(&path);
      editor.commit(opcode, event);
      Ok(())
    })
  }

  pub fn select(&mut self, route: &Route, index: usize) -> Result<()> {
    self.edit_selection(route, Opcode::Select, |editor, path, len, width, event| {
      editor.selections.select(path, len, index)?;
      event.index(index, width);
      Ok(true)
    })
  }

  pub fn select_many(&mut self, route: &Route, indices: &[usize]) -> Result<()> {
    self.edit_selection(route, Opcode::SelectMany, |editor, path, len, width, event| {
      check_width(path, indices.len(), width)?;
      editor.selections.select_many(path, len, indices)?;
      event.indices(indices, width);
      Ok(!indices.is_empty())
    })
  }

  pub fn deselect(&mut self, route: &Route, index: usize) -> Result<()> {
    self.edit_selection(route, Opcode::Deselect, |editor, path, _, width, event| {
      let position = editor.selections.deselect(path, index)?;
      event.index(index, width);
      event.index(position, width);
      Ok(true)
    })
  }

  pub fn deselect_many(&mut self, route: &Route, indices: &[usize]) -> Result<()> {
    self.edit_selection(route, Opcode::DeselectMany, |editor, path, _, width, event| {
      check_width(path, indices.len(), width)?;
      let positions = editor.selections.deselect_many(path, indices)?;
      event.index(indices.len(), width);
      for (&index, position) in indices.iter().zip(positions) {
        event.index(index, width);
        event.index(position, width);
      }
      Ok(!indices.is_empty())
    })
  }

  pub fn toggle(&mut self, route: &Route, index: usize) -> Result<()> {
    self.toggle_many(route, &[index])
  }

  /// Toggle each index in turn. An index listed twice ends up unchanged.
  pub fn toggle_many(&mut self, route: &Route, indices: &[usize]) -> Result<()> {
    let opcode = if indices.len() == 1 {
      Opcode::Toggle
    } else {
      Opcode::ToggleMany
    };
    self.edit_selection(route, opcode, |editor, path, len, width, event| {
      check_width(path, indices.len(), width)?;
      for &index in indices {
        check_index(path, index, len)?;
      }
      if opcode == Opcode::ToggleMany {
        event.index(indices.len(), width);
      }
      for &index in indices {
        let position = editor.selections.toggle(path, len, index)?;
        event.index(index, width);
        event.flag(position.is_some());
        if let Some(position) = position {
          event.index(position, width);
        }
      }
      Ok(!indices.is_empty())
    })
  }

  pub fn select_all(&mut self, route: &Route) -> Result<()> {
    self.edit_selection(route, Opcode::SelectAll, |editor, path, len, width, event| {
      let all: Vec<usize> = (0..len).collect();
      if editor.selections.get(path) == all.as_slice() {
        return Ok(false);
      }
      let previous = editor.selections.replace(path, all);
      event.indices(&previous, width);
      Ok(true)
    })
  }

  pub fn clear_selections(&mut self, route: &Route) -> Result<()> {
    self.edit_selection(route, Opcode::ClearSelections, |editor, path, _, width, event| {
      let previous = editor.selections.replace(path, Vec::new());
      event.indices(&previous, width);
      Ok(!previous.is_empty())
    })
  }

  pub fn sort_selection(&mut self, route: &Route) -> Result<()> {
    self.sort_selection_by(route, false)
  }

  pub fn sort_selection_descending(&mut self, route: &Route) -> Result<()> {
    self.sort_selection_by(route, true)
  }

  fn sort_selection_by(&mut self, route: &Route, descending: bool) -> Result<()> {
    let opcode = if descending {
      Opcode::SortSelectionDescending
    } else {
      Opcode::SortSelection
    };
    self.edit_selection(route, opcode, |editor, path, _, width, event| {
      let order = editor.selections.sort(path, descending);
      event.indices(&order, width);
      Ok(!moves::is_identity(&order))
    })
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    observer::{
      Notification,
      Recorder,
    },
    path::PathError,
    selection::SelectionError,
  };

  crate::reflect! {
    #[derive(Debug, Clone, PartialEq)]
    struct Item {
      name:  String,
      count: i64,
      tags:  Vec<u8>,
    }
  }

  crate::reflect! {
    #[derive(Debug, Clone, PartialEq)]
    struct Store {
      title: String,
      ratio: f32,
      slots: [u16; 4],
      items: Vec<Item> => 1000,
      log:   Vec<i32>,
    }
  }

  crate::reflect! {
    #[derive(Debug, Clone, PartialEq)]
    struct Tight {
      name: String => 40,
      tags: Vec<u8> => 10,
    }
  }

  fn item(name: &str, count: i64) -> Item {
    Item {
      name: name.into(),
      count,
      tags: Vec::new(),
    }
  }

  fn store() -> Store {
    Store {
      title: "store".into(),
      ratio: 0.5,
      slots: [4, 3, 2, 1],
      items: vec![item("a", 1), item("b", 2), item("c", 3)],
      log:   vec![5, 1, 4],
    }
  }

  fn items() -> Route {
    Route::root().field(Store::ITEMS)
  }

  fn log() -> Route {
    Route::root().field(Store::LOG)
  }

  fn names(editor: &Editor<Store, impl Observer<Store>>) -> Vec<&str> {
    editor
      .tree()
      .items
      .iter()
      .map(|item| item.name.as_str())
      .collect()
  }

  #[test]
  fn test_failed_edits_leave_no_trace() {
    let mut editor = Editor::new(store());
    let title = Route::root().field(Store::TITLE);

    assert!(matches!(
      editor.set(&title, 5u32),
      Err(EditError::TypeMismatch { .. })
    ));
    assert!(matches!(
      editor.append(&Route::root().field(Store::SLOTS), 1u16),
      Err(EditError::FixedLength { .. })
    ));
    assert!(matches!(
      editor.append(&title, 1u8),
      Err(EditError::NotAnArray { .. })
    ));
    assert!(matches!(
      editor.remove(&items(), 3),
      Err(EditError::IndexOutOfBounds { index: 3, len: 3, .. })
    ));
    assert!(matches!(
      editor.insert(&items().selected(), 0, item("x", 0)),
      Err(EditError::SelectionRoute(_))
    ));
    assert!(matches!(
      editor.set(&Route::root().field(42), 1u8),
      Err(EditError::Path(PathError::NoSuchField { index: 42, .. }))
    ));
    assert!(matches!(
      editor.deselect(&items(), 0),
      Err(EditError::Selection(SelectionError::NotSelected { .. }))
    ));

    assert_eq!(editor.event_count(), 0);
    assert_eq!(editor.tree(), &store());
    assert!(editor.selections().is_empty());
  }

  #[test]
  fn test_width_overflow_is_rejected() {
    let full = Tight {
      name: "t".into(),
      tags: vec![0; 255],
    };
    let mut editor = Editor::new(full.clone());
    let name = Route::root().field(Tight::NAME);
    let tags = Route::root().field(Tight::TAGS);

    assert_eq!(
      editor.append(&tags, 1u8),
      Err(EditError::Overflow {
        path: Path::from([Tight::TAGS]),
        len:  256,
      })
    );
    assert!(matches!(
      editor.insert(&tags, 200, 7u8),
      Err(EditError::Overflow { len: 256, .. })
    ));
    assert!(matches!(
      editor.set(&name, "x".repeat(300)),
      Err(EditError::Overflow { len: 300, .. })
    ));
    assert!(matches!(
      editor.assign(&tags, 300, 1u8),
      Err(EditError::Overflow { len: 300, .. })
    ));
    assert!(matches!(
      editor.toggle_many(&tags, &[0; 256]),
      Err(EditError::Overflow { len: 256, .. })
    ));
    assert_eq!(editor.event_count(), 0);
    assert_eq!(editor.tree(), &full);
    assert!(editor.selections().is_empty());

    editor.set(&name, "x".repeat(255)).unwrap();
    editor.remove(&tags, 254).unwrap();
    editor.append(&tags, 9u8).unwrap();
    while editor.undo() {}
    assert_eq!(editor.tree(), &full);
  }

  #[test]
  fn test_over_long_array_is_left_alone() {
    let long = Tight {
      name: String::new(),
      tags: vec![1; 300],
    };
    let mut editor = Editor::new(long.clone());
    let tags = Route::root().field(Tight::TAGS);

    assert!(matches!(
      editor.remove(&tags, 280),
      Err(EditError::Overflow { len: 300, .. })
    ));
    assert!(matches!(
      editor.insert(&tags, 280, 7u8),
      Err(EditError::Overflow { len: 301, .. })
    ));
    assert!(matches!(
      editor.reset(&tags),
      Err(EditError::Overflow { len: 300, .. })
    ));
    assert!(matches!(
      editor.sort::<u8>(&tags),
      Err(EditError::Overflow { .. })
    ));
    assert_eq!(editor.event_count(), 0);
    assert_eq!(editor.tree(), &long);
  }

  #[test]
  fn test_noops_record_nothing() {
    let mut editor = Editor::new(store());
    editor.remove_many(&items(), &[]).unwrap();
    editor.remove_selected(&items()).unwrap();
    editor.move_up(&items(), 0).unwrap();
    editor.move_down(&items(), 2).unwrap();
    editor.move_to(&items(), 1, 1).unwrap();
    editor.swap(&items(), 1, 1).unwrap();
    editor.sort::<i32>(&Route::root().field(Store::LOG)).unwrap();
    editor.sort::<i32>(&Route::root().field(Store::LOG)).unwrap();
    editor.clear_selections(&items()).unwrap();
    editor.reserve(&items(), 0).unwrap();
    editor.append_many(&log(), Vec::<i32>::new()).unwrap();
    assert_eq!(editor.event_count(), 1, "only the first sort changes anything");
  }

  #[test]
  fn test_set_and_undo() {
    let mut editor = Editor::new(store());
    let name = items().index(1).field(Item::NAME);
    editor.set(&name, String::from("bee")).unwrap();
    assert_eq!(editor.tree().items[1].name, "bee");
    assert!(editor.undo());
    assert_eq!(editor.tree().items[1].name, "b");
    assert!(editor.redo());
    assert_eq!(editor.tree().items[1].name, "bee");
  }

  #[test]
  fn test_set_family() {
    let mut editor = Editor::new(store());
    editor.select_many(&items(), &[2, 0]).unwrap();
    editor
      .set(&items().selected().field(Item::COUNT), 9i64)
      .unwrap();
    let counts: Vec<i64> = editor.tree().items.iter().map(|item| item.count).collect();
    assert_eq!(counts, vec![9, 2, 9]);

    let info = editor.event(1).unwrap();
    assert_eq!(info.opcode, Some(Opcode::SetFamily));

    assert!(editor.undo());
    assert_eq!(editor.tree(), &store());
    assert!(editor.redo());
    assert_eq!(editor.tree().items[2].count, 9);
  }

  #[test]
  fn test_set_selected_whole_elements() {
    let mut editor = Editor::new(store());
    editor.select(&items(), 1).unwrap();
    editor.set_selected(&items(), item("z", 0)).unwrap();
    assert_eq!(names(&editor), vec!["a", "z", "c"]);
    editor.undo();
    assert_eq!(names(&editor), vec!["a", "b", "c"]);
  }

  #[test]
  fn test_set_many() {
    let mut editor = Editor::new(store());
    editor.set_many(&log(), &[0, 2], 7).unwrap();
    assert_eq!(editor.tree().log, vec![7, 1, 7]);
    editor.undo();
    assert_eq!(editor.tree().log, vec![5, 1, 4]);
    editor.redo();
    assert_eq!(editor.tree().log, vec![7, 1, 7]);
  }

  #[test]
  fn test_compound() {
    let mut editor = Editor::new(store());
    let count = items().index(0).field(Item::COUNT);
    editor.add_assign(&count, 10i64).unwrap();
    editor.mul_assign(&count, 3i64).unwrap();
    assert_eq!(editor.tree().items[0].count, 33);

    assert!(matches!(
      editor.div_assign(&count, 0i64),
      Err(EditError::Arithmetic { op: Compound::Div, .. })
    ));
    let ratio = Route::root().field(Store::RATIO);
    assert!(editor.xor_assign(&ratio, 1.0f32).is_err());
    editor.sub_assign(&ratio, 0.25f32).unwrap();
    assert_eq!(editor.tree().ratio, 0.25);

    assert!(editor.undo());
    assert!(editor.undo());
    assert_eq!(editor.tree().items[0].count, 11);
    assert_eq!(editor.event(0).and_then(|info| info.opcode), Some(Opcode::Set));
  }

  #[test]
  fn test_assign_and_reset() {
    let mut editor = Editor::new(store());
    editor.select_many(&log(), &[2, 1]).unwrap();
    editor.assign(&log(), 2, 8).unwrap();
    assert_eq!(editor.tree().log, vec![8, 8]);
    assert_eq!(editor.selection(&log()).unwrap(), &[1]);

    editor.assign_default(&log(), 4).unwrap();
    assert_eq!(editor.tree().log, vec![0; 4]);

    editor.reset(&Route::root()).unwrap();
    assert_eq!(editor.tree(), &Store::default_value());
    assert!(editor.selections().is_empty());

    editor.undo();
    editor.undo();
    editor.undo();
    assert_eq!(editor.tree(), &store());
    assert_eq!(editor.selection(&log()).unwrap(), &[2, 1]);
  }

  #[test]
  fn test_insert_remove_mirror_selections() {
    let mut editor = Editor::new(store());
    editor.select_many(&items(), &[2, 0]).unwrap();
    editor.insert(&items(), 1, item("x", 0)).unwrap();
    assert_eq!(editor.selection(&items()).unwrap(), &[3, 0]);

    editor.remove(&items(), 0).unwrap();
    assert_eq!(names(&editor), vec!["x", "b", "c"]);
    assert_eq!(editor.selection(&items()).unwrap(), &[2]);

    editor.undo();
    assert_eq!(editor.selection(&items()).unwrap(), &[3, 0]);
    editor.undo();
    assert_eq!(editor.selection(&items()).unwrap(), &[2, 0]);
    assert_eq!(editor.tree(), &store());
  }

  #[test]
  fn test_remove_selected() {
    let mut editor = Editor::new(store());
    editor.select_many(&items(), &[0, 2]).unwrap();
    editor.remove_selected(&items()).unwrap();
    assert_eq!(names(&editor), vec!["b"]);
    assert!(editor.selection(&items()).unwrap().is_empty());

    editor.undo();
    assert_eq!(names(&editor), vec!["a", "b", "c"]);
    assert_eq!(editor.selection(&items()).unwrap(), &[0, 2]);
  }

  #[test]
  fn test_append_and_insert_many() {
    let mut editor = Editor::new(store());
    editor.append_many(&log(), [6, 7]).unwrap();
    editor.insert_many(&log(), 1, [0, 0]).unwrap();
    assert_eq!(editor.tree().log, vec![5, 0, 0, 1, 4, 6, 7]);
    editor.undo();
    assert_eq!(editor.tree().log, vec![5, 1, 4, 6, 7]);
    editor.undo();
    assert_eq!(editor.tree().log, vec![5, 1, 4]);
    editor.redo();
    editor.redo();
    assert_eq!(editor.tree().log, vec![5, 0, 0, 1, 4, 6, 7]);
  }

  #[test]
  fn test_sort_descending_and_fixed_arrays() {
    let mut editor = Editor::new(store());
    let slots = Route::root().field(Store::SLOTS);
    editor.select(&slots, 0).unwrap();
    editor.sort::<u16>(&slots).unwrap();
    assert_eq!(editor.tree().slots, [1, 2, 3, 4]);
    assert_eq!(editor.selection(&slots).unwrap(), &[3]);

    editor.sort_descending::<i32>(&log()).unwrap();
    assert_eq!(editor.tree().log, vec![5, 4, 1]);
    assert!(matches!(
      editor.sort::<u8>(&log()),
      Err(EditError::TypeMismatch { .. })
    ));

    editor.undo();
    editor.undo();
    assert_eq!(editor.tree(), &store());
    assert_eq!(editor.selection(&slots).unwrap(), &[0]);
  }

  #[test]
  fn test_moves() {
    let mut editor = Editor::new(store());
    editor.move_bottom(&items(), 0).unwrap();
    assert_eq!(names(&editor), vec!["b", "c", "a"]);
    editor.move_up_many(&items(), &[1, 2]).unwrap();
    assert_eq!(names(&editor), vec!["c", "a", "b"]);
    editor.select(&items(), 0).unwrap();
    editor.move_to_selected(&items(), 1).unwrap();
    assert_eq!(names(&editor), vec!["a", "c", "b"]);
    assert_eq!(editor.selection(&items()).unwrap(), &[1]);

    while editor.undo() {}
    assert_eq!(editor.tree(), &store());
    assert!(editor.selections().is_empty());
  }

  #[test]
  fn test_selection_ops() {
    let mut editor = Editor::new(store());
    editor.toggle_many(&items(), &[2, 1, 2]).unwrap();
    assert_eq!(editor.selection(&items()).unwrap(), &[1]);
    editor.select_all(&items()).unwrap();
    assert_eq!(editor.selection(&items()).unwrap(), &[0, 1, 2]);
    editor.sort_selection_descending(&items()).unwrap();
    assert_eq!(editor.selection(&items()).unwrap(), &[2, 1, 0]);
    editor.deselect_many(&items(), &[1]).unwrap();
    editor.sort_selection(&items()).unwrap();
    assert_eq!(editor.selection(&items()).unwrap(), &[0, 2]);
    editor.clear_selections(&items()).unwrap();

    let mut states = Vec::new();
    while editor.undo() {
      states.push(editor.selection(&items()).unwrap().to_vec());
    }
    assert_eq!(states, vec![
      vec![0, 2],
      vec![2, 0],
      vec![2, 1, 0],
      vec![0, 1, 2],
      vec![1],
      vec![],
    ]);
  }

  #[test]
  fn test_reserve_and_trim() {
    let mut editor = Editor::new(store());
    editor.reserve(&log(), 64).unwrap();
    assert!(editor.tree().log.capacity() >= 64);
    editor.trim(&log()).unwrap();
    assert!(editor.tree().log.capacity() < 64);
    editor.undo();
    assert!(editor.tree().log.capacity() >= 64);
    assert_eq!(editor.tree().log, vec![5, 1, 4]);
  }

  #[test]
  fn test_notifications() {
    let mut editor = Editor::with_observer(store(), Recorder::default());
    editor.append(&log(), 2).unwrap();
    editor.remove(&log(), 0).unwrap();
    editor.select(&log(), 1).unwrap();
    editor.set(&log().index(0), 3).unwrap();
    assert_eq!(editor.observer_mut().take(), vec![
      Notification::ElementAdded {
        path:  Path::from([Store::LOG]),
        index: 3,
      },
      Notification::ElementRemoved {
        path:  Path::from([Store::LOG]),
        index: 0,
      },
      Notification::SelectionsChanged {
        path:      Path::from([Store::LOG]),
        selection: vec![1],
      },
      Notification::ValueChanged {
        path: Path::from([Store::LOG, 0]),
        old:  "1".into(),
        new:  "3".into(),
      },
    ]);

    editor.undo();
    editor.undo();
    assert_eq!(editor.observer_mut().take(), vec![
      Notification::ValueChanged {
        path: Path::from([Store::LOG, 0]),
        old:  "3".into(),
        new:  "1".into(),
      },
      Notification::SelectionsChanged {
        path:      Path::from([Store::LOG]),
        selection: vec![],
      },
    ]);
  }
}
