//! Per-array selection lists.
//!
//! Every array in the tree may carry an ordered list of selected element
//! indices. Lists are keyed by the array's concrete [`Path`] and created on
//! first use. The store keeps them consistent with the tree: every structural
//! edit of an array is mirrored onto its list and onto the lists of arrays
//! nested inside its elements, whose keys contain the element index.
//!
//! # Invariants
//!
//! - Every list holds unique indices, each within its array's bounds.
//! - A list keeps the order in which elements were selected until it is sorted.
//! - Empty lists are never stored, so two stores holding the same selections
//!   compare equal regardless of their history.
//!
//! Mirroring is deterministic and driven purely by the edit, so replaying an
//! edit (or its inverse) reproduces the exact same lists.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::{
  codec::{
    Decoder,
    Encoder,
    IndexWidth,
  },
  moves::{
    self,
    Rotation,
  },
  path::{
    self,
    Path,
  },
  reflect::Node,
};

pub type Result<T> = std::result::Result<T, SelectionError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SelectionError {
  #[error("element {index} of {path} is already selected")]
  AlreadySelected { path: Path, index: usize },
  #[error("element {index} of {path} is not selected")]
  NotSelected { path: Path, index: usize },
  #[error("index {index} is out of bounds for {path} (len: {len})")]
  IndexOutOfBounds { path: Path, index: usize, len: usize },
}

/// Lists captured from a subtree, keyed by absolute path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
  lists: Vec<(Path, Vec<usize>)>,
}

impl Snapshot {
  #[inline]
  pub fn is_empty(&self) -> bool {
    self.lists.is_empty()
  }

  pub fn lists(&self) -> &[(Path, Vec<usize>)] {
    &self.lists
  }

  pub fn encode(&self, enc: &mut Encoder) {
    enc.varint(self.lists.len() as u64);
    for (path, list) in &self.lists {
      enc.varint(path.len() as u64);
      for &step in path.as_slice() {
        enc.varint(step as u64);
      }
      enc.varint(list.len() as u64);
      for &index in list {
        enc.varint(index as u64);
      }
    }
  }

  pub fn decode(dec: &mut Decoder<'_>) -> Self {
    let count = dec.varint() as usize;
    let lists = (0..count)
      .map(|_| {
        let depth = dec.varint() as usize;
        let path = (0..depth).map(|_| dec.varint() as usize).collect();
        let len = dec.varint() as usize;
        let list = (0..len).map(|_| dec.varint() as usize).collect();
        (path, list)
      })
      .collect();
    Self { lists }
  }
}

/// What removing one element did to the selections, enough to put it back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Removal {
  /// Position the element held in its array's list, if it was selected.
  pub position: Option<usize>,
  /// Lists of arrays nested inside the removed element.
  pub nested:   Snapshot,
}

impl Removal {
  pub fn encode(&self, enc: &mut Encoder, width: IndexWidth) {
    enc.flag(self.position.is_some());
    if let Some(position) = self.position {
      enc.index(position, width);
    }
    self.nested.encode(enc);
  }

  pub fn decode(dec: &mut Decoder<'_>, width: IndexWidth) -> Self {
    let position = dec.flag().then(|| dec.index(width));
    let nested = Snapshot::decode(dec);
    Self { position, nested }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selections {
  lists: BTreeMap<Path, Vec<usize>>,
}

impl Selections {
  pub fn new() -> Self {
    Self::default()
  }

  /// The list for the array at `path`, empty if nothing is selected.
  pub fn get(&self, path: &Path) -> &[usize] {
    self.lists.get(path).map(Vec::as_slice).unwrap_or_default()
  }

  pub fn is_selected(&self, path: &Path, index: usize) -> bool {
    self.get(path).contains(&index)
  }

  pub fn position(&self, path: &Path, index: usize) -> Option<usize> {
    self.get(path).iter().position(|&selected| selected == index)
  }

  /// Number of arrays with a non-empty list.
  pub fn len(&self) -> usize {
    self.lists.len()
  }

  pub fn is_empty(&self) -> bool {
    self.lists.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&Path, &[usize])> {
    self
      .lists
      .iter()
      .map(|(path, list)| (path, list.as_slice()))
  }

  fn store(&mut self, path: &Path, list: Vec<usize>) {
    if list.is_empty() {
      self.lists.remove(path);
    } else {
      self.lists.insert(path.clone(), list);
    }
  }

  fn check_bounds(path: &Path, len: usize, index: usize) -> Result<()> {
    if index >= len {
      return Err(SelectionError::IndexOutOfBounds {
        path: path.clone(),
        index,
        len,
      });
    }
    Ok(())
  }

  pub fn select(&mut self, path: &Path, len: usize, index: usize) -> Result<()> {
    Self::check_bounds(path, len, index)?;
    if self.is_selected(path, index) {
      return Err(SelectionError::AlreadySelected {
        path: path.clone(),
        index,
      });
    }
    self.lists.entry(path.clone()).or_default().push(index);
    Ok(())
  }

  /// Select every index in `indices`, in order. Either all of them are
  /// selected or, on error, none.
  pub fn select_many(&mut self, path: &Path, len: usize, indices: &[usize]) -> Result<()> {
    for (n, &index) in indices.iter().enumerate() {
      Self::check_bounds(path, len, index)?;
      if self.is_selected(path, index) || indices[..n].contains(&index) {
        return Err(SelectionError::AlreadySelected {
          path: path.clone(),
          index,
        });
      }
    }
    if !indices.is_empty() {
      self
        .lists
        .entry(path.clone())
        .or_default()
        .extend_from_slice(indices);
    }
    Ok(())
  }

  /// Deselect `index`, returning the position it held in the list.
  pub fn deselect(&mut self, path: &Path, index: usize) -> Result<usize> {
    let position = self
      .position(path, index)
      .ok_or_else(|| SelectionError::NotSelected {
        path: path.clone(),
        index,
      })?;
    let mut list = self.lists.remove(path).unwrap_or_default();
    list.remove(position);
    self.store(path, list);
    Ok(position)
  }

  /// Deselect every index in `indices`, in order, returning the position each
  /// one held at the moment it was removed. All or nothing.
  pub fn deselect_many(&mut self, path: &Path, indices: &[usize]) -> Result<Vec<usize>> {
    for (n, &index) in indices.iter().enumerate() {
      if !self.is_selected(path, index) || indices[..n].contains(&index) {
        return Err(SelectionError::NotSelected {
          path: path.clone(),
          index,
        });
      }
    }
    Ok(
      indices
        .iter()
        .filter_map(|&index| self.deselect(path, index).ok())
        .collect(),
    )
  }

  /// Flip `index`. Returns the position it held if it was deselected.
  pub fn toggle(&mut self, path: &Path, len: usize, index: usize) -> Result<Option<usize>> {
    Self::check_bounds(path, len, index)?;
    match self.position(path, index) {
      Some(_) => self.deselect(path, index).map(Some),
      None => self.select(path, len, index).map(|()| None),
    }
  }

  /// Put `index` back at `position`, undoing a deselect.
  pub fn reinsert(&mut self, path: &Path, position: usize, index: usize) {
    self
      .lists
      .entry(path.clone())
      .or_default()
      .insert(position, index);
  }

  /// Append `index` unchecked, redoing a select.
  pub fn push(&mut self, path: &Path, index: usize) {
    self.lists.entry(path.clone()).or_default().push(index);
  }

  /// Remove the entry at `position`, redoing a deselect.
  pub fn take(&mut self, path: &Path, position: usize) -> Option<usize> {
    let mut list = self.lists.remove(path)?;
    let index = (position < list.len()).then(|| list.remove(position));
    self.store(path, list);
    index
  }

  /// Drop the most recently selected entry, undoing a select.
  pub fn pop(&mut self, path: &Path) -> Option<usize> {
    let mut list = self.lists.remove(path)?;
    let index = list.pop();
    self.store(path, list);
    index
  }

  /// Replace the whole list, returning the previous one.
  pub fn replace(&mut self, path: &Path, list: Vec<usize>) -> Vec<usize> {
    let previous = self.lists.remove(path).unwrap_or_default();
    self.store(path, list);
    previous
  }

  /// Sort the list ascending (or descending) and return the permutation used:
  /// `new[k] == old[order[k]]`.
  pub fn sort(&mut self, path: &Path, descending: bool) -> Vec<usize> {
    let list = self.get(path);
    let mut order: Vec<usize> = (0..list.len()).collect();
    if descending {
      order.sort_by(|&a, &b| list[b].cmp(&list[a]));
    } else {
      order.sort_by_key(|&k| list[k]);
    }
    self.permute_list(path, &order);
    order
  }

  /// Reorder the list itself (not the array): `new[k] == old[order[k]]`.
  pub fn permute_list(&mut self, path: &Path, order: &[usize]) {
    if let Some(list) = self.lists.get_mut(path) {
      moves::permute_slice(list, order);
    }
  }

  /// Rewrite the list of `array` and the element step of every nested key.
  /// `map` returns `None` for elements that no longer exist.
  fn remap(&mut self, array: &Path, map: impl Fn(usize) -> Option<usize>) {
    if let Some(list) = self.lists.remove(array) {
      let list = list.into_iter().filter_map(&map).collect();
      self.store(array, list);
    }

    let depth = array.len();
    let nested: Vec<Path> = self
      .lists
      .range(array.clone()..)
      .map(|(key, _)| key)
      .take_while(|key| key.starts_with(array))
      .filter(|key| key.len() > depth)
      .cloned()
      .collect();
    let moved: Vec<(Path, Vec<usize>)> = nested
      .into_iter()
      .filter_map(|key| self.lists.remove(&key).map(|list| (key, list)))
      .collect();
    for (key, list) in moved {
      if let Some(index) = map(key.as_slice()[depth]) {
        self.lists.insert(key.with_step(depth, index), list);
      }
    }
  }

  /// Elements were inserted at `at`: later indices shift up by `count`.
  pub fn insert_shift(&mut self, array: &Path, at: usize, count: usize) {
    self.remap(array, |index| {
      Some(if index >= at { index + count } else { index })
    });
  }

  /// Element `index` was removed. Returns what is needed to restore it.
  pub fn remove_index(&mut self, array: &Path, index: usize) -> Removal {
    let position = self.position(array, index);
    let nested = self.take_subtree(&array.child(index));
    self.remap(array, |selected| {
      match selected.cmp(&index) {
        std::cmp::Ordering::Less => Some(selected),
        std::cmp::Ordering::Equal => None,
        std::cmp::Ordering::Greater => Some(selected - 1),
      }
    });
    Removal { position, nested }
  }

  /// Undo [`Selections::remove_index`] after the element was put back.
  pub fn restore_index(&mut self, array: &Path, index: usize, removal: Removal) {
    self.insert_shift(array, index, 1);
    if let Some(position) = removal.position {
      self.reinsert(array, position, index);
    }
    self.restore(removal.nested);
  }

  pub fn swap(&mut self, array: &Path, a: usize, b: usize) {
    self.remap(array, |index| {
      Some(if index == a {
        b
      } else if index == b {
        a
      } else {
        index
      })
    });
  }

  pub fn rotate(&mut self, array: &Path, rotation: Rotation) {
    if !rotation.is_identity() {
      self.remap(array, |index| Some(rotation.map_index(index)));
    }
  }

  /// The array was reordered so that `new[k] == old[order[k]]`.
  pub fn permute(&mut self, array: &Path, order: &[usize]) {
    let inverse = moves::invert_permutation(order);
    self.remap(array, |index| inverse.get(index).copied());
  }

  /// Clone every list at or below `path`.
  pub fn subtree(&self, path: &Path) -> Snapshot {
    let lists = self
      .lists
      .range(path.clone()..)
      .take_while(|(key, _)| key.starts_with(path))
      .map(|(key, list)| (key.clone(), list.clone()))
      .collect();
    Snapshot { lists }
  }

  /// Remove every list at or below `path`, returning them.
  pub fn take_subtree(&mut self, path: &Path) -> Snapshot {
    let snapshot = self.subtree(path);
    for (key, _) in &snapshot.lists {
      self.lists.remove(key);
    }
    snapshot
  }

  pub fn restore(&mut self, snapshot: Snapshot) {
    for (key, list) in snapshot.lists {
      self.store(&key, list);
    }
  }

  /// Replace every list at or below `path` with the snapshot's.
  pub fn restore_subtree(&mut self, path: &Path, snapshot: Snapshot) {
    self.take_subtree(path);
    self.restore(snapshot);
  }

  /// Drop entries below `path` that no longer address an element of `node`,
  /// the new value stored at `path`.
  pub fn retain_valid(&mut self, path: &Path, node: &dyn Node) {
    let depth = path.len();
    for (key, list) in self.subtree(path).lists {
      let relative: Path = key.as_slice()[depth..].iter().copied().collect();
      let len = path::node_at(node, &relative)
        .and_then(|array| array.as_seq())
        .map_or(0, |seq| seq.len());
      let kept: Vec<usize> = list.iter().copied().filter(|&index| index < len).collect();
      if kept.len() != list.len() {
        self.store(&key, kept);
      }
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn path(steps: &[usize]) -> Path {
    Path::from(steps)
  }

  #[test]
  fn test_select_and_deselect() {
    let mut selections = Selections::new();
    let list = path(&[0]);
    selections.select(&list, 5, 3).unwrap();
    selections.select(&list, 5, 1).unwrap();
    assert_eq!(selections.get(&list), &[3, 1]);

    assert_eq!(
      selections.select(&list, 5, 3),
      Err(SelectionError::AlreadySelected {
        path:  list.clone(),
        index: 3,
      })
    );
    assert!(matches!(
      selections.select(&list, 5, 5),
      Err(SelectionError::IndexOutOfBounds { len: 5, .. })
    ));

    assert_eq!(selections.deselect(&list, 3), Ok(0));
    assert_eq!(selections.get(&list), &[1]);
    assert!(matches!(
      selections.deselect(&list, 3),
      Err(SelectionError::NotSelected { index: 3, .. })
    ));

    selections.deselect(&list, 1).unwrap();
    assert!(selections.is_empty());
  }

  #[test]
  fn test_many_is_all_or_nothing() {
    let mut selections = Selections::new();
    let list = path(&[1]);
    selections.select(&list, 4, 2).unwrap();
    assert!(selections.select_many(&list, 4, &[0, 2]).is_err());
    assert!(selections.select_many(&list, 4, &[0, 0]).is_err());
    assert!(selections.select_many(&list, 4, &[0, 9]).is_err());
    assert_eq!(selections.get(&list), &[2]);

    selections.select_many(&list, 4, &[0, 3]).unwrap();
    assert_eq!(selections.deselect_many(&list, &[0, 2]), Ok(vec![1, 0]));
    assert_eq!(selections.get(&list), &[3]);
  }

  #[test]
  fn test_toggle() {
    let mut selections = Selections::new();
    let list = path(&[2]);
    assert_eq!(selections.toggle(&list, 3, 1), Ok(None));
    assert_eq!(selections.toggle(&list, 3, 2), Ok(None));
    assert_eq!(selections.toggle(&list, 3, 1), Ok(Some(0)));
    assert_eq!(selections.get(&list), &[2]);
  }

  #[test]
  fn test_sort_returns_permutation() {
    let mut selections = Selections::new();
    let list = path(&[0]);
    selections.select_many(&list, 10, &[7, 2, 9]).unwrap();
    let order = selections.sort(&list, false);
    assert_eq!(selections.get(&list), &[2, 7, 9]);
    assert_eq!(order, vec![1, 0, 2]);

    selections.permute_list(&list, &moves::invert_permutation(&order));
    assert_eq!(selections.get(&list), &[7, 2, 9]);

    selections.sort(&list, true);
    assert_eq!(selections.get(&list), &[9, 7, 2]);
  }

  #[test]
  fn test_insert_shifts_list_and_nested_keys() {
    let mut selections = Selections::new();
    let rows = path(&[0]);
    selections.select_many(&rows, 4, &[0, 2]).unwrap();
    selections.select(&path(&[0, 2, 1]), 3, 1).unwrap();

    selections.insert_shift(&rows, 1, 2);
    assert_eq!(selections.get(&rows), &[0, 4]);
    assert_eq!(selections.get(&path(&[0, 4, 1])), &[1]);
    assert!(selections.get(&path(&[0, 2, 1])).is_empty());
  }

  #[test]
  fn test_remove_and_restore() {
    let mut selections = Selections::new();
    let rows = path(&[0]);
    selections.select_many(&rows, 4, &[3, 1, 2]).unwrap();
    selections.select(&path(&[0, 1, 0]), 2, 1).unwrap();
    selections.select(&path(&[0, 3, 0]), 2, 0).unwrap();
    let before = selections.clone();

    let removal = selections.remove_index(&rows, 1);
    assert_eq!(removal.position, Some(1));
    assert_eq!(removal.nested.lists(), &[(path(&[0, 1, 0]), vec![1])]);
    assert_eq!(selections.get(&rows), &[2, 1]);
    assert_eq!(selections.get(&path(&[0, 2, 0])), &[0]);

    selections.restore_index(&rows, 1, removal);
    assert_eq!(selections, before);
  }

  #[test]
  fn test_rotate_and_permute() {
    let mut selections = Selections::new();
    let rows = path(&[0]);
    selections.select_many(&rows, 6, &[1, 4]).unwrap();
    selections.select(&path(&[0, 4]), 1, 0).unwrap();

    let rotation = Rotation::new(1, 3, 6);
    selections.rotate(&rows, rotation);
    assert_eq!(selections.get(&rows), &[4, 2]);
    assert_eq!(selections.get(&path(&[0, 2])), &[0]);
    selections.rotate(&rows, rotation.inverse());
    assert_eq!(selections.get(&rows), &[1, 4]);

    selections.permute(&rows, &[4, 0, 1, 2, 3, 5]);
    assert_eq!(selections.get(&rows), &[2, 0]);
    assert_eq!(selections.get(&path(&[0, 0])), &[0]);
  }

  #[test]
  fn test_snapshot_codec() {
    let mut selections = Selections::new();
    selections.select_many(&path(&[0, 1]), 500, &[300, 2]).unwrap();
    selections.select(&path(&[0, 1, 300, 2]), 4, 3).unwrap();
    let snapshot = selections.subtree(&path(&[0]));
    assert_eq!(snapshot.lists().len(), 2);

    let mut enc = Encoder::new();
    snapshot.encode(&mut enc);
    let removal = Removal {
      position: Some(7),
      nested:   snapshot.clone(),
    };
    removal.encode(&mut enc, IndexWidth::U16);

    let mut dec = Decoder::new(enc.as_bytes());
    assert_eq!(Snapshot::decode(&mut dec), snapshot);
    assert_eq!(Removal::decode(&mut dec, IndexWidth::U16), removal);
    assert!(dec.is_empty());
  }

  #[test]
  fn test_retain_valid() {
    crate::reflect! {
      #[derive(Debug, Clone)]
      struct Doc {
        items: Vec<Vec<u8>>,
      }
    }

    let mut selections = Selections::new();
    let items = path(&[Doc::ITEMS]);
    selections.select_many(&items, 3, &[0, 2]).unwrap();
    selections.select_many(&path(&[Doc::ITEMS, 0]), 4, &[3, 1]).unwrap();

    let doc = Doc {
      items: vec![vec![0; 2]; 2],
    };
    selections.retain_valid(&Path::root(), &doc);
    assert_eq!(selections.get(&items), &[0]);
    assert_eq!(selections.get(&path(&[Doc::ITEMS, 0])), &[1]);
  }
}
