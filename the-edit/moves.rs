//! Reordering primitives for arrays.
//!
//! Every move operation is reduced to a short script of [`Rotation`]s. The
//! script is what gets logged: redo applies it front to back, undo applies each
//! rotation's [`Rotation::inverse`] back to front. Sorts use a full permutation
//! instead (see [`permute_slice`]).

/// Left rotation of the sub-slice `start..end` so that the element at `mid`
/// ends up at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rotation {
  pub start: usize,
  pub mid:   usize,
  pub end:   usize,
}

impl Rotation {
  pub const fn new(start: usize, mid: usize, end: usize) -> Self {
    Self { start, mid, end }
  }

  /// A rotation that exchanges the adjacent elements `index` and `index + 1`.
  pub const fn adjacent(index: usize) -> Self {
    Self::new(index, index + 1, index + 2)
  }

  #[inline]
  pub const fn is_identity(self) -> bool {
    self.mid == self.start || self.mid == self.end
  }

  /// The rotation that restores the order this one changed.
  pub const fn inverse(self) -> Self {
    Self {
      start: self.start,
      mid:   self.start + (self.end - self.mid),
      end:   self.end,
    }
  }

  /// Index an element at `index` ends up at after the rotation.
  pub fn map_index(self, index: usize) -> usize {
    if index < self.start || index >= self.end {
      index
    } else if index >= self.mid {
      index - (self.mid - self.start)
    } else {
      index + (self.end - self.mid)
    }
  }

  pub fn apply<T>(self, slice: &mut [T]) {
    slice[self.start..self.end].rotate_left(self.mid - self.start);
  }
}

/// Apply a script front to back.
pub fn apply_script<T>(slice: &mut [T], script: &[Rotation]) {
  for rotation in script {
    rotation.apply(slice);
  }
}

/// Revert a script previously applied with [`apply_script`].
pub fn revert_script<T>(slice: &mut [T], script: &[Rotation]) {
  for rotation in script.iter().rev() {
    rotation.inverse().apply(slice);
  }
}

/// Reorder `slice` so that `new[k] == old[order[k]]`.
///
/// `order` must be a permutation of `0..slice.len()`.
pub fn permute_slice<T>(slice: &mut [T], order: &[usize]) {
  debug_assert_eq!(slice.len(), order.len());
  let mut visited = vec![false; order.len()];
  for first in 0..order.len() {
    if visited[first] {
      continue;
    }
    let mut current = first;
    loop {
      visited[current] = true;
      let next = order[current];
      if next == first {
        break;
      }
      slice.swap(current, next);
      current = next;
    }
  }
}

/// `inverse[order[k]] == k`: maps an old index to its new index.
pub fn invert_permutation(order: &[usize]) -> Vec<usize> {
  let mut inverse = vec![0; order.len()];
  for (new, &old) in order.iter().enumerate() {
    inverse[old] = new;
  }
  inverse
}

/// Returns `true` if the permutation leaves every element in place.
pub fn is_identity(order: &[usize]) -> bool {
  order.iter().enumerate().all(|(new, &old)| new == old)
}

/// Shift every element of `indices` one step towards the front.
///
/// A contiguous block already at the front does not move. `indices` must be
/// sorted and unique.
pub fn plan_move_up(indices: &[usize]) -> Vec<Rotation> {
  let mut script = Vec::new();
  let mut floor = 0;
  for &index in indices {
    if index == floor {
      floor += 1;
    } else {
      script.push(Rotation::adjacent(index - 1));
    }
  }
  script
}

/// Shift every element of `indices` one step towards the back.
///
/// A contiguous block already at the back does not move. `indices` must be
/// sorted and unique.
pub fn plan_move_down(len: usize, indices: &[usize]) -> Vec<Rotation> {
  let mut script = Vec::new();
  let mut ceiling = len;
  for &index in indices.iter().rev() {
    if index + 1 == ceiling {
      ceiling = index;
    } else {
      script.push(Rotation::adjacent(index));
    }
  }
  script
}

/// Place the elements at `indices` contiguously at `[target, target + k)`,
/// keeping their relative order and the relative order of everything else.
///
/// `target` is clamped to `len - k`. `indices` must be sorted and unique.
///
/// Elements that end up further back (the left chunk) are gathered into a run
/// anchored at the first of them and then rotated into place in one step. The
/// right chunk is handled the same way from the other end. Elements that
/// already sit at their final position are never touched.
pub fn plan_move_to(len: usize, indices: &[usize], target: usize) -> Vec<Rotation> {
  let count = indices.len();
  if count == 0 || count > len {
    return Vec::new();
  }
  let target = target.min(len - count);
  let mut script = Vec::new();

  // Left chunk: the prefix of elements whose final slot lies after them.
  let left = indices
    .iter()
    .enumerate()
    .take_while(|&(m, &index)| index < target + m)
    .count();
  if left > 0 {
    let start = indices[0];
    let mut end = start + 1;
    for &index in &indices[1..left] {
      if index != end {
        script.push(Rotation::new(end, index, index + 1));
      }
      end += 1;
    }
    let place = Rotation::new(start, end, target + left);
    if !place.is_identity() {
      script.push(place);
    }
  }

  // Right chunk: the suffix of elements whose final slot lies before them.
  let right = indices
    .iter()
    .enumerate()
    .skip(left)
    .find(|&(m, &index)| index > target + m)
    .map_or(count, |(m, _)| m);
  if right < count {
    let end = indices[count - 1] + 1;
    let mut start = end - 1;
    for &index in indices[right..count - 1].iter().rev() {
      if index + 1 != start {
        script.push(Rotation::new(index, index + 1, start));
      }
      start -= 1;
    }
    let place = Rotation::new(target + right, start, end);
    if !place.is_identity() {
      script.push(place);
    }
  }

  script
}

#[cfg(test)]
mod test {
  use super::*;

  fn moved(len: usize, script: &[Rotation]) -> Vec<usize> {
    let mut items: Vec<usize> = (0..len).collect();
    apply_script(&mut items, script);
    items
  }

  fn reference_move_to(len: usize, indices: &[usize], target: usize) -> Vec<usize> {
    let picked: Vec<usize> = indices.to_vec();
    let mut rest: Vec<usize> = (0..len).filter(|i| !indices.contains(i)).collect();
    let target = target.min(len - indices.len());
    rest.splice(target..target, picked);
    rest
  }

  #[test]
  fn test_rotation_inverse() {
    let rotation = Rotation::new(1, 3, 6);
    let mut items = vec![0, 1, 2, 3, 4, 5, 6];
    rotation.apply(&mut items);
    assert_eq!(items, vec![0, 3, 4, 5, 1, 2, 6]);
    rotation.inverse().apply(&mut items);
    assert_eq!(items, vec![0, 1, 2, 3, 4, 5, 6]);
  }

  #[test]
  fn test_rotation_map_index() {
    let rotation = Rotation::new(1, 3, 6);
    let mut items: Vec<usize> = (0..7).collect();
    rotation.apply(&mut items);
    for (new, &old) in items.iter().enumerate() {
      assert_eq!(rotation.map_index(old), new);
    }
  }

  #[test]
  fn test_move_to_front_interleaved() {
    let script = plan_move_to(6, &[1, 3, 5], 0);
    assert_eq!(moved(6, &script), vec![1, 3, 5, 0, 2, 4]);
    assert!(script.len() <= 3 + 2);
  }

  #[test]
  fn test_move_to_clamps_target() {
    let script = plan_move_to(5, &[0, 1], 10);
    assert_eq!(moved(5, &script), vec![2, 3, 4, 0, 1]);
  }

  #[test]
  fn test_move_to_in_place_is_empty() {
    assert!(plan_move_to(5, &[2, 3], 2).is_empty());
    assert!(plan_move_to(5, &[], 2).is_empty());
  }

  #[test]
  fn test_move_up_blocked_at_front() {
    let script = plan_move_up(&[0, 1, 3]);
    assert_eq!(script, vec![Rotation::adjacent(2)]);
    assert_eq!(moved(5, &script), vec![0, 1, 3, 2, 4]);
    assert!(plan_move_up(&[0, 1]).is_empty());
  }

  #[test]
  fn test_move_down_keeps_blocks_together() {
    let script = plan_move_down(6, &[1, 2, 5]);
    assert_eq!(moved(6, &script), vec![0, 3, 1, 2, 4, 5]);
    assert!(plan_move_down(3, &[2]).is_empty());
  }

  #[test]
  fn test_permute_slice() {
    let mut items = vec!['a', 'b', 'c', 'd'];
    let order = [2, 0, 3, 1];
    permute_slice(&mut items, &order);
    assert_eq!(items, vec!['c', 'a', 'd', 'b']);

    let inverse = invert_permutation(&order);
    permute_slice(&mut items, &inverse);
    assert_eq!(items, vec!['a', 'b', 'c', 'd']);
  }

  fn indices_from_mask(mask: &[bool]) -> Vec<usize> {
    mask
      .iter()
      .enumerate()
      .filter_map(|(i, &picked)| picked.then_some(i))
      .collect()
  }

  quickcheck::quickcheck! {
      fn prop_move_to_matches_reference(mask: Vec<bool>, target: usize) -> bool {
          let len = mask.len();
          let indices = indices_from_mask(&mask);
          if indices.is_empty() {
              return plan_move_to(len, &indices, target).is_empty();
          }
          let target = target % (len + 1);
          let script = plan_move_to(len, &indices, target);
          script.len() <= indices.len() + 2
              && moved(len, &script) == reference_move_to(len, &indices, target)
      }

      fn prop_move_script_reverts(mask: Vec<bool>, target: usize) -> bool {
          let len = mask.len();
          let indices = indices_from_mask(&mask);
          let script = plan_move_to(len, &indices, target % (len + 1));
          let mut items: Vec<usize> = (0..len).collect();
          apply_script(&mut items, &script);
          revert_script(&mut items, &script);
          items == (0..len).collect::<Vec<_>>()
      }

      fn prop_move_up_shifts_by_one(mask: Vec<bool>) -> bool {
          let len = mask.len();
          let indices = indices_from_mask(&mask);
          let items = moved(len, &plan_move_up(&indices));
          let mut floor = 0;
          indices.iter().all(|&index| {
              let expected = if index == floor { floor += 1; index } else { index - 1 };
              items[expected] == index
          })
      }
  }
}
