//! Addressing nodes inside a tree.
//!
//! A [`Route`] is what callers build: member numbers, element indices and at
//! most one "every selected element" step. A [`Path`] is a concrete address
//! produced by resolving a route against the live tree and selections; it is
//! what observers receive.
//!
//! # Byte layout
//!
//! Routes are logged one byte per step. The two high bits tag the step:
//!
//! | tag  | meaning               |
//! |------|-----------------------|
//! | `00` | branch                |
//! | `01` | selection branch      |
//! | `10` | leaf branch           |
//! | `11` | leaf selection branch |
//!
//! The low six bits hold the member number of a struct step, the element index
//! of a fixed array step (when the array has at most 63 elements) or `0x3F`,
//! in which case the index follows in the array's [`IndexWidth`]. Selection
//! steps carry `0`. The empty route is the single byte `0xFF`; it can't
//! collide with anything else because the root is always a struct.
//!
//! The layout is not self-describing: both directions walk the shape of the
//! tree to know what each byte means and which width follows.

use std::fmt;

use smallvec::SmallVec;
use thiserror::Error;

use crate::{
  codec::{
    Decoder,
    Encoder,
    IndexWidth,
  },
  reflect::{
    Kind,
    Node,
  },
  selection::Selections,
};

const LEAF: u8 = 0b1000_0000;
const SELECTION: u8 = 0b0100_0000;
const PAYLOAD: u8 = 0b0011_1111;
const EXPLICIT: u8 = PAYLOAD;
const ROOT: u8 = 0xFF;

/// Largest fixed array length whose indices are stored inline.
pub const MAX_INLINE: usize = EXPLICIT as usize;

pub type Result<T> = std::result::Result<T, PathError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PathError {
  #[error("step {step} expects a struct, found {kind:?}")]
  NotAStruct { step: usize, kind: Kind },
  #[error("{type_name} has no member {index}")]
  NoSuchField {
    type_name: &'static str,
    index:     usize,
  },
  #[error("step {step} expects an array, found {kind:?}")]
  NotAnArray { step: usize, kind: Kind },
  #[error("index {index} is out of bounds for {path} (len: {len})")]
  IndexOutOfBounds { path: Path, index: usize, len: usize },
  #[error("a route may select elements of at most one array")]
  MultipleSelections,
  #[error("route {0} does not resolve to exactly one node")]
  Unresolved(Route),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
  /// Struct member by number.
  Member(usize),
  /// Array element by index.
  Index(usize),
  /// Every currently selected element of the array.
  Selection,
}

/// Symbolic address of one or more nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Route {
  steps: SmallVec<[Step; 8]>,
}

impl Route {
  /// The whole tree.
  pub fn root() -> Self {
    Self::default()
  }

  pub fn field(mut self, index: usize) -> Self {
    self.steps.push(Step::Member(index));
    self
  }

  pub fn index(mut self, index: usize) -> Self {
    self.steps.push(Step::Index(index));
    self
  }

  pub fn selected(mut self) -> Self {
    self.steps.push(Step::Selection);
    self
  }

  pub fn push(&mut self, step: Step) {
    self.steps.push(step);
  }

  #[inline]
  pub fn steps(&self) -> &[Step] {
    &self.steps
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.steps.len()
  }

  #[inline]
  pub fn is_root(&self) -> bool {
    self.steps.is_empty()
  }

  pub fn has_selection(&self) -> bool {
    self.steps.contains(&Step::Selection)
  }
}

impl fmt::Display for Route {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_root() {
      return f.write_str(".");
    }
    for step in &self.steps {
      match step {
        Step::Member(index) => write!(f, ".{index}")?,
        Step::Index(index) => write!(f, "[{index}]")?,
        Step::Selection => f.write_str("[*]")?,
      }
    }
    Ok(())
  }
}

/// Concrete address of one node: member numbers and element indices from the
/// root, interpreted by the shape of the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path(SmallVec<[usize; 8]>);

impl Path {
  pub fn root() -> Self {
    Self::default()
  }

  pub fn child(&self, index: usize) -> Self {
    let mut path = self.clone();
    path.0.push(index);
    path
  }

  #[inline]
  pub fn push(&mut self, index: usize) {
    self.0.push(index);
  }

  #[inline]
  pub fn as_slice(&self) -> &[usize] {
    &self.0
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.0.len()
  }

  #[inline]
  pub fn is_root(&self) -> bool {
    self.0.is_empty()
  }

  pub fn starts_with(&self, prefix: &Path) -> bool {
    self.0.starts_with(&prefix.0)
  }

  /// Rewrite the step at `depth`, used when an ancestor array reorders.
  pub(crate) fn with_step(&self, depth: usize, index: usize) -> Self {
    let mut path = self.clone();
    path.0[depth] = index;
    path
  }
}

impl From<&[usize]> for Path {
  fn from(steps: &[usize]) -> Self {
    Self(SmallVec::from_slice(steps))
  }
}

impl<const N: usize> From<[usize; N]> for Path {
  fn from(steps: [usize; N]) -> Self {
    Self(steps.into_iter().collect())
  }
}

impl FromIterator<usize> for Path {
  fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
    Self(iter.into_iter().collect())
  }
}

impl fmt::Display for Path {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_root() {
      return f.write_str("/");
    }
    for index in &self.0 {
      write!(f, "/{index}")?;
    }
    Ok(())
  }
}

fn child(node: &dyn Node, index: usize) -> Option<&dyn Node> {
  match node.kind() {
    Kind::Struct => node.field(index),
    Kind::Array | Kind::FixedArray => node.as_seq()?.element(index),
    Kind::Leaf | Kind::Optional => None,
  }
}

fn child_mut(node: &mut dyn Node, index: usize) -> Option<&mut dyn Node> {
  match node.kind() {
    Kind::Struct => node.field_mut(index),
    Kind::Array | Kind::FixedArray => node.as_seq_mut()?.element_mut(index),
    Kind::Leaf | Kind::Optional => None,
  }
}

pub fn node_at<'a>(root: &'a dyn Node, path: &Path) -> Option<&'a dyn Node> {
  path.0.iter().try_fold(root, |node, &index| child(node, index))
}

pub fn node_at_mut<'a>(root: &'a mut dyn Node, path: &Path) -> Option<&'a mut dyn Node> {
  path.0.iter().try_fold(root, |node, &index| child_mut(node, index))
}

/// A node reached while walking the shape of the tree. Past the end of an
/// array the walk continues on a default element.
enum Probe<'a> {
  Live(&'a dyn Node),
  Owned(Box<dyn Node>),
}

impl<'a> Probe<'a> {
  fn node(&self) -> &dyn Node {
    match self {
      Probe::Live(node) => *node,
      Probe::Owned(node) => node.as_ref(),
    }
  }

  fn member(self, index: usize) -> Option<Self> {
    match self {
      Probe::Live(node) => node.field(index).map(Probe::Live),
      Probe::Owned(node) => node.field(index).map(|child| Probe::Owned(child.boxed())),
    }
  }

  fn element(self, index: usize) -> Option<Self> {
    match self {
      Probe::Live(node) => {
        let seq = node.as_seq()?;
        Some(match seq.element(index) {
          Some(element) => Probe::Live(element),
          None => Probe::Owned(seq.probe()),
        })
      },
      Probe::Owned(node) => {
        let seq = node.as_seq()?;
        Some(Probe::Owned(match seq.element(index) {
          Some(element) => element.boxed(),
          None => seq.probe(),
        }))
      },
    }
  }
}

/// Append the byte form of `route` to `enc`.
///
/// Returns the index width of the targeted node, which the caller reuses for
/// the counts and indices of its payload.
pub fn encode(route: &Route, root: &dyn Node, enc: &mut Encoder) -> Result<IndexWidth> {
  if route.is_root() {
    enc.u8(ROOT);
    return Ok(IndexWidth::DEFAULT);
  }

  let mut probe = Probe::Live(root);
  let mut width = IndexWidth::DEFAULT;
  let mut selected = false;
  let last = route.len() - 1;

  for (step, &kind) in route.steps().iter().enumerate() {
    let leaf = if step == last { LEAF } else { 0 };
    let node = probe.node();
    match kind {
      Step::Member(index) => {
        if node.kind() != Kind::Struct {
          return Err(PathError::NotAStruct {
            step,
            kind: node.kind(),
          });
        }
        let field = node
          .fields()
          .get(index)
          .ok_or(PathError::NoSuchField {
            type_name: node.type_name(),
            index,
          })?;
        enc.u8(leaf | index as u8);
        width = field.width;
        probe = probe.member(index).ok_or(PathError::NoSuchField {
          type_name: field.type_name,
          index,
        })?;
      },
      Step::Index(index) => {
        let seq = node.as_seq().ok_or(PathError::NotAnArray {
          step,
          kind: node.kind(),
        })?;
        match seq.fixed_len() {
          Some(len) if len <= MAX_INLINE => {
            if index >= len {
              return Err(PathError::IndexOutOfBounds {
                path: Path::root(),
                index,
                len,
              });
            }
            enc.u8(leaf | index as u8);
          },
          _ => {
            if index as u64 > width.max() {
              return Err(PathError::IndexOutOfBounds {
                path: Path::root(),
                index,
                len: seq.len(),
              });
            }
            enc.u8(leaf | EXPLICIT);
            enc.index(index, width);
          },
        }
        width = IndexWidth::DEFAULT;
        probe = probe.element(index).ok_or(PathError::NotAnArray {
          step,
          kind: Kind::Leaf,
        })?;
      },
      Step::Selection => {
        if selected {
          return Err(PathError::MultipleSelections);
        }
        selected = true;
        if !node.kind().is_array() {
          return Err(PathError::NotAnArray {
            step,
            kind: node.kind(),
          });
        }
        enc.u8(leaf | SELECTION);
        width = IndexWidth::DEFAULT;
        probe = probe.element(0).ok_or(PathError::NotAnArray {
          step,
          kind: Kind::Leaf,
        })?;
      },
    }
  }

  Ok(width)
}

/// Read a route written by [`encode`] against a tree of the same shape.
///
/// # Panics
///
/// On a byte that does not fit the shape of the tree. The log is only ever read
/// back by the editor that wrote it, so this is a broken internal invariant.
pub fn decode(dec: &mut Decoder<'_>, root: &dyn Node) -> (Route, IndexWidth) {
  let mut route = Route::root();
  let mut probe = Probe::Live(root);
  let mut width = IndexWidth::DEFAULT;

  loop {
    let byte = dec.u8();
    if byte == ROOT && route.is_root() {
      return (route, width);
    }
    let payload = byte & PAYLOAD;
    let kind = probe.node().kind();
    let step = match kind {
      Kind::Struct if byte & SELECTION == 0 => {
        let index = payload as usize;
        width = probe
          .node()
          .fields()
          .get(index)
          .map(|field| field.width)
          .unwrap_or_else(|| panic!("path byte {byte:#04x} names a missing member"));
        Step::Member(index)
      },
      Kind::Array | Kind::FixedArray if byte & SELECTION != 0 => Step::Selection,
      Kind::Array | Kind::FixedArray => {
        let index = if payload == EXPLICIT {
          dec.index(width)
        } else {
          payload as usize
        };
        Step::Index(index)
      },
      _ => panic!("path byte {byte:#04x} does not fit a {kind:?} node"),
    };

    probe = match step {
      Step::Member(index) => probe.member(index),
      Step::Index(index) => probe.element(index),
      Step::Selection => probe.element(0),
    }
    .unwrap_or_else(|| panic!("path byte {byte:#04x} leaves the tree"));
    if !matches!(step, Step::Member(_)) {
      width = IndexWidth::DEFAULT;
    }
    route.push(step);

    if byte & LEAF != 0 {
      return (route, width);
    }
  }
}

/// Resolve `route` to the concrete paths it currently addresses.
///
/// A route without a selection step yields exactly one path. A selection step
/// fans out to every selected element, in selection order.
pub fn expand(route: &Route, root: &dyn Node, selections: &Selections) -> Result<Vec<Path>> {
  let mut targets: Vec<(Path, &dyn Node)> = vec![(Path::root(), root)];
  let mut selected = false;

  for (step, &kind) in route.steps().iter().enumerate() {
    let mut next = Vec::with_capacity(targets.len());
    for (path, node) in targets {
      match kind {
        Step::Member(index) => {
          if node.kind() != Kind::Struct {
            return Err(PathError::NotAStruct {
              step,
              kind: node.kind(),
            });
          }
          let child = node.field(index).ok_or(PathError::NoSuchField {
            type_name: node.type_name(),
            index,
          })?;
          next.push((path.child(index), child));
        },
        Step::Index(index) => {
          let seq = node.as_seq().ok_or(PathError::NotAnArray {
            step,
            kind: node.kind(),
          })?;
          let element = seq
            .element(index)
            .ok_or_else(|| PathError::IndexOutOfBounds {
              path: path.clone(),
              index,
              len: seq.len(),
            })?;
          next.push((path.child(index), element));
        },
        Step::Selection => {
          let seq = node.as_seq().ok_or(PathError::NotAnArray {
            step,
            kind: node.kind(),
          })?;
          for &index in selections.get(&path) {
            if let Some(element) = seq.element(index) {
              next.push((path.child(index), element));
            }
          }
        },
      }
    }
    if kind == Step::Selection {
      if selected {
        return Err(PathError::MultipleSelections);
      }
      selected = true;
    }
    targets = next;
  }

  Ok(targets.into_iter().map(|(path, _)| path).collect())
}

/// Resolve a route that must address exactly one node.
pub fn resolve(route: &Route, root: &dyn Node) -> Result<Path> {
  if route.has_selection() {
    return Err(PathError::Unresolved(route.clone()));
  }
  let mut paths = expand(route, root, &Selections::default())?;
  match paths.pop() {
    Some(path) if paths.is_empty() => Ok(path),
    _ => Err(PathError::Unresolved(route.clone())),
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::reflect::Value;

  crate::reflect! {
    #[derive(Debug, Clone, PartialEq)]
    struct Cell {
      tags: Vec<u16>,
      mark: bool,
    }
  }

  crate::reflect! {
    #[derive(Debug, Clone, PartialEq)]
    struct Grid {
      title: String,
      small: [Cell; 4],
      large: [u8; 100],
      rows:  Vec<Cell> => 200,
    }
  }

  fn grid() -> Grid {
    let mut grid = Grid::default_value();
    grid.rows = vec![Cell::default_value(); 3];
    grid
  }

  fn bytes(route: &Route, root: &Grid) -> (Vec<u8>, IndexWidth) {
    let mut enc = Encoder::new();
    let width = encode(route, root, &mut enc).unwrap();
    (enc.as_bytes().to_vec(), width)
  }

  #[test]
  fn test_root_route() {
    let (bytes, _) = bytes(&Route::root(), &grid());
    assert_eq!(bytes, vec![0xFF]);
  }

  #[test]
  fn test_inline_and_explicit_indices() {
    let tree = grid();

    let route = Route::root().field(Grid::SMALL).index(2).field(Cell::MARK);
    let (encoded, _) = bytes(&route, &tree);
    assert_eq!(encoded, vec![Grid::SMALL as u8, 2, LEAF | Cell::MARK as u8]);

    // Fixed array longer than 63: explicit index at the array's own width.
    let route = Route::root().field(Grid::LARGE).index(70);
    let (encoded, width) = bytes(&route, &tree);
    assert_eq!(encoded, vec![Grid::LARGE as u8, LEAF | EXPLICIT, 70]);
    assert_eq!(width, IndexWidth::DEFAULT);

    // Declared maximum of 200 gives a one byte index.
    let route = Route::root().field(Grid::ROWS).index(1).field(Cell::TAGS);
    let (encoded, width) = bytes(&route, &tree);
    assert_eq!(encoded, vec![Grid::ROWS as u8, EXPLICIT, 1, LEAF | Cell::TAGS as u8]);
    assert_eq!(width, IndexWidth::DEFAULT);
  }

  #[test]
  fn test_selection_step() {
    let route = Route::root().field(Grid::ROWS).selected().field(Cell::MARK);
    let (encoded, _) = bytes(&route, &grid());
    assert_eq!(encoded, vec![Grid::ROWS as u8, SELECTION, LEAF | Cell::MARK as u8]);

    let (encoded, _) = bytes(&Route::root().field(Grid::ROWS).selected(), &grid());
    assert_eq!(encoded, vec![Grid::ROWS as u8, LEAF | SELECTION]);
  }

  #[test]
  fn test_decode_matches_encode() {
    let tree = grid();
    let routes = [
      Route::root(),
      Route::root().field(Grid::TITLE),
      Route::root().field(Grid::ROWS),
      Route::root().field(Grid::ROWS).index(2).field(Cell::TAGS).index(0),
      Route::root().field(Grid::SMALL).selected().field(Cell::TAGS),
      Route::root().field(Grid::LARGE).index(99),
    ];
    for route in routes {
      let mut enc = Encoder::new();
      let width = encode(&route, &tree, &mut enc).unwrap();
      let mut dec = Decoder::new(enc.as_bytes());
      assert_eq!(decode(&mut dec, &tree), (route.clone(), width), "{route}");
      assert!(dec.is_empty());
    }
  }

  #[test]
  fn test_decode_walks_past_empty_arrays() {
    // `tags` is empty, the walk continues on a probe element.
    let tree = grid();
    let route = Route::root().field(Grid::ROWS).index(0).field(Cell::TAGS).index(7);
    let mut enc = Encoder::new();
    encode(&route, &tree, &mut enc).unwrap();
    let mut dec = Decoder::new(enc.as_bytes());
    assert_eq!(decode(&mut dec, &tree).0, route);
  }

  #[test]
  fn test_shape_errors() {
    let tree = grid();
    let mut enc = Encoder::new();
    assert!(matches!(
      encode(&Route::root().field(9), &tree, &mut enc),
      Err(PathError::NoSuchField { index: 9, .. })
    ));
    assert!(matches!(
      encode(&Route::root().field(Grid::TITLE).index(0), &tree, &mut enc),
      Err(PathError::NotAnArray { step: 1, .. })
    ));
    assert!(matches!(
      encode(&Route::root().field(Grid::ROWS).field(0), &tree, &mut enc),
      Err(PathError::NotAStruct { step: 1, .. })
    ));
    assert!(matches!(
      encode(&Route::root().field(Grid::SMALL).index(4), &tree, &mut enc),
      Err(PathError::IndexOutOfBounds { index: 4, len: 4, .. })
    ));
    let twice = Route::root()
      .field(Grid::ROWS)
      .selected()
      .field(Cell::TAGS)
      .selected();
    assert_eq!(encode(&twice, &tree, &mut enc), Err(PathError::MultipleSelections));
  }

  #[test]
  fn test_expand_selection() {
    let tree = grid();
    let mut selections = Selections::default();
    let rows = Path::from([Grid::ROWS]);
    selections.select(&rows, 3, 2).unwrap();
    selections.select(&rows, 3, 0).unwrap();

    let route = Route::root().field(Grid::ROWS).selected().field(Cell::MARK);
    let paths = expand(&route, &tree, &selections).unwrap();
    assert_eq!(paths, vec![
      Path::from([Grid::ROWS, 2, Cell::MARK]),
      Path::from([Grid::ROWS, 0, Cell::MARK]),
    ]);
  }

  #[test]
  fn test_expand_bounds() {
    let tree = grid();
    let route = Route::root().field(Grid::ROWS).index(3);
    assert_eq!(
      expand(&route, &tree, &Selections::default()),
      Err(PathError::IndexOutOfBounds {
        path:  Path::from([Grid::ROWS]),
        index: 3,
        len:   3,
      })
    );
  }

  #[test]
  fn test_node_at() {
    let mut tree = grid();
    tree.rows[1].tags.push(5);
    let path = Path::from([Grid::ROWS, 1, Cell::TAGS, 0]);
    assert_eq!(node_at(&tree, &path).and_then(|node| node.downcast_ref::<u16>()), Some(&5));

    *node_at_mut(&mut tree, &path)
      .and_then(|node| node.downcast_mut::<u16>())
      .unwrap() = 6;
    assert_eq!(tree.rows[1].tags[0], 6);
    assert!(node_at(&tree, &Path::from([Grid::ROWS, 5])).is_none());
    assert_eq!(path.to_string(), "/3/1/0/0");
  }
}
