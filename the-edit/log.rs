//! Append-only event log.
//!
//! Each event is `[path][opcode][payload]`, appended to one contiguous buffer.
//! A parallel offset index gives constant time access to any event; an event
//! ends where the next one starts (or at the end of the buffer).

use std::fmt;

use bytes::BytesMut;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("unknown opcode {0:#04x}")]
pub struct UnknownOpcode(pub u8);

macro_rules! opcodes {
  ($($name:ident = $byte:literal),* $(,)?) => {
    /// Kind of edit an event records. Determines the payload layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[repr(u8)]
    pub enum Opcode {
      $( $name = $byte, )*
    }

    impl Opcode {
      pub const ALL: &'static [Opcode] = &[$( Opcode::$name, )*];

      pub const fn name(self) -> &'static str {
        match self {
          $( Opcode::$name => stringify!($name), )*
        }
      }
    }

    impl TryFrom<u8> for Opcode {
      type Error = UnknownOpcode;

      fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
          $( $byte => Ok(Opcode::$name), )*
          _ => Err(UnknownOpcode(byte)),
        }
      }
    }
  };
}

opcodes! {
  Reset = 0x00,
  Set = 0x01,
  SetFamily = 0x02,
  SetMany = 0x03,
  Assign = 0x04,
  AssignDefault = 0x05,
  Reserve = 0x06,
  Trim = 0x07,
  Append = 0x08,
  AppendMany = 0x09,
  Insert = 0x0a,
  InsertMany = 0x0b,
  Remove = 0x0c,
  RemoveMany = 0x0d,
  RemoveSelected = 0x0e,
  Sort = 0x0f,
  SortDescending = 0x10,
  Swap = 0x11,
  MoveUp = 0x12,
  MoveDown = 0x13,
  MoveTop = 0x14,
  MoveBottom = 0x15,
  MoveTo = 0x16,
  Select = 0x17,
  SelectMany = 0x18,
  Deselect = 0x19,
  DeselectMany = 0x1a,
  Toggle = 0x1b,
  ToggleMany = 0x1c,
  SelectAll = 0x1d,
  ClearSelections = 0x1e,
  SortSelection = 0x1f,
  SortSelectionDescending = 0x20,
}

impl Opcode {
  /// Whether the event edits selection lists only, leaving the tree alone.
  pub const fn is_selection(self) -> bool {
    matches!(
      self,
      Opcode::Select
        | Opcode::SelectMany
        | Opcode::Deselect
        | Opcode::DeselectMany
        | Opcode::Toggle
        | Opcode::ToggleMany
        | Opcode::SelectAll
        | Opcode::ClearSelections
        | Opcode::SortSelection
        | Opcode::SortSelectionDescending
    )
  }
}

impl fmt::Display for Opcode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

#[derive(Debug, Default)]
pub struct EventLog {
  bytes:   BytesMut,
  offsets: Vec<usize>,
}

impl EventLog {
  pub fn with_capacity(bytes: usize, events: usize) -> Self {
    Self {
      bytes:   BytesMut::with_capacity(bytes),
      offsets: Vec::with_capacity(events),
    }
  }

  /// Append one encoded event, returning its index.
  pub fn push(&mut self, event: &[u8]) -> usize {
    let index = self.offsets.len();
    self.offsets.push(self.bytes.len());
    self.bytes.extend_from_slice(event);
    index
  }

  pub fn event(&self, index: usize) -> Option<&[u8]> {
    let start = *self.offsets.get(index)?;
    let end = self
      .offsets
      .get(index + 1)
      .copied()
      .unwrap_or(self.bytes.len());
    Some(&self.bytes[start..end])
  }

  /// Number of events.
  #[inline]
  pub fn len(&self) -> usize {
    self.offsets.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.offsets.is_empty()
  }

  /// Total size of all events in bytes.
  #[inline]
  pub fn byte_len(&self) -> usize {
    self.bytes.len()
  }

  pub fn clear(&mut self) {
    self.bytes.clear();
    self.offsets.clear();
  }
}
