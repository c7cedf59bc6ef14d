//! # the-edit
//!
//! Change tracking for typed trees. An [`Editor`] owns a tree of plain Rust
//! structs, vectors and fixed arrays, and every edit made through it is
//! recorded as a compact binary event. Events group into actions that can be
//! undone and redone, arrays carry ordered selection lists that follow their
//! elements through every structural change, and an [`Observer`] hears about
//! each change as it happens.
//!
//! Types opt in through [`reflect!`], which gives every field a stable index
//! ([`Route::field`] takes these) and the codec the log uses.
//!
//! ```
//! use the_edit::{Editor, Route};
//!
//! the_edit::reflect! {
//!   #[derive(Debug, Clone, PartialEq)]
//!   pub struct Playlist {
//!     pub name:   String,
//!     pub tracks: Vec<String>,
//!   }
//! }
//!
//! let mut editor = Editor::new(Playlist { name: "mix".into(), tracks: vec![] });
//! let tracks = Route::root().field(Playlist::TRACKS);
//! editor.append_many(&tracks, ["b".to_string(), "a".to_string()]).unwrap();
//! editor.select(&tracks, 0).unwrap();
//! editor.sort::<String>(&tracks).unwrap();
//! assert_eq!(editor.tree().tracks, ["a", "b"]);
//! assert_eq!(editor.selection(&tracks).unwrap(), &[1]);
//!
//! editor.undo();
//! assert_eq!(editor.tree().tracks, ["b", "a"]);
//! ```

pub mod agent;
pub mod codec;
pub mod config;
pub mod editor;
pub mod history;
pub mod log;
pub mod moves;
pub mod observer;
pub mod path;
pub mod reflect;
pub mod replay;
pub mod selection;

#[doc(hidden)]
pub use paste;

pub use agent::{
  Arithmetic,
  Compound,
};
pub use codec::{
  Encode,
  IndexWidth,
};
pub use config::{
  Config,
  ConfigError,
};
pub use editor::{
  Action,
  EditError,
  Editor,
  EventInfo,
  Result,
};
pub use history::ActionInfo;
pub use log::Opcode;
pub use observer::{
  Notify,
  Observer,
};
pub use path::{
  Path,
  PathError,
  Route,
  Step,
};
pub use reflect::{
  Kind,
  Node,
  Value,
};
pub use selection::{
  SelectionError,
  Selections,
};
