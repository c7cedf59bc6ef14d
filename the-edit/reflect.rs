//! Runtime view over statically typed trees.
//!
//! The editor addresses nodes by member and element numbers, so it needs to
//! walk a tree without knowing its concrete types. [`Value`] is implemented by
//! every type that may appear in a tree; [`Node`] is its object-safe
//! counterpart, blanket-implemented for every `Value`. Arrays additionally
//! expose [`Seq`] and, when they can change length, [`Growable`].
//!
//! Structs become values through the [`reflect!`](crate::reflect!) macro:
//!
//! ```
//! the_edit::reflect! {
//!   #[derive(Debug, Clone, PartialEq)]
//!   pub struct Layer {
//!     pub name:   String => 255,
//!     pub weight: f32,
//!     pub tags:   Vec<String>,
//!   }
//! }
//!
//! assert_eq!(Layer::WEIGHT, 1);
//! assert_eq!(Layer::FIELDS[Layer::NAME].width, the_edit::IndexWidth::U8);
//! ```

use std::{
  any::Any,
  fmt::Debug,
};

use crate::{
  codec::{
    Decoder,
    Encode,
    Encoder,
    IndexWidth,
  },
  moves::{
    self,
    Rotation,
  },
};

/// Shape of a node as far as addressing is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
  Leaf,
  Optional,
  Struct,
  FixedArray,
  Array,
}

impl Kind {
  #[inline]
  pub const fn is_array(self) -> bool {
    matches!(self, Self::FixedArray | Self::Array)
  }
}

/// Static description of a struct member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
  pub name:      &'static str,
  pub type_name: &'static str,
  pub kind:      Kind,
  /// Width of counts and indices for this member, see [`IndexWidth::for_max`].
  pub width:     IndexWidth,
}

/// A type that can live inside an edited tree.
///
/// Only the associated items are required for leaves; structs get the rest
/// from [`reflect!`](crate::reflect!) and arrays from the impls in this module.
pub trait Value: Encode + Clone + Debug + 'static {
  const KIND: Kind = Kind::Leaf;

  /// Index width used when the value is a struct member without a declared
  /// maximum length.
  const WIDTH: IndexWidth = IndexWidth::DEFAULT;

  fn default_value() -> Self;

  fn fields() -> &'static [Field] {
    &[]
  }

  fn field(&self, _index: usize) -> Option<&dyn Node> {
    None
  }

  fn field_mut(&mut self, _index: usize) -> Option<&mut dyn Node> {
    None
  }

  fn as_seq(&self) -> Option<&dyn Seq> {
    None
  }

  fn as_seq_mut(&mut self) -> Option<&mut dyn Seq> {
    None
  }
}

/// Type-erased access to any [`Value`].
pub trait Node: Any + Debug {
  fn kind(&self) -> Kind;
  fn type_name(&self) -> &'static str;
  fn as_any(&self) -> &dyn Any;
  fn as_any_mut(&mut self) -> &mut dyn Any;

  fn encode_dyn(&self, enc: &mut Encoder, width: IndexWidth);
  /// Decode a fresh value of the same type.
  fn decode_dyn(&self, dec: &mut Decoder<'_>, width: IndexWidth) -> Box<dyn Node>;
  fn skip_dyn(&self, dec: &mut Decoder<'_>, width: IndexWidth);
  fn overflow_dyn(&self, width: IndexWidth) -> Option<usize>;

  /// Replace `self` with its type's default value.
  fn reset(&mut self);
  fn boxed(&self) -> Box<dyn Node>;
  fn default_boxed(&self) -> Box<dyn Node>;
  /// Exchange contents with `other`. Returns `false` if the types differ.
  fn swap_with(&mut self, other: &mut dyn Node) -> bool;

  fn fields(&self) -> &'static [Field];
  fn field(&self, index: usize) -> Option<&dyn Node>;
  fn field_mut(&mut self, index: usize) -> Option<&mut dyn Node>;
  fn as_seq(&self) -> Option<&dyn Seq>;
  fn as_seq_mut(&mut self) -> Option<&mut dyn Seq>;
}

impl<T: Value> Node for T {
  fn kind(&self) -> Kind {
    T::KIND
  }

  fn type_name(&self) -> &'static str {
    std::any::type_name::<T>()
  }

  fn as_any(&self) -> &dyn Any {
    self
  }

  fn as_any_mut(&mut self) -> &mut dyn Any {
    self
  }

  fn encode_dyn(&self, enc: &mut Encoder, width: IndexWidth) {
    self.encode(enc, width);
  }

  fn decode_dyn(&self, dec: &mut Decoder<'_>, width: IndexWidth) -> Box<dyn Node> {
    Box::new(T::decode(dec, width))
  }

  fn skip_dyn(&self, dec: &mut Decoder<'_>, width: IndexWidth) {
    T::skip(dec, width);
  }

  fn overflow_dyn(&self, width: IndexWidth) -> Option<usize> {
    self.overflow(width)
  }

  fn reset(&mut self) {
    *self = T::default_value();
  }

  fn boxed(&self) -> Box<dyn Node> {
    Box::new(self.clone())
  }

  fn default_boxed(&self) -> Box<dyn Node> {
    Box::new(T::default_value())
  }

  fn swap_with(&mut self, other: &mut dyn Node) -> bool {
    match other.as_any_mut().downcast_mut::<T>() {
      Some(other) => {
        std::mem::swap(self, other);
        true
      },
      None => false,
    }
  }

  fn fields(&self) -> &'static [Field] {
    <T as Value>::fields()
  }

  fn field(&self, index: usize) -> Option<&dyn Node> {
    Value::field(self, index)
  }

  fn field_mut(&mut self, index: usize) -> Option<&mut dyn Node> {
    Value::field_mut(self, index)
  }

  fn as_seq(&self) -> Option<&dyn Seq> {
    Value::as_seq(self)
  }

  fn as_seq_mut(&mut self) -> Option<&mut dyn Seq> {
    Value::as_seq_mut(self)
  }
}

impl dyn Node + '_ {
  pub fn is<V: Value>(&self) -> bool {
    self.as_any().is::<V>()
  }

  pub fn downcast_ref<V: Value>(&self) -> Option<&V> {
    self.as_any().downcast_ref::<V>()
  }

  pub fn downcast_mut<V: Value>(&mut self) -> Option<&mut V> {
    self.as_any_mut().downcast_mut::<V>()
  }
}

/// Object-safe view of an array, fixed or growable.
pub trait Seq {
  fn len(&self) -> usize;

  fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// `Some(N)` for `[E; N]`, `None` for growable arrays.
  fn fixed_len(&self) -> Option<usize>;
  fn capacity(&self) -> usize;
  fn element(&self, index: usize) -> Option<&dyn Node>;
  fn element_mut(&mut self, index: usize) -> Option<&mut dyn Node>;

  /// A default element, used to walk the shape below an array that has no
  /// element at the requested position.
  fn probe(&self) -> Box<dyn Node>;

  fn swap(&mut self, a: usize, b: usize);
  fn rotate(&mut self, rotation: Rotation);
  /// Reorder so that `new[k] == old[order[k]]`.
  fn permute(&mut self, order: &[usize]);
  fn encode_element(&self, index: usize, enc: &mut Encoder);
  fn growable(&mut self) -> Option<&mut dyn Growable>;
}

/// Length-changing operations, only available on `Vec<E>`.
///
/// Elements are always decoded at [`IndexWidth::DEFAULT`].
pub trait Growable: Seq {
  /// Ensure the total capacity is at least `capacity`.
  fn reserve(&mut self, capacity: usize);
  fn shrink_to(&mut self, capacity: usize);
  fn truncate(&mut self, len: usize);
  fn push_decoded(&mut self, dec: &mut Decoder<'_>);
  fn insert_decoded(&mut self, index: usize, dec: &mut Decoder<'_>);
  fn remove_element(&mut self, index: usize) -> Box<dyn Node>;
  /// Replace the contents with `len` copies of one decoded element.
  fn assign_decoded(&mut self, len: usize, dec: &mut Decoder<'_>);
  /// Replace the contents with `len` default elements.
  fn assign_default(&mut self, len: usize);
}

macro_rules! leaf {
  ($($ty:ty),* $(,)?) => {
    $(
      impl Value for $ty {
        fn default_value() -> Self {
          <$ty as Default>::default()
        }
      }
    )*
  };
}

leaf!(
  u8, i8, u16, i16, u32, i32, u64, i64, u128, i128, usize, isize, f32, f64, bool, char, (), String,
);

impl<E: Value> Value for Option<E> {
  const KIND: Kind = Kind::Optional;
  const WIDTH: IndexWidth = E::WIDTH;

  fn default_value() -> Self {
    None
  }
}

impl<E: Value> Value for Vec<E> {
  const KIND: Kind = Kind::Array;

  fn default_value() -> Self {
    Vec::new()
  }

  fn as_seq(&self) -> Option<&dyn Seq> {
    Some(self)
  }

  fn as_seq_mut(&mut self) -> Option<&mut dyn Seq> {
    Some(self)
  }
}

impl<E: Value> Seq for Vec<E> {
  fn len(&self) -> usize {
    Vec::len(self)
  }

  fn fixed_len(&self) -> Option<usize> {
    None
  }

  fn capacity(&self) -> usize {
    Vec::capacity(self)
  }

  fn element(&self, index: usize) -> Option<&dyn Node> {
    self.get(index).map(|element| element as &dyn Node)
  }

  fn element_mut(&mut self, index: usize) -> Option<&mut dyn Node> {
    self.get_mut(index).map(|element| element as &mut dyn Node)
  }

  fn probe(&self) -> Box<dyn Node> {
    Box::new(E::default_value())
  }

  fn swap(&mut self, a: usize, b: usize) {
    self.as_mut_slice().swap(a, b);
  }

  fn rotate(&mut self, rotation: Rotation) {
    rotation.apply(self.as_mut_slice());
  }

  fn permute(&mut self, order: &[usize]) {
    moves::permute_slice(self.as_mut_slice(), order);
  }

  fn encode_element(&self, index: usize, enc: &mut Encoder) {
    self[index].encode(enc, IndexWidth::DEFAULT);
  }

  fn growable(&mut self) -> Option<&mut dyn Growable> {
    Some(self)
  }
}

impl<E: Value> Growable for Vec<E> {
  fn reserve(&mut self, capacity: usize) {
    if capacity > Vec::capacity(self) {
      self.reserve_exact(capacity - Vec::len(self));
    }
  }

  fn shrink_to(&mut self, capacity: usize) {
    Vec::shrink_to(self, capacity);
  }

  fn truncate(&mut self, len: usize) {
    Vec::truncate(self, len);
  }

  fn push_decoded(&mut self, dec: &mut Decoder<'_>) {
    self.push(E::decode(dec, IndexWidth::DEFAULT));
  }

  fn insert_decoded(&mut self, index: usize, dec: &mut Decoder<'_>) {
    self.insert(index, E::decode(dec, IndexWidth::DEFAULT));
  }

  fn remove_element(&mut self, index: usize) -> Box<dyn Node> {
    Box::new(self.remove(index))
  }

  fn assign_decoded(&mut self, len: usize, dec: &mut Decoder<'_>) {
    let element = E::decode(dec, IndexWidth::DEFAULT);
    self.clear();
    self.resize(len, element);
  }

  fn assign_default(&mut self, len: usize) {
    self.clear();
    self.resize_with(len, E::default_value);
  }
}

impl<E: Value, const N: usize> Value for [E; N] {
  const KIND: Kind = Kind::FixedArray;
  const WIDTH: IndexWidth = IndexWidth::for_max(N);

  fn default_value() -> Self {
    std::array::from_fn(|_| E::default_value())
  }

  fn as_seq(&self) -> Option<&dyn Seq> {
    Some(self)
  }

  fn as_seq_mut(&mut self) -> Option<&mut dyn Seq> {
    Some(self)
  }
}

impl<E: Value, const N: usize> Seq for [E; N] {
  fn len(&self) -> usize {
    N
  }

  fn fixed_len(&self) -> Option<usize> {
    Some(N)
  }

  fn capacity(&self) -> usize {
    N
  }

  fn element(&self, index: usize) -> Option<&dyn Node> {
    self.get(index).map(|element| element as &dyn Node)
  }

  fn element_mut(&mut self, index: usize) -> Option<&mut dyn Node> {
    self.get_mut(index).map(|element| element as &mut dyn Node)
  }

  fn probe(&self) -> Box<dyn Node> {
    Box::new(E::default_value())
  }

  fn swap(&mut self, a: usize, b: usize) {
    self.as_mut_slice().swap(a, b);
  }

  fn rotate(&mut self, rotation: Rotation) {
    rotation.apply(self.as_mut_slice());
  }

  fn permute(&mut self, order: &[usize]) {
    moves::permute_slice(self.as_mut_slice(), order);
  }

  fn encode_element(&self, index: usize, enc: &mut Encoder) {
    self[index].encode(enc, IndexWidth::DEFAULT);
  }

  fn growable(&mut self) -> Option<&mut dyn Growable> {
    None
  }
}

/// Declare a struct that can be edited as part of a tree.
///
/// Generates the struct itself, a `pub const` index per member named after the
/// member in upper case, a `FIELDS` table and the [`Value`] and [`Encode`]
/// impls. A member may be followed by `=> max_len` to declare the largest
/// length it will ever hold, which narrows the width of its logged counts and
/// indices. The struct must derive `Clone` and `Debug`, and may have at most 63
/// members.
#[macro_export]
macro_rules! reflect {
  (
    $(#[$meta:meta])*
    $vis:vis struct $name:ident {
      $(
        $(#[$field_meta:meta])*
        $field_vis:vis $field:ident : $ty:ty $(=> $max:expr)?
      ),* $(,)?
    }
  ) => {
    $(#[$meta])*
    $vis struct $name {
      $(
        $(#[$field_meta])*
        $field_vis $field: $ty,
      )*
    }

    $crate::paste::paste! {
      #[allow(non_camel_case_types, dead_code)]
      #[derive(Clone, Copy)]
      enum [<__ $name Members>] {
        $( $field, )*
      }

      #[allow(dead_code)]
      impl $name {
        $(
          pub const [<$field:upper>]: usize = [<__ $name Members>]::$field as usize;
        )*

        pub const FIELDS: &'static [$crate::reflect::Field] = &[
          $(
            $crate::reflect::Field {
              name:      stringify!($field),
              type_name: stringify!($ty),
              kind:      <$ty as $crate::reflect::Value>::KIND,
              width:     $crate::__reflect_width!($ty $(, $max)?),
            },
          )*
        ];
      }

      const _: () = assert!(
        $name::FIELDS.len() <= 63,
        concat!(stringify!($name), " declares more than 63 members")
      );

      impl $crate::codec::Encode for $name {
        fn encode(&self, enc: &mut $crate::codec::Encoder, _: $crate::codec::IndexWidth) {
          $(
            $crate::codec::Encode::encode(
              &self.$field,
              enc,
              Self::FIELDS[Self::[<$field:upper>]].width,
            );
          )*
        }

        fn decode(
          dec: &mut $crate::codec::Decoder<'_>,
          _: $crate::codec::IndexWidth,
        ) -> Self {
          Self {
            $(
              $field: <$ty as $crate::codec::Encode>::decode(
                dec,
                Self::FIELDS[Self::[<$field:upper>]].width,
              ),
            )*
          }
        }

        fn skip(dec: &mut $crate::codec::Decoder<'_>, _: $crate::codec::IndexWidth) {
          $(
            <$ty as $crate::codec::Encode>::skip(dec, Self::FIELDS[Self::[<$field:upper>]].width);
          )*
        }

        fn overflow(&self, _: $crate::codec::IndexWidth) -> Option<usize> {
          None
            $(
              .or_else(|| {
                $crate::codec::Encode::overflow(
                  &self.$field,
                  Self::FIELDS[Self::[<$field:upper>]].width,
                )
              })
            )*
        }
      }

      impl $crate::reflect::Value for $name {
        const KIND: $crate::reflect::Kind = $crate::reflect::Kind::Struct;

        fn default_value() -> Self {
          Self {
            $( $field: <$ty as $crate::reflect::Value>::default_value(), )*
          }
        }

        fn fields() -> &'static [$crate::reflect::Field] {
          Self::FIELDS
        }

        fn field(&self, index: usize) -> Option<&dyn $crate::reflect::Node> {
          $(
            if index == Self::[<$field:upper>] {
              return Some(&self.$field);
            }
          )*
          None
        }

        fn field_mut(&mut self, index: usize) -> Option<&mut dyn $crate::reflect::Node> {
          $(
            if index == Self::[<$field:upper>] {
              return Some(&mut self.$field);
            }
          )*
          None
        }
      }
    }
  };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __reflect_width {
  ($ty:ty) => {
    <$ty as $crate::reflect::Value>::WIDTH
  };
  ($ty:ty, $max:expr) => {
    $crate::codec::IndexWidth::for_max($max)
  };
}
