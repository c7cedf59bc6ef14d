//! Byte-level value codec for the event log.
//!
//! Every value stored in the log goes through [`Encode`]. The encoding is not
//! self-describing: the reader must know the type it is decoding, which is
//! always the case because the log is only ever read back against the same
//! tree that produced it.
//!
//! # Layout
//!
//! - Integers and floats are little-endian at their natural size (`usize` and
//!   `isize` always use 8 bytes).
//! - `bool` is one byte, `char` is its `u32` scalar value, `()` is empty.
//! - `String` is a length in the field's [`IndexWidth`] followed by UTF-8.
//! - `Option<T>` is a presence byte followed by the payload when present.
//! - `Vec<T>` and `[T; N]` are a count in the field's [`IndexWidth`] followed by
//!   each element. Elements always use [`IndexWidth::DEFAULT`]: only the field
//!   itself carries a declared width.
//!
//! Decoding consumes exactly the bytes encoding produced. There is no bounds
//! validation beyond what [`bytes::Buf`] panics on: foreign input is not
//! supported.

use bytes::{
  Buf,
  BufMut,
  BytesMut,
};

/// Width of an explicit index, count or length in the log.
///
/// Chosen per field from its declared (or default) maximum length so that
/// small collections keep the log compact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexWidth {
  U8,
  U16,
  U32,
  U64,
}

impl IndexWidth {
  /// Width used for fields without a declared maximum length and for the
  /// arrays nested inside array elements.
  pub const DEFAULT: Self = Self::U32;

  /// Smallest width able to hold every count up to and including `max`.
  pub const fn for_max(max: usize) -> Self {
    if max <= u8::MAX as usize {
      Self::U8
    } else if max <= u16::MAX as usize {
      Self::U16
    } else if max as u64 <= u32::MAX as u64 {
      Self::U32
    } else {
      Self::U64
    }
  }

  /// Number of bytes an index of this width occupies.
  pub const fn bytes(self) -> usize {
    match self {
      Self::U8 => 1,
      Self::U16 => 2,
      Self::U32 => 4,
      Self::U64 => 8,
    }
  }

  /// Largest value representable at this width.
  pub const fn max(self) -> u64 {
    match self {
      Self::U8 => u8::MAX as u64,
      Self::U16 => u16::MAX as u64,
      Self::U32 => u32::MAX as u64,
      Self::U64 => u64::MAX,
    }
  }

  #[inline]
  pub const fn fits(self, value: usize) -> bool {
    value as u64 <= self.max()
  }
}

/// Append-only byte writer backed by [`BytesMut`].
#[derive(Debug, Default, Clone)]
pub struct Encoder {
  buf: BytesMut,
}

impl Encoder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      buf: BytesMut::with_capacity(capacity),
    }
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.buf.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.buf.is_empty()
  }

  #[inline]
  pub fn as_bytes(&self) -> &[u8] {
    &self.buf
  }

  pub fn into_inner(self) -> BytesMut {
    self.buf
  }

  #[inline]
  pub fn u8(&mut self, value: u8) {
    self.buf.put_u8(value);
  }

  #[inline]
  pub fn flag(&mut self, value: bool) {
    self.buf.put_u8(u8::from(value));
  }

  /// Write `value` using exactly `width.bytes()` bytes.
  ///
  /// # Panics
  ///
  /// If `value` does not fit `width`. Edits check every count they log
  /// against the width beforehand, see [`Encode::overflow`].
  pub fn index(&mut self, value: usize, width: IndexWidth) {
    assert!(width.fits(value), "index {value} does not fit in {width:?}");
    match width {
      IndexWidth::U8 => self.buf.put_u8(value as u8),
      IndexWidth::U16 => self.buf.put_u16_le(value as u16),
      IndexWidth::U32 => self.buf.put_u32_le(value as u32),
      IndexWidth::U64 => self.buf.put_u64_le(value as u64),
    }
  }

  /// Write a list of indices prefixed by its length, all at `width`.
  pub fn indices(&mut self, values: &[usize], width: IndexWidth) {
    self.index(values.len(), width);
    for &value in values {
      self.index(value, width);
    }
  }

  /// LEB128 unsigned varint.
  pub fn varint(&mut self, mut value: u64) {
    loop {
      let byte = (value & 0x7f) as u8;
      value >>= 7;
      if value == 0 {
        self.buf.put_u8(byte);
        return;
      }
      self.buf.put_u8(byte | 0x80);
    }
  }

  #[inline]
  pub fn bytes(&mut self, bytes: &[u8]) {
    self.buf.put_slice(bytes);
  }
}

/// Cursor over an encoded byte slice.
///
/// Cloning a decoder is cheap and yields an independent cursor at the same
/// position, which is how multi-record payloads are scanned ahead and then
/// replayed in reverse.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
  buf: &'a [u8],
  len: usize,
}

impl<'a> Decoder<'a> {
  pub fn new(buf: &'a [u8]) -> Self {
    Self {
      buf,
      len: buf.len(),
    }
  }

  /// Number of bytes consumed so far.
  #[inline]
  pub fn position(&self) -> usize {
    self.len - self.buf.remaining()
  }

  #[inline]
  pub fn remaining(&self) -> usize {
    self.buf.remaining()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    !self.buf.has_remaining()
  }

  #[inline]
  pub fn u8(&mut self) -> u8 {
    self.buf.get_u8()
  }

  #[inline]
  pub fn flag(&mut self) -> bool {
    self.buf.get_u8() != 0
  }

  pub fn index(&mut self, width: IndexWidth) -> usize {
    match width {
      IndexWidth::U8 => self.buf.get_u8() as usize,
      IndexWidth::U16 => self.buf.get_u16_le() as usize,
      IndexWidth::U32 => self.buf.get_u32_le() as usize,
      IndexWidth::U64 => self.buf.get_u64_le() as usize,
    }
  }

  pub fn indices(&mut self, width: IndexWidth) -> Vec<usize> {
    let len = self.index(width);
    (0..len).map(|_| self.index(width)).collect()
  }

  pub fn varint(&mut self) -> u64 {
    let mut value = 0u64;
    let mut shift = 0;
    loop {
      let byte = self.buf.get_u8();
      value |= u64::from(byte & 0x7f) << shift;
      if byte & 0x80 == 0 {
        return value;
      }
      shift += 7;
    }
  }

  pub fn bytes(&mut self, len: usize) -> &'a [u8] {
    let (head, tail) = self.buf.split_at(len);
    self.buf = tail;
    head
  }
}

/// Binary encoding of a value at a given field width.
///
/// `width` only affects types that write a count or length (strings and
/// arrays); everything else ignores it.
pub trait Encode: Sized {
  fn encode(&self, enc: &mut Encoder, width: IndexWidth);

  fn decode(dec: &mut Decoder<'_>, width: IndexWidth) -> Self;

  /// Advance `dec` past one encoded value.
  fn skip(dec: &mut Decoder<'_>, width: IndexWidth) {
    let _ = Self::decode(dec, width);
  }

  /// First count or length in the encoding of `self` that does not fit the
  /// width it would be written at.
  fn overflow(&self, _width: IndexWidth) -> Option<usize> {
    None
  }
}

macro_rules! encode_number {
  ($($ty:ty => $put:ident, $get:ident;)*) => {
    $(
      impl Encode for $ty {
        #[inline]
        fn encode(&self, enc: &mut Encoder, _: IndexWidth) {
          enc.buf.$put(*self);
        }

        #[inline]
        fn decode(dec: &mut Decoder<'_>, _: IndexWidth) -> Self {
          dec.buf.$get()
        }

        #[inline]
        fn skip(dec: &mut Decoder<'_>, _: IndexWidth) {
          dec.buf.advance(std::mem::size_of::<$ty>());
        }
      }
    )*
  };
}

encode_number! {
  u8 => put_u8, get_u8;
  i8 => put_i8, get_i8;
  u16 => put_u16_le, get_u16_le;
  i16 => put_i16_le, get_i16_le;
  u32 => put_u32_le, get_u32_le;
  i32 => put_i32_le, get_i32_le;
  u64 => put_u64_le, get_u64_le;
  i64 => put_i64_le, get_i64_le;
  u128 => put_u128_le, get_u128_le;
  i128 => put_i128_le, get_i128_le;
  f32 => put_f32_le, get_f32_le;
  f64 => put_f64_le, get_f64_le;
}

impl Encode for usize {
  fn encode(&self, enc: &mut Encoder, _: IndexWidth) {
    enc.buf.put_u64_le(*self as u64);
  }

  fn decode(dec: &mut Decoder<'_>, _: IndexWidth) -> Self {
    dec.buf.get_u64_le() as usize
  }
}

impl Encode for isize {
  fn encode(&self, enc: &mut Encoder, _: IndexWidth) {
    enc.buf.put_i64_le(*self as i64);
  }

  fn decode(dec: &mut Decoder<'_>, _: IndexWidth) -> Self {
    dec.buf.get_i64_le() as isize
  }
}

impl Encode for bool {
  fn encode(&self, enc: &mut Encoder, _: IndexWidth) {
    enc.flag(*self);
  }

  fn decode(dec: &mut Decoder<'_>, _: IndexWidth) -> Self {
    dec.flag()
  }
}

impl Encode for char {
  fn encode(&self, enc: &mut Encoder, _: IndexWidth) {
    enc.buf.put_u32_le(u32::from(*self));
  }

  fn decode(dec: &mut Decoder<'_>, _: IndexWidth) -> Self {
    char::from_u32(dec.buf.get_u32_le()).unwrap_or(char::REPLACEMENT_CHARACTER)
  }
}

impl Encode for () {
  fn encode(&self, _: &mut Encoder, _: IndexWidth) {}

  fn decode(_: &mut Decoder<'_>, _: IndexWidth) -> Self {}
}

impl Encode for String {
  fn encode(&self, enc: &mut Encoder, width: IndexWidth) {
    enc.index(self.len(), width);
    enc.bytes(self.as_bytes());
  }

  fn decode(dec: &mut Decoder<'_>, width: IndexWidth) -> Self {
    let len = dec.index(width);
    String::from_utf8_lossy(dec.bytes(len)).into_owned()
  }

  fn skip(dec: &mut Decoder<'_>, width: IndexWidth) {
    let len = dec.index(width);
    dec.buf.advance(len);
  }

  fn overflow(&self, width: IndexWidth) -> Option<usize> {
    (!width.fits(self.len())).then_some(self.len())
  }
}

impl<T: Encode> Encode for Option<T> {
  fn encode(&self, enc: &mut Encoder, width: IndexWidth) {
    enc.flag(self.is_some());
    if let Some(value) = self {
      value.encode(enc, width);
    }
  }

  fn decode(dec: &mut Decoder<'_>, width: IndexWidth) -> Self {
    dec.flag().then(|| T::decode(dec, width))
  }

  fn skip(dec: &mut Decoder<'_>, width: IndexWidth) {
    if dec.flag() {
      T::skip(dec, width);
    }
  }

  fn overflow(&self, width: IndexWidth) -> Option<usize> {
    self.as_ref()?.overflow(width)
  }
}

fn elements_overflow<T: Encode>(elements: &[T], width: IndexWidth) -> Option<usize> {
  if !width.fits(elements.len()) {
    return Some(elements.len());
  }
  elements
    .iter()
    .find_map(|element| element.overflow(IndexWidth::DEFAULT))
}

impl<T: Encode> Encode for Vec<T> {
  fn encode(&self, enc: &mut Encoder, width: IndexWidth) {
    enc.index(self.len(), width);
    for element in self {
      element.encode(enc, IndexWidth::DEFAULT);
    }
  }

  fn decode(dec: &mut Decoder<'_>, width: IndexWidth) -> Self {
    let len = dec.index(width);
    (0..len)
      .map(|_| T::decode(dec, IndexWidth::DEFAULT))
      .collect()
  }

  fn skip(dec: &mut Decoder<'_>, width: IndexWidth) {
    let len = dec.index(width);
    for _ in 0..len {
      T::skip(dec, IndexWidth::DEFAULT);
    }
  }

  fn overflow(&self, width: IndexWidth) -> Option<usize> {
    elements_overflow(self, width)
  }
}

impl<T: Encode, const N: usize> Encode for [T; N] {
  fn encode(&self, enc: &mut Encoder, width: IndexWidth) {
    enc.index(N, width);
    for element in self {
      element.encode(enc, IndexWidth::DEFAULT);
    }
  }

  fn decode(dec: &mut Decoder<'_>, width: IndexWidth) -> Self {
    let len = dec.index(width);
    debug_assert_eq!(len, N, "fixed array length mismatch in log");
    std::array::from_fn(|_| T::decode(dec, IndexWidth::DEFAULT))
  }

  fn skip(dec: &mut Decoder<'_>, width: IndexWidth) {
    let len = dec.index(width);
    for _ in 0..len {
      T::skip(dec, IndexWidth::DEFAULT);
    }
  }

  fn overflow(&self, width: IndexWidth) -> Option<usize> {
    elements_overflow(self, width)
  }
}
