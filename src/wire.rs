//! Field keys and wire types of the [protobuf](https://protobuf.dev) binary
//! format, plus the zig-zag mapping used by `sint32`/`sint64`.

use core::num::NonZeroU64;

use static_assertions::assert_eq_size;

/// Smallest field number a message schema may assign.
pub const MIN_FIELD_NUMBER: u32 = 1;
/// Largest field number a message schema may assign.
pub const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;

/// The low-level encoding of a field value, carried in the low three bits of
/// every field key.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum WireType {
    /// Variable length integer.
    ///
    /// Used for: `int32`, `int64`, `uint32`, `uint64`, `sint32`, `sint64`,
    /// `bool`, `enum`.
    Varint = 0,
    /// Little-endian 64-bit value.
    ///
    /// Used for: `fixed64`, `sfixed64`, `double`.
    Fixed64 = 1,
    /// Length-prefixed payload.
    ///
    /// Used for: `string`, `bytes`, embedded messages, packed `repeated`
    /// fields.
    LengthDelimited = 2,
    /// Opens a group (pre-proto3 nested-message encoding).
    StartGroup = 3,
    /// Closes a group; its field number must match the opening tag.
    EndGroup = 4,
    /// Little-endian 32-bit value.
    ///
    /// Used for: `fixed32`, `sfixed32`, `float`.
    Fixed32 = 5,
}

impl WireType {
    /// Largest raw value that names a wire type.
    const MAX_RAW: u8 = WireType::Fixed32 as u8;

    // The transmute in `from_raw` relies on the discriminants being the
    // contiguous wire-format values. Reordering the enum breaks this build.
    const _DISCRIMINANT_CHECK: () = {
        assert!(WireType::Varint as u8 == 0);
        assert!(WireType::Fixed64 as u8 == 1);
        assert!(WireType::LengthDelimited as u8 == 2);
        assert!(WireType::StartGroup as u8 == 3);
        assert!(WireType::EndGroup as u8 == 4);
        assert!(WireType::Fixed32 as u8 == 5);
    };

    /// Decode a [`WireType`] from its raw three-bit value.
    #[inline(always)]
    pub fn from_raw(raw: u8) -> Option<WireType> {
        if raw <= Self::MAX_RAW {
            // SAFETY: raw is within the declared discriminant range and both
            // types are one byte.
            Some(unsafe { core::mem::transmute::<u8, WireType>(raw) })
        } else {
            None
        }
    }

    /// The raw three-bit value of this wire type.
    #[inline(always)]
    pub const fn into_raw(self) -> u8 {
        self as u8
    }
}

/// A decoded field key: a field number and a [`WireType`] packed the way the
/// wire carries them, `(field_number << 3) | wire_type`.
///
/// Packed into a [`NonZeroU64`] so `Result<Option<FieldKey>, _>` returns stay
/// in registers and `Option<FieldKey>` costs nothing. Field numbers start at
/// one, so a valid raw key is never zero.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct FieldKey(NonZeroU64);

assert_eq_size!(FieldKey, u64);
assert_eq_size!(Option<FieldKey>, FieldKey);

impl FieldKey {
    /// Builds the key for `field_number` encoded as `wire_type`.
    ///
    /// # Panics
    ///
    /// Panics if `field_number` is outside
    /// [`MIN_FIELD_NUMBER`]..=[`MAX_FIELD_NUMBER`].
    #[inline]
    pub fn new(field_number: u32, wire_type: WireType) -> FieldKey {
        assert!(
            (MIN_FIELD_NUMBER..=MAX_FIELD_NUMBER).contains(&field_number),
            "field number {field_number} out of range",
        );
        let raw = (field_number << 3) | u32::from(wire_type.into_raw());
        // SAFETY: field_number >= 1 makes raw >= 8.
        FieldKey(unsafe { NonZeroU64::new_unchecked(u64::from(raw)) })
    }

    /// Validates a raw key read off the wire.
    ///
    /// Returns `None` when the wire type is undefined or the field number is
    /// zero. Field numbers cannot exceed [`MAX_FIELD_NUMBER`]: the raw key is
    /// 32 bits and the largest field number occupies exactly the upper 29.
    #[inline(always)]
    pub fn from_raw(raw: u32) -> Option<FieldKey> {
        #[allow(clippy::as_conversions)]
        WireType::from_raw((raw & 0b111) as u8)?;
        if raw >> 3 == 0 {
            return None;
        }
        // SAFETY: a non-zero field number makes raw non-zero.
        Some(FieldKey(unsafe {
            NonZeroU64::new_unchecked(u64::from(raw))
        }))
    }

    /// The field number in the key's upper 29 bits.
    #[inline(always)]
    #[allow(clippy::as_conversions)]
    pub const fn field_number(self) -> u32 {
        (self.0.get() >> 3) as u32
    }

    /// The [`WireType`] in the key's low three bits.
    #[inline(always)]
    #[allow(clippy::as_conversions)]
    pub const fn wire_type(self) -> WireType {
        let raw = (self.0.get() & 0b111) as u8;
        // SAFETY: the wire type was validated during construction.
        unsafe { core::mem::transmute::<u8, WireType>(raw) }
    }

    /// The packed on-the-wire value of this key.
    #[inline(always)]
    #[allow(clippy::as_conversions)]
    pub const fn raw(self) -> u32 {
        self.0.get() as u32
    }
}

impl core::fmt::Debug for FieldKey {
    #[cold]
    #[inline(never)]
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FieldKey")
            .field("field_number", &self.field_number())
            .field("wire_type", &self.wire_type())
            .finish()
    }
}

/// Maps a signed 32-bit value onto the unsigned range so that small
/// magnitudes encode as short varints.
#[inline(always)]
#[allow(clippy::as_conversions)]
pub fn zigzag_encode32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

/// Inverse of [`zigzag_encode32`].
#[inline(always)]
#[allow(clippy::as_conversions)]
pub fn zigzag_decode32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

/// Maps a signed 64-bit value onto the unsigned range so that small
/// magnitudes encode as short varints.
#[inline(always)]
#[allow(clippy::as_conversions)]
pub fn zigzag_encode64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Inverse of [`zigzag_encode64`].
#[inline(always)]
#[allow(clippy::as_conversions)]
pub fn zigzag_decode64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}
