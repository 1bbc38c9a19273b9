//! Untagged value transport for arguments and return values.
//!
//! This module provides [`ValueCarrier`], the fixed-size union used to move one
//! argument or return value across the boundary between the runtime's native call
//! frames and observer code, together with the out-of-band type information needed
//! to read it back:
//!
//! - [`ValueCarrier`]: 8-byte `#[repr(C)]` union with no discriminant
//! - [`ValueKind`]: The closed set of members a carrier can hold
//! - [`TypedValue`]: A decoded, tagged copy of a carrier's value
//! - [`MethodSignature`]: Declared parameter and return kinds of a method
//! - [`ManagedObject`] / [`ManagedString`]: Opaque handles into the managed heap
//!
//! # Reading Carriers
//!
//! A carrier does not know which member it holds. The caller must request the member
//! matching the declared type of the slot, which only the signature resolver knows:
//!
//! ```rust
//! use hybridscope::hook::{MethodSignature, ValueCarrier, ValueKind, TypedValue};
//!
//! let args = [ValueCarrier::from_i32(25), ValueCarrier::from_bool(true)];
//! let signature = MethodSignature::new([ValueKind::I32, ValueKind::Bool], None);
//!
//! assert_eq!(args[0].as_i32(), 25);
//! assert_eq!(
//!     signature.decode_args(&args),
//!     vec![TypedValue::I32(25), TypedValue::Bool(true)]
//! );
//! ```
//!
//! # Soundness
//!
//! Every constructor zero-fills all eight bytes before writing its member, so every
//! accessor reads fully initialized bits. Reading a member other than the one the
//! carrier was built from reinterprets those bits: the value is meaningless, but the
//! read is not undefined behavior. Reference members are raw pointers; dereferencing
//! them is the caller's responsibility and is only valid while the intercepted call
//! is in progress.

use std::{
    ffi::c_void,
    fmt,
    marker::{PhantomData, PhantomPinned},
};

use strum::{Display, EnumIter, EnumString};

/// Opaque handle to an object living in the managed heap.
///
/// Never constructed on the Rust side; only ever seen behind a raw pointer.
#[repr(C)]
pub struct ManagedObject {
    _data: [u8; 0],
    _marker: PhantomData<(*mut u8, PhantomPinned)>,
}

/// Opaque handle to a managed string.
#[repr(C)]
pub struct ManagedString {
    _data: [u8; 0],
    _marker: PhantomData<(*mut u8, PhantomPinned)>,
}

/// Fixed-size, untagged carrier for one argument or return value.
///
/// Layout-compatible with the runtime's 64-bit argument slot. The member that is
/// semantically valid is implied by the matched method's declared signature and is
/// never stored alongside the value.
///
/// A carrier is a non-owning view: managed references inside it are only valid for
/// the duration of the intercepted call it was built for.
#[repr(C)]
#[derive(Clone, Copy)]
pub union ValueCarrier {
    raw: u64,
    ptr: *mut c_void,
    boolean: bool,
    int8: i8,
    uint8: u8,
    int16: i16,
    uint16: u16,
    int32: i32,
    uint32: u32,
    int64: i64,
    uint64: u64,
    float32: f32,
    float64: f64,
    object: *mut ManagedObject,
    string: *mut ManagedString,
    object_ref: *mut *mut ManagedObject,
}

const _: () = assert!(std::mem::size_of::<ValueCarrier>() == 8);

macro_rules! carrier_members {
    ($($field:ident: $ty:ty => $from:ident, $read:ident;)*) => {
        impl ValueCarrier {
            $(
                #[doc = concat!("Creates a carrier holding a `", stringify!($ty), "`.")]
                #[must_use]
                #[inline]
                pub fn $from(value: $ty) -> Self {
                    let mut carrier = Self::ZERO;
                    carrier.$field = value;
                    carrier
                }

                #[doc = concat!("Reads the `", stringify!($ty), "` member.")]
                #[must_use]
                #[inline]
                pub fn $read(&self) -> $ty {
                    // SAFETY: all eight bytes are initialized by every constructor and
                    // any bit pattern is a valid value of this member's type.
                    unsafe { self.$field }
                }
            )*
        }

        $(
            impl From<$ty> for ValueCarrier {
                #[inline]
                fn from(value: $ty) -> Self {
                    Self::$from(value)
                }
            }
        )*
    };
}

carrier_members! {
    ptr: *mut c_void => from_ptr, as_ptr;
    int8: i8 => from_i8, as_i8;
    uint8: u8 => from_u8, as_u8;
    int16: i16 => from_i16, as_i16;
    uint16: u16 => from_u16, as_u16;
    int32: i32 => from_i32, as_i32;
    uint32: u32 => from_u32, as_u32;
    int64: i64 => from_i64, as_i64;
    uint64: u64 => from_u64, as_u64;
    float32: f32 => from_f32, as_f32;
    float64: f64 => from_f64, as_f64;
    object: *mut ManagedObject => from_object, as_object;
    string: *mut ManagedString => from_string, as_string;
    object_ref: *mut *mut ManagedObject => from_object_ref, as_object_ref;
}

impl ValueCarrier {
    const ZERO: Self = Self { raw: 0 };

    /// Creates a carrier from the raw 64-bit slot contents.
    ///
    /// This is the scratch member: trampolines that copy argument registers or stack
    /// slots verbatim build carriers through this constructor.
    #[must_use]
    #[inline]
    pub fn from_raw(bits: u64) -> Self {
        Self { raw: bits }
    }

    /// Returns the raw 64-bit slot contents.
    #[must_use]
    #[inline]
    pub fn raw(&self) -> u64 {
        // SAFETY: all eight bytes are always initialized.
        unsafe { self.raw }
    }

    /// Creates a carrier holding a `bool`.
    #[must_use]
    #[inline]
    pub fn from_bool(value: bool) -> Self {
        let mut carrier = Self::ZERO;
        carrier.boolean = value;
        carrier
    }

    /// Reads the `bool` member.
    ///
    /// Any non-zero low byte reads as `true`, so a mismatched read never produces an
    /// invalid `bool`.
    #[must_use]
    #[inline]
    pub fn as_bool(&self) -> bool {
        // SAFETY: the byte is initialized; reading it as `u8` accepts every pattern.
        unsafe { self.uint8 != 0 }
    }

    /// Decodes the carrier as the given kind.
    ///
    /// The kind must come from the method's declared signature; see the module
    /// documentation for what happens when it does not.
    #[must_use]
    pub fn read(&self, kind: ValueKind) -> TypedValue {
        match kind {
            ValueKind::Raw => TypedValue::Raw(self.raw()),
            ValueKind::Pointer => TypedValue::Pointer(self.as_ptr()),
            ValueKind::Bool => TypedValue::Bool(self.as_bool()),
            ValueKind::I8 => TypedValue::I8(self.as_i8()),
            ValueKind::U8 => TypedValue::U8(self.as_u8()),
            ValueKind::I16 => TypedValue::I16(self.as_i16()),
            ValueKind::U16 => TypedValue::U16(self.as_u16()),
            ValueKind::I32 => TypedValue::I32(self.as_i32()),
            ValueKind::U32 => TypedValue::U32(self.as_u32()),
            ValueKind::I64 => TypedValue::I64(self.as_i64()),
            ValueKind::U64 => TypedValue::U64(self.as_u64()),
            ValueKind::F32 => TypedValue::F32(self.as_f32()),
            ValueKind::F64 => TypedValue::F64(self.as_f64()),
            ValueKind::Object => TypedValue::Object(self.as_object()),
            ValueKind::String => TypedValue::String(self.as_string()),
            ValueKind::ObjectRef => TypedValue::ObjectRef(self.as_object_ref()),
        }
    }
}

impl From<bool> for ValueCarrier {
    #[inline]
    fn from(value: bool) -> Self {
        Self::from_bool(value)
    }
}

impl Default for ValueCarrier {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Debug for ValueCarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueCarrier({:#018x})", self.raw())
    }
}

/// The members a [`ValueCarrier`] can hold.
///
/// This is out-of-band signature knowledge: it is never stored inside a carrier.
/// The string forms (`"i32"`, `"object_ref"`, ...) are accepted by
/// [`FromStr`](std::str::FromStr).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum ValueKind {
    /// Raw 64-bit scratch slot
    Raw,
    /// Opaque native pointer
    Pointer,
    /// `System.Boolean`
    Bool,
    /// `System.SByte`
    I8,
    /// `System.Byte`
    U8,
    /// `System.Int16`
    I16,
    /// `System.UInt16`
    U16,
    /// `System.Int32`
    I32,
    /// `System.UInt32`
    U32,
    /// `System.Int64`
    I64,
    /// `System.UInt64`
    U64,
    /// `System.Single`
    F32,
    /// `System.Double`
    F64,
    /// Reference to a managed object
    Object,
    /// Reference to a managed string
    String,
    /// `ref` / `out` parameter holding an object reference
    ObjectRef,
}

/// A carrier value decoded with its kind attached.
///
/// Produced by [`ValueCarrier::read`]; converts back into a carrier with
/// [`From`]. The tag lives here, never in the carrier itself.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TypedValue {
    /// Raw 64-bit scratch slot
    Raw(u64),
    /// Opaque native pointer
    Pointer(*mut c_void),
    /// Boolean
    Bool(bool),
    /// Signed 8-bit integer
    I8(i8),
    /// Unsigned 8-bit integer
    U8(u8),
    /// Signed 16-bit integer
    I16(i16),
    /// Unsigned 16-bit integer
    U16(u16),
    /// Signed 32-bit integer
    I32(i32),
    /// Unsigned 32-bit integer
    U32(u32),
    /// Signed 64-bit integer
    I64(i64),
    /// Unsigned 64-bit integer
    U64(u64),
    /// 32-bit float
    F32(f32),
    /// 64-bit float
    F64(f64),
    /// Managed object reference
    Object(*mut ManagedObject),
    /// Managed string reference
    String(*mut ManagedString),
    /// Reference to an object reference
    ObjectRef(*mut *mut ManagedObject),
}

impl TypedValue {
    /// Returns the kind of this value.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            TypedValue::Raw(_) => ValueKind::Raw,
            TypedValue::Pointer(_) => ValueKind::Pointer,
            TypedValue::Bool(_) => ValueKind::Bool,
            TypedValue::I8(_) => ValueKind::I8,
            TypedValue::U8(_) => ValueKind::U8,
            TypedValue::I16(_) => ValueKind::I16,
            TypedValue::U16(_) => ValueKind::U16,
            TypedValue::I32(_) => ValueKind::I32,
            TypedValue::U32(_) => ValueKind::U32,
            TypedValue::I64(_) => ValueKind::I64,
            TypedValue::U64(_) => ValueKind::U64,
            TypedValue::F32(_) => ValueKind::F32,
            TypedValue::F64(_) => ValueKind::F64,
            TypedValue::Object(_) => ValueKind::Object,
            TypedValue::String(_) => ValueKind::String,
            TypedValue::ObjectRef(_) => ValueKind::ObjectRef,
        }
    }
}

impl From<TypedValue> for ValueCarrier {
    fn from(value: TypedValue) -> Self {
        match value {
            TypedValue::Raw(v) => ValueCarrier::from_raw(v),
            TypedValue::Pointer(v) => ValueCarrier::from_ptr(v),
            TypedValue::Bool(v) => ValueCarrier::from_bool(v),
            TypedValue::I8(v) => ValueCarrier::from_i8(v),
            TypedValue::U8(v) => ValueCarrier::from_u8(v),
            TypedValue::I16(v) => ValueCarrier::from_i16(v),
            TypedValue::U16(v) => ValueCarrier::from_u16(v),
            TypedValue::I32(v) => ValueCarrier::from_i32(v),
            TypedValue::U32(v) => ValueCarrier::from_u32(v),
            TypedValue::I64(v) => ValueCarrier::from_i64(v),
            TypedValue::U64(v) => ValueCarrier::from_u64(v),
            TypedValue::F32(v) => ValueCarrier::from_f32(v),
            TypedValue::F64(v) => ValueCarrier::from_f64(v),
            TypedValue::Object(v) => ValueCarrier::from_object(v),
            TypedValue::String(v) => ValueCarrier::from_string(v),
            TypedValue::ObjectRef(v) => ValueCarrier::from_object_ref(v),
        }
    }
}

/// Declared parameter and return kinds of a method.
///
/// Whatever resolved a call site to a target also knows its signature; this type
/// carries that knowledge to observers that want to decode carriers safely.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MethodSignature {
    params: Vec<ValueKind>,
    ret: Option<ValueKind>,
}

impl MethodSignature {
    /// Creates a signature from parameter kinds and an optional return kind.
    ///
    /// # Arguments
    ///
    /// * `params` - Kinds of the declared parameters, in order
    /// * `ret` - Kind of the return value, `None` for `void`
    #[must_use]
    pub fn new(params: impl Into<Vec<ValueKind>>, ret: Option<ValueKind>) -> Self {
        Self {
            params: params.into(),
            ret,
        }
    }

    /// Returns the declared parameter kinds.
    #[must_use]
    pub fn params(&self) -> &[ValueKind] {
        &self.params
    }

    /// Returns the declared return kind, `None` for `void`.
    #[must_use]
    pub fn ret(&self) -> Option<ValueKind> {
        self.ret
    }

    /// Returns the number of declared parameters.
    #[must_use]
    pub fn param_count(&self) -> u32 {
        u32::try_from(self.params.len()).unwrap_or(u32::MAX)
    }

    /// Decodes an argument slice according to the declared parameter kinds.
    ///
    /// Extra carriers beyond the declared parameters are ignored.
    #[must_use]
    pub fn decode_args(&self, args: &[ValueCarrier]) -> Vec<TypedValue> {
        self.params
            .iter()
            .zip(args)
            .map(|(kind, carrier)| carrier.read(*kind))
            .collect()
    }

    /// Decodes a return carrier according to the declared return kind.
    ///
    /// Returns `None` for `void` methods or when no carrier was supplied.
    #[must_use]
    pub fn decode_return(&self, ret: Option<&ValueCarrier>) -> Option<TypedValue> {
        Some(ret?.read(self.ret?))
    }

    /// Builds argument carriers from typed values.
    #[must_use]
    pub fn encode(values: &[TypedValue]) -> Vec<ValueCarrier> {
        values.iter().copied().map(ValueCarrier::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_carrier_is_one_slot_wide() {
        assert_eq!(std::mem::size_of::<ValueCarrier>(), 8);
    }

    #[test]
    fn test_literal_fidelity() {
        assert_eq!(ValueCarrier::from_i32(42).as_i32(), 42);
        assert!(ValueCarrier::from_bool(true).as_bool());
        assert!(!ValueCarrier::from_bool(false).as_bool());
        assert_eq!(ValueCarrier::from_f32(3.5).as_f32(), 3.5);
        assert_eq!(ValueCarrier::from_f64(-0.125).as_f64(), -0.125);
        assert_eq!(ValueCarrier::from_i64(i64::MIN).as_i64(), i64::MIN);
        assert_eq!(ValueCarrier::from_u64(u64::MAX).as_u64(), u64::MAX);
        assert_eq!(ValueCarrier::from_i8(-3).as_i8(), -3);
        assert_eq!(ValueCarrier::from_u16(0xBEEF).as_u16(), 0xBEEF);
    }

    #[test]
    #[cfg(target_endian = "little")]
    fn test_narrow_members_zero_fill() {
        assert_eq!(ValueCarrier::from_u8(0xFF).raw() & !0xFF, 0);
        assert_eq!(ValueCarrier::from_bool(true).raw() & !0xFF, 0);
        assert_eq!(ValueCarrier::from_f32(1.0).raw() >> 32, 0);
    }

    #[test]
    fn test_mismatched_read_reinterprets_bits() {
        assert_eq!(ValueCarrier::from_u8(0xFF).as_i8(), -1);
        assert_eq!(ValueCarrier::from_u32(0x3F80_0000).as_f32(), 1.0);
        assert!(ValueCarrier::from_u8(2).as_bool());
    }

    #[test]
    fn test_pointer_members() {
        let mut slot: *mut ManagedObject = std::ptr::null_mut();
        let slot_ptr: *mut *mut ManagedObject = &mut slot;

        let carrier = ValueCarrier::from_object_ref(slot_ptr);
        assert_eq!(carrier.as_object_ref(), slot_ptr);
        assert!(ValueCarrier::from_object(std::ptr::null_mut())
            .as_object()
            .is_null());
        assert_eq!(ValueCarrier::from_raw(0x1234).raw(), 0x1234);
    }

    #[test]
    fn test_typed_value_conversion() {
        let values = [
            TypedValue::I32(25),
            TypedValue::Bool(true),
            TypedValue::F64(3.5),
            TypedValue::U16(7),
        ];

        let carriers = MethodSignature::encode(&values);
        let decoded: Vec<_> = values
            .iter()
            .zip(&carriers)
            .map(|(v, c)| c.read(v.kind()))
            .collect();

        assert_eq!(decoded, values);
    }

    #[test]
    fn test_value_kind_names() {
        assert_eq!(ValueKind::ObjectRef.to_string(), "object_ref");
        assert_eq!(ValueKind::from_str("i32").unwrap(), ValueKind::I32);
        assert_eq!(ValueKind::iter().count(), 16);
    }

    #[test]
    fn test_signature_decode() {
        let signature =
            MethodSignature::new([ValueKind::I32, ValueKind::F32], Some(ValueKind::Bool));
        let args = [ValueCarrier::from_i32(-9), ValueCarrier::from_f32(0.5)];

        assert_eq!(signature.param_count(), 2);
        assert_eq!(
            signature.decode_args(&args),
            vec![TypedValue::I32(-9), TypedValue::F32(0.5)]
        );
        assert_eq!(
            signature.decode_return(Some(&ValueCarrier::from_bool(true))),
            Some(TypedValue::Bool(true))
        );
    }

    #[test]
    fn test_void_signature_has_no_return() {
        let signature = MethodSignature::new(Vec::<ValueKind>::new(), None);
        assert_eq!(
            signature.decode_return(Some(&ValueCarrier::from_i32(1))),
            None
        );
        assert_eq!(signature.decode_return(None), None);
    }
}
