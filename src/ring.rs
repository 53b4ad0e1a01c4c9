//! The rings `Z/2^k Z` for `k` in `{1, 8, 16, 32, 64}`.
//!
//! Every ring is a transparent newtype around the unsigned integer of the same width
//! (`Ring1` uses a byte holding `0` or `1`). Addition, subtraction and multiplication
//! wrap modulo `2^k`; they never panic or saturate, regardless of `overflow-checks`.
//!
//! Ring values are `Eq` and `Hash`, but deliberately not `PartialOrd`/`Ord`: the rings
//! have no total order compatible with their arithmetic. Code that needs to compare raw
//! representations (e.g. the sampler's rejection threshold) goes through
//! [`Ring::to_word`].
use std::{
    fmt::{self, Debug},
    hash::Hash,
    ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign},
};

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Width tag of a ring, persisted in MRVF files as its bit width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RingWidth {
    /// `Z/2Z`, stored with byte granularity.
    W1 = 1,
    /// `Z/2^8 Z`.
    W8 = 8,
    /// `Z/2^16 Z`.
    W16 = 16,
    /// `Z/2^32 Z`.
    W32 = 32,
    /// `Z/2^64 Z`.
    W64 = 64,
}

impl RingWidth {
    /// Number of bits of a ring element.
    #[inline]
    pub const fn bits(self) -> u32 {
        self as u32
    }

    /// Number of bytes a ring element occupies in memory and on disk.
    #[inline]
    pub const fn bytes(self) -> usize {
        match self {
            RingWidth::W1 | RingWidth::W8 => 1,
            RingWidth::W16 => 2,
            RingWidth::W32 => 4,
            RingWidth::W64 => 8,
        }
    }

    /// The tag byte written to MRVF files.
    #[inline]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Inverse of [`RingWidth::tag`].
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(RingWidth::W1),
            8 => Some(RingWidth::W8),
            16 => Some(RingWidth::W16),
            32 => Some(RingWidth::W32),
            64 => Some(RingWidth::W64),
            _ => None,
        }
    }
}

impl fmt::Display for RingWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit ring", self.bits())
    }
}

mod sealed {
    pub trait Sealed {}
}

/// An element of one of the supported rings.
///
/// The trait is sealed: being bounded on `R: Ring` is the "is a valid ring type" check
/// of every generic component in this crate, and it is only satisfied by [`Ring1`],
/// [`Ring8`], [`Ring16`], [`Ring32`] and [`Ring64`].
pub trait Ring:
    sealed::Sealed
    + Copy
    + Debug
    + Default
    + PartialEq
    + Eq
    + Hash
    + Send
    + Sync
    + Pod
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + 'static
{
    /// Width tag of the ring.
    const WIDTH: RingWidth;
    /// Size of one element in bytes.
    const BYTES: usize = Self::WIDTH.bytes();
    /// Additive identity.
    const ZERO: Self;
    /// Multiplicative identity.
    const ONE: Self;
    /// The all-ones element `2^k - 1`.
    const MAX: Self;

    /// Truncates `word` to the ring, i.e. reduces it modulo `2^k`.
    fn from_word(word: u64) -> Self;

    /// The canonical representative in `[0, 2^k)` as a `u64`.
    fn to_word(self) -> u64;

    /// Converts from native to little-endian byte order (no-op on little-endian targets).
    fn to_le(self) -> Self;

    /// Converts from little-endian to native byte order (no-op on little-endian targets).
    fn from_le(self) -> Self;

    /// Whether the in-memory representation is a valid ring element.
    ///
    /// Only [`Ring1`] has invalid representations (bytes other than `0` and `1`), which
    /// can only appear when raw bytes are written into its buffer.
    #[inline]
    fn is_canonical(self) -> bool {
        true
    }
}

macro_rules! decl_int_ring {
    ($name:ident, $t:ty, $width:expr, $doc:literal) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize, Deserialize,
        )]
        #[repr(transparent)]
        pub struct $name(pub $t);

        impl Add for $name {
            type Output = Self;

            #[inline]
            fn add(self, rhs: Self) -> Self {
                Self(self.0.wrapping_add(rhs.0))
            }
        }

        impl Sub for $name {
            type Output = Self;

            #[inline]
            fn sub(self, rhs: Self) -> Self {
                Self(self.0.wrapping_sub(rhs.0))
            }
        }

        impl Mul for $name {
            type Output = Self;

            #[inline]
            fn mul(self, rhs: Self) -> Self {
                Self(self.0.wrapping_mul(rhs.0))
            }
        }

        impl Neg for $name {
            type Output = Self;

            #[inline]
            fn neg(self) -> Self {
                Self(self.0.wrapping_neg())
            }
        }

        impl From<$t> for $name {
            #[inline]
            fn from(value: $t) -> Self {
                Self(value)
            }
        }

        impl From<$name> for $t {
            #[inline]
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl sealed::Sealed for $name {}

        impl Ring for $name {
            const WIDTH: RingWidth = $width;
            const ZERO: Self = Self(0);
            const ONE: Self = Self(1);
            const MAX: Self = Self(<$t>::MAX);

            #[inline]
            fn from_word(word: u64) -> Self {
                Self(word as $t)
            }

            #[inline]
            fn to_word(self) -> u64 {
                self.0 as u64
            }

            #[inline]
            fn to_le(self) -> Self {
                Self(self.0.to_le())
            }

            #[inline]
            fn from_le(self) -> Self {
                Self(<$t>::from_le(self.0))
            }
        }
    };
}

decl_int_ring!(Ring8, u8, RingWidth::W8, "An element of `Z/2^8 Z`.");
decl_int_ring!(Ring16, u16, RingWidth::W16, "An element of `Z/2^16 Z`.");
decl_int_ring!(Ring32, u32, RingWidth::W32, "An element of `Z/2^32 Z`.");
decl_int_ring!(Ring64, u64, RingWidth::W64, "An element of `Z/2^64 Z`.");

/// An element of `Z/2Z`, i.e. a bit stored in a byte.
///
/// Addition and subtraction are XOR, multiplication is AND. Only the low bit of the byte
/// carries the value; equality and hashing ignore the others.
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable, Serialize, Deserialize)]
#[serde(from = "bool", into = "bool")]
#[repr(transparent)]
pub struct Ring1(u8);

impl Ring1 {
    /// The bit `0`.
    pub const FALSE: Self = Self(0);
    /// The bit `1`.
    pub const TRUE: Self = Self(1);

    /// Create a bit.
    #[inline]
    pub const fn new(bit: bool) -> Self {
        Self(bit as u8)
    }

    /// The value of the bit.
    #[inline]
    pub const fn get(self) -> bool {
        self.0 & 1 == 1
    }
}

impl PartialEq for Ring1 {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}

impl Eq for Ring1 {}

impl Hash for Ring1 {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.get().hash(state);
    }
}

impl From<bool> for Ring1 {
    #[inline]
    fn from(value: bool) -> Self {
        Self::new(value)
    }
}

impl From<Ring1> for bool {
    #[inline]
    fn from(value: Ring1) -> Self {
        value.get()
    }
}

impl Add for Ring1 {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self((self.0 ^ rhs.0) & 1)
    }
}

impl Sub for Ring1 {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        self + rhs
    }
}

impl Mul for Ring1 {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0 & 1)
    }
}

impl Neg for Ring1 {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self(self.0 & 1)
    }
}

impl sealed::Sealed for Ring1 {}

impl Ring for Ring1 {
    const WIDTH: RingWidth = RingWidth::W1;
    const ZERO: Self = Self::FALSE;
    const ONE: Self = Self::TRUE;
    const MAX: Self = Self::TRUE;

    #[inline]
    fn from_word(word: u64) -> Self {
        Self((word & 1) as u8)
    }

    #[inline]
    fn to_word(self) -> u64 {
        (self.0 & 1) as u64
    }

    #[inline]
    fn to_le(self) -> Self {
        self
    }

    #[inline]
    fn from_le(self) -> Self {
        self
    }

    #[inline]
    fn is_canonical(self) -> bool {
        self.0 <= 1
    }
}

macro_rules! impl_assign_ops {
    ($($name:ident),*) => {
        $(
            impl AddAssign for $name {
                #[inline]
                fn add_assign(&mut self, rhs: Self) {
                    *self = *self + rhs;
                }
            }

            impl SubAssign for $name {
                #[inline]
                fn sub_assign(&mut self, rhs: Self) {
                    *self = *self - rhs;
                }
            }

            impl MulAssign for $name {
                #[inline]
                fn mul_assign(&mut self, rhs: Self) {
                    *self = *self * rhs;
                }
            }
        )*
    };
}

impl_assign_ops!(Ring1, Ring8, Ring16, Ring32, Ring64);

/// Embeds a bit into a wider ring: `0` becomes the all-zero word, `1` the all-one word.
///
/// The all-one word is `-1` in every ring, so `boolean_to_arithmetic(b) * x` selects
/// `-x` or `0`.
#[inline]
pub fn boolean_to_arithmetic<R: Ring>(bit: Ring1) -> R {
    if bit.get() { R::MAX } else { R::ZERO }
}

/// Collapses a ring element to a bit: nonzero becomes `1`, zero becomes `0`.
#[inline]
pub fn arithmetic_to_boolean<R: Ring>(value: R) -> Ring1 {
    Ring1::new(value.to_word() != 0)
}
