//! Fixed-width unsigned integers used as per-axis coordinates and as
//! interleaved Morton keys.
//!
//! Coordinates are plain `u8`..`u64`. Keys go up to 256 bits, which no native
//! type covers, so [`U256`] stores two `u128` words. Everything the index does
//! with a key (shift, AND/OR/XOR, ordered compare, add/sub for child bounds) goes
//! through [`MortonKey`], so the tree code is identical for every key width.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display, Formatter};
use std::hash::Hash;
use std::ops::{BitAnd, BitOr, BitXor, Not, Shl, Shr};

/// Unsigned integer holding one encoded coordinate.
pub trait CoordInt: Copy + Ord + Hash + Debug + Default + Send + Sync + 'static {
    /// Width of the type in bits.
    const BITS: u32;
    /// Largest representable value.
    const MAX: Self;

    /// Widens to `u64` without loss.
    fn to_u64(self) -> u64;

    /// Narrows from `u64`, keeping the low bits.
    fn from_u64_truncating(value: u64) -> Self;
}

macro_rules! impl_coord_int {
    ($($t:ty),*) => {
        $(
            impl CoordInt for $t {
                const BITS: u32 = <$t>::BITS;
                const MAX: Self = <$t>::MAX;

                #[inline]
                fn to_u64(self) -> u64 {
                    self as u64
                }

                #[inline]
                fn from_u64_truncating(value: u64) -> Self {
                    value as $t
                }
            }
        )*
    };
}

impl_coord_int!(u8, u16, u32, u64);

/// Fixed-width unsigned integer holding an interleaved Morton key.
///
/// Shifts by `BITS` or more yield zero instead of overflowing, which lets the
/// mask generators run past the top of narrow keys without special cases.
pub trait MortonKey:
    Copy
    + Ord
    + Hash
    + Debug
    + Default
    + Send
    + Sync
    + 'static
    + BitAnd<Output = Self>
    + BitOr<Output = Self>
    + BitXor<Output = Self>
    + Not<Output = Self>
{
    /// Width of the key in bits.
    const BITS: u32;
    /// All bits clear.
    const ZERO: Self;
    /// Only bit 0 set.
    const ONE: Self;
    /// All bits set.
    const MAX: Self;

    /// Converts from `u64`, keeping the low `BITS` bits.
    fn from_u64(value: u64) -> Self;

    /// Returns the low 64 bits.
    fn low_u64(self) -> u64;

    /// Left shift; shifting by `BITS` or more returns zero.
    fn shl_bits(self, n: u32) -> Self;

    /// Right shift; shifting by `BITS` or more returns zero.
    fn shr_bits(self, n: u32) -> Self;

    fn wrapping_add(self, rhs: Self) -> Self;

    fn wrapping_sub(self, rhs: Self) -> Self;

    fn leading_zeros(self) -> u32;

    /// A key with only bit `n` set (zero when `n >= BITS`).
    #[inline]
    fn bit(n: u32) -> Self {
        Self::ONE.shl_bits(n)
    }

    /// A key with the low `bits` bits set.
    #[inline]
    fn low_mask(bits: u32) -> Self {
        if bits >= Self::BITS {
            Self::MAX
        } else {
            Self::bit(bits).wrapping_sub(Self::ONE)
        }
    }

    #[inline]
    fn is_zero(self) -> bool {
        self == Self::ZERO
    }
}

macro_rules! impl_native_key {
    ($($t:ty),*) => {
        $(
            impl MortonKey for $t {
                const BITS: u32 = <$t>::BITS;
                const ZERO: Self = 0;
                const ONE: Self = 1;
                const MAX: Self = <$t>::MAX;

                #[inline]
                fn from_u64(value: u64) -> Self {
                    value as $t
                }

                #[inline]
                fn low_u64(self) -> u64 {
                    self as u64
                }

                #[inline]
                fn shl_bits(self, n: u32) -> Self {
                    self.checked_shl(n).unwrap_or(0)
                }

                #[inline]
                fn shr_bits(self, n: u32) -> Self {
                    self.checked_shr(n).unwrap_or(0)
                }

                #[inline]
                fn wrapping_add(self, rhs: Self) -> Self {
                    <$t>::wrapping_add(self, rhs)
                }

                #[inline]
                fn wrapping_sub(self, rhs: Self) -> Self {
                    <$t>::wrapping_sub(self, rhs)
                }

                #[inline]
                fn leading_zeros(self) -> u32 {
                    <$t>::leading_zeros(self)
                }
            }
        )*
    };
}

impl_native_key!(u8, u16, u32, u64, u128);

/// 256-bit unsigned integer made of two `u128` words.
///
/// Field order matters: the derived `Ord` compares `hi` first, which is the
/// numeric order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct U256 {
    hi: u128,
    lo: u128,
}

impl U256 {
    pub const ZERO: U256 = U256 { hi: 0, lo: 0 };
    pub const MAX: U256 = U256 {
        hi: u128::MAX,
        lo: u128::MAX,
    };

    /// Builds a key from its high and low words.
    pub const fn from_words(hi: u128, lo: u128) -> U256 {
        U256 { hi, lo }
    }

    pub const fn hi(&self) -> u128 {
        self.hi
    }

    pub const fn lo(&self) -> u128 {
        self.lo
    }
}

impl From<u128> for U256 {
    fn from(value: u128) -> Self {
        U256 { hi: 0, lo: value }
    }
}

impl From<u64> for U256 {
    fn from(value: u64) -> Self {
        U256 {
            hi: 0,
            lo: value as u128,
        }
    }
}

impl BitAnd for U256 {
    type Output = U256;

    #[inline]
    fn bitand(self, rhs: U256) -> U256 {
        U256 {
            hi: self.hi & rhs.hi,
            lo: self.lo & rhs.lo,
        }
    }
}

impl BitOr for U256 {
    type Output = U256;

    #[inline]
    fn bitor(self, rhs: U256) -> U256 {
        U256 {
            hi: self.hi | rhs.hi,
            lo: self.lo | rhs.lo,
        }
    }
}

impl BitXor for U256 {
    type Output = U256;

    #[inline]
    fn bitxor(self, rhs: U256) -> U256 {
        U256 {
            hi: self.hi ^ rhs.hi,
            lo: self.lo ^ rhs.lo,
        }
    }
}

impl Not for U256 {
    type Output = U256;

    #[inline]
    fn not(self) -> U256 {
        U256 {
            hi: !self.hi,
            lo: !self.lo,
        }
    }
}

impl Shl<u32> for U256 {
    type Output = U256;

    #[inline]
    fn shl(self, n: u32) -> U256 {
        self.shl_bits(n)
    }
}

impl Shr<u32> for U256 {
    type Output = U256;

    #[inline]
    fn shr(self, n: u32) -> U256 {
        self.shr_bits(n)
    }
}

impl MortonKey for U256 {
    const BITS: u32 = 256;
    const ZERO: Self = U256::ZERO;
    const ONE: Self = U256 { hi: 0, lo: 1 };
    const MAX: Self = U256::MAX;

    #[inline]
    fn from_u64(value: u64) -> Self {
        U256::from(value)
    }

    #[inline]
    fn low_u64(self) -> u64 {
        self.lo as u64
    }

    fn shl_bits(self, n: u32) -> Self {
        match n {
            0 => self,
            1..=127 => U256 {
                hi: (self.hi << n) | (self.lo >> (128 - n)),
                lo: self.lo << n,
            },
            128..=255 => U256 {
                hi: self.lo << (n - 128),
                lo: 0,
            },
            _ => U256::ZERO,
        }
    }

    fn shr_bits(self, n: u32) -> Self {
        match n {
            0 => self,
            1..=127 => U256 {
                hi: self.hi >> n,
                lo: (self.lo >> n) | (self.hi << (128 - n)),
            },
            128..=255 => U256 {
                hi: 0,
                lo: self.hi >> (n - 128),
            },
            _ => U256::ZERO,
        }
    }

    #[inline]
    fn wrapping_add(self, rhs: Self) -> Self {
        let (lo, carry) = self.lo.overflowing_add(rhs.lo);
        U256 {
            hi: self.hi.wrapping_add(rhs.hi).wrapping_add(carry as u128),
            lo,
        }
    }

    #[inline]
    fn wrapping_sub(self, rhs: Self) -> Self {
        let (lo, borrow) = self.lo.overflowing_sub(rhs.lo);
        U256 {
            hi: self.hi.wrapping_sub(rhs.hi).wrapping_sub(borrow as u128),
            lo,
        }
    }

    #[inline]
    fn leading_zeros(self) -> u32 {
        if self.hi != 0 {
            self.hi.leading_zeros()
        } else {
            128 + self.lo.leading_zeros()
        }
    }
}

impl Display for U256 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:032x}{:032x}", self.hi, self.lo)
    }
}

impl Debug for U256 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "U256({})", self)
    }
}
