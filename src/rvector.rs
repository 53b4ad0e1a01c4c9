//! [`RVector`], an owned, fixed-length vector of ring elements.
//!
//! Besides element-wise ring arithmetic, a vector can lend its backing buffer to one
//! collaborator at a time through a [`Lease`] (check-out / check-in). The sampler
//! fills a vector in place through a lease and the MRVF codec saves from one. While the buffer
//! is checked out the vector keeps its length but may not be read or modified by its
//! owner.
use std::{
    collections::TryReserveError,
    mem,
    ops::{AddAssign, Deref, DerefMut, Index, IndexMut, MulAssign, SubAssign},
    sync::atomic::{AtomicU64, Ordering},
};

use thiserror::Error;

use crate::{
    contract::{ContractViolation, check_contract, contract},
    ring::{Ring, Ring1, arithmetic_to_boolean, boolean_to_arithmetic},
};

/// The backing buffer of a vector could not be allocated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to allocate {requested} ring elements: {source}")]
pub struct AllocError {
    /// Number of elements requested.
    pub requested: usize,
    /// The allocator error.
    #[source]
    pub source: TryReserveError,
}

/// An empty buffer with room for exactly `len` elements, reporting failure instead of
/// aborting.
fn try_with_capacity<R: Ring>(len: usize) -> Result<Vec<R>, AllocError> {
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|source| AllocError {
            requested: len,
            source,
        })?;
    Ok(data)
}

/// A buffer of `len` copies of `value`.
fn try_alloc<R: Ring>(len: usize, value: R) -> Result<Vec<R>, AllocError> {
    let mut data = try_with_capacity(len)?;
    data.resize(len, value);
    Ok(data)
}

fn canonicalize<R: Ring>(data: &mut [R]) {
    data.iter_mut()
        .filter(|x| !x.is_canonical())
        .for_each(|x| *x = R::from_word(x.to_word()));
}

static NEXT_LEASE_ID: AtomicU64 = AtomicU64::new(1);

/// Exclusive access to the backing buffer of an [`RVector`].
///
/// Obtained by [`RVector::check_out`] and returned by [`RVector::check_in`], or
/// allocated fresh with [`Lease::allocate`] and turned into a vector with
/// [`RVector::from_lease`]. The length of the buffer cannot change while it is leased.
/// Dropping a checked-out lease leaves its vector unusable.
#[derive(Debug)]
pub struct Lease<R: Ring> {
    id: u64,
    data: Vec<R>,
}

impl<R: Ring> Lease<R> {
    fn new(data: Vec<R>) -> Self {
        Self {
            id: NEXT_LEASE_ID.fetch_add(1, Ordering::Relaxed),
            data,
        }
    }

    /// A fresh, zero-initialized buffer of `len` elements not belonging to any vector.
    pub fn allocate(len: usize) -> Result<Self, AllocError> {
        try_alloc(len, R::ZERO).map(Self::new)
    }

    /// The buffer viewed as raw bytes (native byte order).
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    /// The buffer viewed as mutable raw bytes (native byte order).
    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.data)
    }
}

impl<R: Ring> From<Vec<R>> for Lease<R> {
    /// A fresh lease over `data`, not belonging to any vector.
    fn from(data: Vec<R>) -> Self {
        Self::new(data)
    }
}

impl<R: Ring> Deref for Lease<R> {
    type Target = [R];

    #[inline]
    fn deref(&self) -> &[R] {
        &self.data
    }
}

impl<R: Ring> DerefMut for Lease<R> {
    #[inline]
    fn deref_mut(&mut self) -> &mut [R] {
        &mut self.data
    }
}

/// An owned vector of `len` elements of the ring `R`.
///
/// The length is fixed at construction. Element-wise operators require operands of
/// equal length; a mismatch is a [`ContractViolation`], never a silent truncation.
#[derive(Debug)]
pub struct RVector<R: Ring> {
    data: Vec<R>,
    len: usize,
    lease: Option<u64>,
}

impl<R: Ring> RVector<R> {
    /// An empty vector.
    pub const fn new() -> Self {
        Self {
            data: Vec::new(),
            len: 0,
            lease: None,
        }
    }

    /// A vector of `len` zeros.
    pub fn with_len(len: usize) -> Result<Self, AllocError> {
        Self::filled(len, R::ZERO)
    }

    /// A vector of `len` copies of `value`.
    pub fn filled(len: usize, value: R) -> Result<Self, AllocError> {
        try_alloc(len, value).map(Self::from_vec)
    }

    /// A vector copying the elements of `values`.
    pub fn from_slice(values: &[R]) -> Result<Self, AllocError> {
        let mut data = try_with_capacity(values.len())?;
        data.extend_from_slice(values);
        Ok(Self::from_vec(data))
    }

    /// Takes ownership of `data` without copying.
    pub fn from_vec(data: Vec<R>) -> Self {
        Self {
            len: data.len(),
            data,
            lease: None,
        }
    }

    /// A vector owning a fresh [`Lease`] buffer, canonicalized like [`RVector::check_in`].
    pub fn from_lease(mut lease: Lease<R>) -> Self {
        canonicalize(&mut lease.data);
        Self::from_vec(lease.data)
    }

    /// Deep copy that reports allocation failure.
    pub fn try_clone(&self) -> Result<Self, AllocError> {
        Self::from_slice(self.as_slice())
    }

    /// Moves the buffer into a new vector and leaves `self` empty.
    pub fn take(&mut self) -> Self {
        self.ensure_available();
        mem::take(self)
    }

    /// Number of elements.
    #[inline]
    pub fn size(&self) -> usize {
        self.len
    }

    /// Number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the vector has no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the buffer is currently checked out.
    #[inline]
    pub fn is_checked_out(&self) -> bool {
        self.lease.is_some()
    }

    #[track_caller]
    #[inline]
    fn ensure_available(&self) {
        contract!(self.lease.is_none(), ContractViolation::CheckedOut);
    }

    /// The elements as a slice.
    #[track_caller]
    #[inline]
    pub fn as_slice(&self) -> &[R] {
        self.ensure_available();
        &self.data
    }

    /// The elements as a mutable slice.
    #[track_caller]
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [R] {
        self.ensure_available();
        &mut self.data
    }

    /// Iterator over the elements.
    #[track_caller]
    pub fn iter(&self) -> std::slice::Iter<'_, R> {
        self.as_slice().iter()
    }

    /// The element at `index`, or `None` if out of bounds.
    #[track_caller]
    pub fn get(&self, index: usize) -> Option<&R> {
        self.as_slice().get(index)
    }

    /// The element at `index` mutably, or `None` if out of bounds.
    #[track_caller]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut R> {
        self.as_mut_slice().get_mut(index)
    }

    /// Consumes the vector and returns its buffer.
    #[track_caller]
    pub fn into_vec(self) -> Vec<R> {
        self.ensure_available();
        self.data
    }

    /// Ring sum of all elements, `0` for the empty vector.
    #[track_caller]
    pub fn reduce(&self) -> R {
        self.iter().fold(R::ZERO, |acc, &x| acc + x)
    }

    fn zip_apply(&mut self, other: &Self, op: impl Fn(&mut R, R)) -> Result<(), ContractViolation> {
        check_contract!(self.lease.is_none(), ContractViolation::CheckedOut)?;
        check_contract!(other.lease.is_none(), ContractViolation::CheckedOut)?;
        check_contract!(
            self.len == other.len,
            ContractViolation::LengthMismatch {
                left: self.len,
                right: other.len,
            }
        )?;
        self.data.iter_mut().zip(&other.data).for_each(|(a, &b)| op(a, b));
        Ok(())
    }

    /// Element-wise `self += other`.
    pub fn try_add_assign(&mut self, other: &Self) -> Result<(), ContractViolation> {
        self.zip_apply(other, |a, b| *a += b)
    }

    /// Element-wise `self -= other`.
    pub fn try_sub_assign(&mut self, other: &Self) -> Result<(), ContractViolation> {
        self.zip_apply(other, |a, b| *a -= b)
    }

    /// Element-wise (Hadamard) `self *= other`.
    pub fn try_mul_assign(&mut self, other: &Self) -> Result<(), ContractViolation> {
        self.zip_apply(other, |a, b| *a *= b)
    }

    /// Lends the buffer to the caller until it is returned with [`RVector::check_in`].
    pub fn check_out(&mut self) -> Result<Lease<R>, ContractViolation> {
        check_contract!(self.lease.is_none(), ContractViolation::AlreadyCheckedOut)?;
        let lease = Lease::new(mem::take(&mut self.data));
        self.lease = Some(lease.id);
        Ok(lease)
    }

    /// Returns a buffer obtained from [`RVector::check_out`] on this vector.
    ///
    /// Bytes written through [`Lease::as_bytes_mut`] that are not valid ring elements
    /// (a [`Ring1`] byte other than 0 or 1) are reduced to their low bit.
    pub fn check_in(&mut self, mut lease: Lease<R>) -> Result<(), ContractViolation> {
        let Some(id) = self.lease else {
            return crate::contract::report(
                ContractViolation::NotCheckedOut,
                "self.is_checked_out()",
            );
        };
        check_contract!(id == lease.id, ContractViolation::ForeignLease)?;
        debug_assert_eq!(lease.data.len(), self.len);
        canonicalize(&mut lease.data);
        self.data = lease.data;
        self.lease = None;
        Ok(())
    }

    /// Collapses every element to a bit, see [`arithmetic_to_boolean`].
    #[track_caller]
    pub fn to_boolean(&self) -> Result<RVector<Ring1>, AllocError> {
        let mut out = RVector::<Ring1>::with_len(self.len)?;
        out.data
            .iter_mut()
            .zip(self.as_slice())
            .for_each(|(bit, &x)| *bit = arithmetic_to_boolean(x));
        Ok(out)
    }
}

impl RVector<Ring1> {
    /// Embeds every bit into the ring `R`, see [`boolean_to_arithmetic`].
    #[track_caller]
    pub fn to_arithmetic<R: Ring>(&self) -> Result<RVector<R>, AllocError> {
        let mut out = RVector::<R>::with_len(self.len)?;
        out.data
            .iter_mut()
            .zip(self.as_slice())
            .for_each(|(x, &bit)| *x = boolean_to_arithmetic(bit));
        Ok(out)
    }
}

impl<R: Ring> Default for RVector<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Ring> Clone for RVector<R> {
    #[track_caller]
    fn clone(&self) -> Self {
        Self::from_vec(self.as_slice().to_vec())
    }
}

impl<R: Ring> PartialEq for RVector<R> {
    #[track_caller]
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.as_slice() == other.as_slice()
    }
}

impl<R: Ring> Eq for RVector<R> {}

impl<R: Ring> Index<usize> for RVector<R> {
    type Output = R;

    #[track_caller]
    #[inline]
    fn index(&self, index: usize) -> &R {
        let len = self.len;
        contract!(index < len, ContractViolation::IndexOutOfBounds { index, len });
        &self.as_slice()[index]
    }
}

impl<R: Ring> IndexMut<usize> for RVector<R> {
    #[track_caller]
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut R {
        let len = self.len;
        contract!(index < len, ContractViolation::IndexOutOfBounds { index, len });
        &mut self.as_mut_slice()[index]
    }
}

macro_rules! impl_vector_assign_op {
    ($op_trait:ident, $op_fn:ident) => {
        impl<R: Ring> $op_trait<&RVector<R>> for RVector<R> {
            #[track_caller]
            fn $op_fn(&mut self, rhs: &RVector<R>) {
                self.ensure_available();
                rhs.ensure_available();
                contract!(
                    self.len == rhs.len,
                    ContractViolation::LengthMismatch {
                        left: self.len,
                        right: rhs.len,
                    }
                );
                self.data
                    .iter_mut()
                    .zip(&rhs.data)
                    .for_each(|(a, &b)| a.$op_fn(b));
            }
        }

        impl<R: Ring> $op_trait<R> for RVector<R> {
            #[track_caller]
            fn $op_fn(&mut self, scalar: R) {
                self.as_mut_slice().iter_mut().for_each(|x| x.$op_fn(scalar));
            }
        }
    };
}

impl_vector_assign_op!(AddAssign, add_assign);
impl_vector_assign_op!(SubAssign, sub_assign);
impl_vector_assign_op!(MulAssign, mul_assign);

impl<R: Ring> From<Vec<R>> for RVector<R> {
    fn from(data: Vec<R>) -> Self {
        Self::from_vec(data)
    }
}

impl<R: Ring> FromIterator<R> for RVector<R> {
    fn from_iter<I: IntoIterator<Item = R>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl<'a, R: Ring> IntoIterator for &'a RVector<R> {
    type Item = &'a R;
    type IntoIter = std::slice::Iter<'a, R>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
