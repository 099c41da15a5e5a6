//! Helper functions shared by the memory resources.
//! These don't particularly belong to any concrete module of the crate.


/// It aligns `to_be_aligned` using `aligment`.
///
/// `aligment` must be a power of two. The platform backend uses this to
/// raise small alignments to the pointer size required by `posix_memalign`.
pub fn align(to_be_aligned: usize, aligment: usize) -> usize {
    (to_be_aligned + aligment - 1) & !(aligment - 1)
}

/// Tells whether `alignment` can be used to request memory. Zero and
/// anything that is not a power of two are rejected.
#[inline]
pub fn is_valid_alignment(alignment: usize) -> bool {
    alignment != 0 && alignment & (alignment - 1) == 0
}
