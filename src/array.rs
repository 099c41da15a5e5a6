//! Append-only array whose elements live in individual blocks drawn from
//! a [`MemoryResource`].

use std::{
    collections::{BTreeMap, btree_map},
    fmt,
    iter::FusedIterator,
    marker::PhantomData,
    mem,
    ops::{Index, IndexMut},
    ptr::NonNull,
};

use tracing::error;

use crate::{
    error::ArrayError,
    poly::PolymorphicAllocator,
    resource::MemoryResource,
};

/// Growable array of individually allocated elements.
///
/// Every element gets its own block from the array's allocator and is
/// stored under a sparse index:
///
/// ```text
///   elements                       resource
/// +-------+---------+        +--------------------+
/// |   0   |  ptr ---|------> |  T (own block)     |
/// +-------+---------+        +--------------------+
/// |   1   |  ptr ---|------> |  T (own block)     |
/// +-------+---------+        +--------------------+
/// |  ...  |   ...   |
/// ```
///
/// Indices are always `0..len`, handed out in order by [`DynamicArray::push`].
/// Elements never move, so references stay valid until the array is dropped.
/// Dropping the array drops every element and releases its block, in index
/// order. If one destructor panics the remaining elements are still dropped
/// and released; only the block of the panicking element is left to the
/// resource.
pub struct DynamicArray<'a, T> {
    elements: BTreeMap<usize, NonNull<T>>,
    alloc: PolymorphicAllocator<'a>,
    len: usize,
    marker: PhantomData<T>,
}

impl<T> DynamicArray<'static, T> {
    /// Creates an empty array backed by [`crate::default_resource`].
    pub fn new() -> Self {
        Self::with_allocator(PolymorphicAllocator::default())
    }
}

impl<T> Default for DynamicArray<'static, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T> DynamicArray<'a, T> {
    /// Creates an empty array drawing its elements from `resource`.
    pub fn new_in(resource: &'a dyn MemoryResource) -> Self {
        Self::with_allocator(PolymorphicAllocator::new(resource))
    }

    pub fn with_allocator(alloc: PolymorphicAllocator<'a>) -> Self {
        Self {
            elements: BTreeMap::new(),
            alloc,
            len: 0,
            marker: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Same as [`DynamicArray::len`].
    #[inline]
    pub fn size(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn allocator(&self) -> PolymorphicAllocator<'a> {
        self.alloc
    }

    /// Moves `value` into a new block and stores it at index `len()`.
    ///
    /// Allocation errors are passed through and leave the array unchanged.
    pub fn push(&mut self, value: T) -> Result<(), ArrayError> {
        let ptr = self.alloc.new_object(value)?;

        self.elements.insert(self.len, ptr);
        self.len += 1;
        Ok(())
    }

    pub fn get(&self, index: usize) -> Result<&T, ArrayError> {
        match self.elements.get(&index) {
            Some(ptr) => Ok(unsafe { ptr.as_ref() }),
            None => Err(self.out_of_range(index)),
        }
    }

    pub fn get_mut(&mut self, index: usize) -> Result<&mut T, ArrayError> {
        let len = self.len;

        match self.elements.get_mut(&index) {
            Some(ptr) => Ok(unsafe { ptr.as_mut() }),
            None => Err(ArrayError::IndexOutOfRange { index, len }),
        }
    }

    /// Iterates over the elements in index order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            inner: self.elements.values(),
        }
    }

    /// Iterates over the elements in index order, allowing in-place changes.
    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        IterMut {
            inner: self.elements.values_mut(),
        }
    }

    fn out_of_range(&self, index: usize) -> ArrayError {
        ArrayError::IndexOutOfRange { index, len: self.len }
    }
}

impl<T> Drop for DynamicArray<'_, T> {
    fn drop(&mut self) {
        let mut guard = ReleaseGuard {
            remaining: mem::take(&mut self.elements).into_iter(),
            alloc: self.alloc,
        };

        guard.release_remaining();
    }
}

/// Releases the elements left in `remaining`. If an element's destructor
/// panics, the guard is dropped during unwinding and carries on with the
/// elements after it. The block of the panicking element stays checked out.
struct ReleaseGuard<'a, T> {
    remaining: btree_map::IntoIter<usize, NonNull<T>>,
    alloc: PolymorphicAllocator<'a>,
}

impl<T> ReleaseGuard<'_, T> {
    fn release_remaining(&mut self) {
        for (index, ptr) in self.remaining.by_ref() {
            if let Err(err) = unsafe { self.alloc.delete_object(ptr) } {
                error!(index, %err, "failed to release array element");
            }
        }
    }
}

impl<T> Drop for ReleaseGuard<'_, T> {
    fn drop(&mut self) {
        self.release_remaining();
    }
}

impl<T> Index<usize> for DynamicArray<'_, T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        self.get(index).unwrap_or_else(|err| panic!("{err}"))
    }
}

impl<T> IndexMut<usize> for DynamicArray<'_, T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        self.get_mut(index).unwrap_or_else(|err| panic!("{err}"))
    }
}

impl<T: fmt::Debug> fmt::Debug for DynamicArray<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Shared iterator over a [`DynamicArray`], see [`DynamicArray::iter`].
pub struct Iter<'a, T> {
    inner: btree_map::Values<'a, usize, NonNull<T>>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|ptr| unsafe { ptr.as_ref() })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
impl<T> FusedIterator for Iter<'_, T> {}

impl<T> Clone for Iter<'_, T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Mutable iterator over a [`DynamicArray`], see [`DynamicArray::iter_mut`].
pub struct IterMut<'a, T> {
    inner: btree_map::ValuesMut<'a, usize, NonNull<T>>,
}

impl<'a, T> Iterator for IterMut<'a, T> {
    type Item = &'a mut T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|ptr| unsafe { ptr.as_mut() })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for IterMut<'_, T> {}
impl<T> FusedIterator for IterMut<'_, T> {}

impl<'a, 'r, T> IntoIterator for &'a DynamicArray<'r, T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, 'r, T> IntoIterator for &'a mut DynamicArray<'r, T> {
    type Item = &'a mut T;
    type IntoIter = IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AllocError, TrackingResource};

    use proptest::prelude::*;
    use std::{
        cell::Cell,
        panic::{self, AssertUnwindSafe},
        ptr,
        rc::Rc,
    };

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Pair {
        a: i32,
        b: i32,
    }

    struct DropCounter(Rc<Cell<usize>>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    /// Resource that never has memory to give.
    struct ExhaustedResource;

    // SAFETY: never hands out a block.
    unsafe impl MemoryResource for ExhaustedResource {
        fn allocate(&self, bytes: usize, alignment: usize) -> Result<NonNull<u8>, AllocError> {
            Err(AllocError::AllocationFailure { bytes, alignment })
        }

        unsafe fn deallocate(&self, ptr: NonNull<u8>, _bytes: usize, _alignment: usize) -> Result<(), AllocError> {
            Err(AllocError::DoubleFreeOrUnknownBlock { addr: ptr.as_ptr() as usize })
        }

        fn is_equal(&self, other: &dyn MemoryResource) -> bool {
            ptr::addr_eq(self, other)
        }
    }

    fn out_of_range(index: usize, len: usize) -> ArrayError {
        ArrayError::IndexOutOfRange { index, len }
    }

    #[test]
    fn push_and_index() {
        let resource = TrackingResource::new();
        let mut arr = DynamicArray::new_in(&resource);

        for i in 1..=5 {
            arr.push(i * 11).unwrap();
        }

        assert_eq!(5, arr.len());
        assert_eq!(Ok(&11), arr.get(0));
        assert_eq!(Ok(&22), arr.get(1));
        assert_eq!(Ok(&33), arr.get(2));
        assert_eq!(Ok(&44), arr.get(3));
        assert_eq!(Ok(&55), arr.get(4));
        assert_eq!(Err(out_of_range(5, 5)), arr.get(5));
    }

    #[test]
    fn out_of_range_reads_fail() {
        let resource = TrackingResource::new();
        let mut arr = DynamicArray::new_in(&resource);

        arr.push(10).unwrap();
        arr.push(20).unwrap();

        assert!(arr.get(0).is_ok());
        assert!(arr.get(1).is_ok());
        assert_eq!(Err(out_of_range(2, 2)), arr.get(2));
        assert_eq!(Err(out_of_range(100, 2)), arr.get(100));
        assert_eq!(Err(out_of_range(2, 2)), arr.get_mut(2).map(|v| *v));
    }

    #[test]
    fn empty_array_has_no_valid_index() {
        let resource = TrackingResource::new();
        let arr: DynamicArray<'_, u8> = DynamicArray::new_in(&resource);

        assert!(arr.is_empty());
        assert_eq!(0, arr.size());
        assert_eq!(Err(out_of_range(0, 0)), arr.get(0));
        assert_eq!(None, arr.iter().next());
    }

    #[test]
    fn iterator_traversal() {
        let resource = TrackingResource::new();
        let mut arr = DynamicArray::new_in(&resource);

        arr.push(10).unwrap();
        arr.push(20).unwrap();
        arr.push(30).unwrap();

        let mut it = arr.iter();
        assert_eq!(3, it.len());
        assert_eq!(Some(&10), it.next());
        assert_eq!(Some(&20), it.next());
        assert_eq!(Some(&30), it.next());
        assert_eq!(None, it.next());
        assert_eq!(None, it.next());

        // A fresh traversal starts from the beginning again.
        assert_eq!(vec![&10, &20, &30], arr.iter().collect::<Vec<_>>());
    }

    #[test]
    fn struct_push() {
        let resource = TrackingResource::new();
        let mut arr = DynamicArray::new_in(&resource);

        arr.push(Pair { a: 1, b: 100 }).unwrap();
        arr.push(Pair { a: 2, b: 200 }).unwrap();
        arr.push(Pair { a: 3, b: 300 }).unwrap();

        assert_eq!(1, arr[0].a);
        assert_eq!(200, arr[1].b);
        assert_eq!(3, arr[2].a);
    }

    #[test]
    fn modification_is_in_place() {
        let resource = TrackingResource::new();
        let mut arr = DynamicArray::new_in(&resource);

        arr.push(Pair { a: 10, b: 20 }).unwrap();
        let before = arr.get(0).unwrap() as *const Pair;

        arr[0].a = 999;
        arr.get_mut(0).unwrap().b = 888;

        assert_eq!(Ok(&Pair { a: 999, b: 888 }), arr.get(0));
        assert_eq!(before, arr.get(0).unwrap() as *const Pair);
        assert_eq!(1, resource.stats().total_allocations);
    }

    #[test]
    fn iter_mut_updates_every_element() {
        let resource = TrackingResource::new();
        let mut arr = DynamicArray::new_in(&resource);

        for i in 0..4 {
            arr.push(i).unwrap();
        }
        for value in &mut arr {
            *value *= 10;
        }

        assert_eq!(vec![0, 10, 20, 30], arr.iter().copied().collect::<Vec<_>>());
    }

    #[test]
    #[should_panic(expected = "index 3 out of range for array of size 1")]
    fn index_operator_panics_past_the_end() {
        let mut arr = DynamicArray::new();
        arr.push(1u8).unwrap();

        let _ = arr[3];
    }

    #[test]
    fn each_element_gets_its_own_block() {
        let resource = TrackingResource::new();
        let mut arr = DynamicArray::new_in(&resource);

        for i in 0..10u64 {
            arr.push(i).unwrap();
        }

        assert_eq!(10, resource.live_blocks());
        for value in &arr {
            assert!(resource.is_tracked(NonNull::from(value).cast()));
        }
    }

    #[test]
    fn drop_releases_every_element() {
        let resource = TrackingResource::new();
        let drops = Rc::new(Cell::new(0));

        {
            let mut arr = DynamicArray::new_in(&resource);
            for _ in 0..5 {
                arr.push(DropCounter(drops.clone())).unwrap();
            }
            assert_eq!(5, resource.live_blocks());
            assert_eq!(0, drops.get());
        }

        assert_eq!(5, drops.get());
        assert_eq!(0, resource.live_blocks());
        assert_eq!(5, resource.stats().total_deallocations);
    }

    #[test]
    fn panicking_destructor_does_not_skip_later_elements() {
        struct Fragile {
            explode: bool,
            drops: Rc<Cell<usize>>,
        }

        impl Drop for Fragile {
            fn drop(&mut self) {
                self.drops.set(self.drops.get() + 1);
                if self.explode {
                    panic!("fragile element dropped");
                }
            }
        }

        let resource = TrackingResource::new();
        let drops = Rc::new(Cell::new(0));
        let mut arr = DynamicArray::new_in(&resource);

        for explode in [false, true, false, false] {
            arr.push(Fragile { explode, drops: drops.clone() }).unwrap();
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(move || drop(arr)));

        assert!(outcome.is_err());
        assert_eq!(4, drops.get());
        assert_eq!(1, resource.live_blocks());
    }

    #[test]
    fn arrays_can_share_a_resource() {
        let resource = TrackingResource::new();
        let mut numbers = DynamicArray::new_in(&resource);
        let mut words = DynamicArray::new_in(&resource);

        numbers.push(1u32).unwrap();
        words.push(String::from("one")).unwrap();
        words.push(String::from("two")).unwrap();

        assert_eq!(3, resource.live_blocks());
        assert_eq!(numbers.allocator(), words.allocator());

        drop(words);
        assert_eq!(1, resource.live_blocks());
    }

    #[test]
    fn allocation_failure_is_propagated() {
        let resource = ExhaustedResource;
        let mut arr = DynamicArray::new_in(&resource);
        let drops = Rc::new(Cell::new(0));

        let err = arr.push(DropCounter(drops.clone())).unwrap_err();

        assert_eq!(
            ArrayError::Alloc(AllocError::AllocationFailure {
                bytes: mem::size_of::<DropCounter>(),
                alignment: mem::align_of::<DropCounter>(),
            }),
            err
        );
        assert!(arr.is_empty());
        assert_eq!(1, drops.get());
    }

    #[test]
    fn default_resource_backs_new() {
        let mut arr = DynamicArray::default();
        arr.push(String::from("hello")).unwrap();

        assert_eq!("hello", arr[0]);
        assert_eq!(format!("{arr:?}"), r#"["hello"]"#);
    }

    proptest! {
        #[test]
        fn appended_values_read_back_in_order(values in prop::collection::vec(any::<i64>(), 0..64)) {
            let resource = TrackingResource::new();
            let mut arr = DynamicArray::new_in(&resource);

            for value in &values {
                arr.push(*value).unwrap();
            }

            prop_assert_eq!(values.len(), arr.len());
            for (index, value) in values.iter().enumerate() {
                prop_assert_eq!(Ok(value), arr.get(index));
            }
            prop_assert!(arr.iter().eq(values.iter()));
            prop_assert_eq!(values.len(), arr.iter().count());
        }

        #[test]
        fn indices_past_the_end_always_fail(len in 0usize..32, past in 0usize..1000) {
            let resource = TrackingResource::new();
            let mut arr = DynamicArray::new_in(&resource);

            for value in 0..len {
                arr.push(value).unwrap();
            }

            let index = len + past;
            prop_assert_eq!(Err(out_of_range(index, len)), arr.get(index));
            prop_assert_eq!(len, resource.live_blocks());
        }
    }
}
