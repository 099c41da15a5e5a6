//! Bookkeeping memory resources and an append-only array built on them.
//!
//! A [`TrackingResource`] records every block it hands out, so that leaks,
//! double frees and foreign pointers are caught by the resource instead of
//! corrupting memory. A [`DynamicArray`] stores each element in its own
//! block obtained from whichever [`MemoryResource`] it is given:
//!
//! ```
//! use trackalloc::{DynamicArray, TrackingResource};
//!
//! let resource = TrackingResource::new();
//! let mut arr = DynamicArray::new_in(&resource);
//!
//! arr.push(11).unwrap();
//! arr.push(22).unwrap();
//!
//! assert_eq!(Ok(&22), arr.get(1));
//! assert!(arr.get(2).is_err());
//! assert_eq!(2, resource.live_blocks());
//! ```
//!
//! Nothing here is thread safe. Resources use interior mutability and are
//! meant to be shared by reference on a single thread.

pub mod array;
pub mod error;
mod platform;
pub mod poly;
pub mod resource;
pub mod tracking;
pub mod utils;

pub use array::{DynamicArray, Iter, IterMut};
pub use error::{AllocError, ArrayError};
pub use poly::PolymorphicAllocator;
pub use resource::{MemoryResource, SystemResource, default_resource};
pub use tracking::{ResourceStats, TrackingResource};
