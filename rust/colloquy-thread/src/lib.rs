#![warn(missing_docs)]

//! This crate assigns every node of a comment tree a *thread key*: a short
//! string whose ordering reproduces a depth-first, creation-ordered walk of
//! the tree, and which is unique among siblings even when many writers insert
//! under the same parent at once.
//!
//! Keys are made of `.`-separated [alphadecimal](colloquy_encoding) segments
//! with a trailing `/`:
//!
//! ```rust
//! use colloquy_thread::{ThreadKey, next_key};
//!
//! let parent = ThreadKey::parse("01/").unwrap();
//! let first_reply = next_key(Some(&parent), None).unwrap();
//! assert_eq!(first_reply.as_str(), "01.01/");
//!
//! let second_reply = next_key(Some(&parent), Some(&first_reply)).unwrap();
//! assert_eq!(second_reply.as_str(), "01.02/");
//! assert!(first_reply < second_reply);
//! ```
//!
//! Minting keys for real inserts goes through a [ThreadAllocator], which
//! reads the current maximum from a [ThreadIndex] and then claims the next
//! free candidate through a [LockService]. The claim is held by a
//! [PendingAllocation] until the caller commits or aborts it.

mod error;
pub use error::*;

mod key;
pub use key::*;

mod node;
pub use node::*;

mod builder;
pub use builder::*;

mod lock;
pub use lock::*;

mod index;
pub use index::*;

mod allocator;
pub use allocator::*;

mod config;
pub use config::*;
