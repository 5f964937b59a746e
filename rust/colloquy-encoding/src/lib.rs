//! Colloquy Encoding - Order-Preserving Alphadecimal Integers
//!
//! This crate provides a self-delimiting textual encoding for non-negative
//! integers. Encoded strings compare (byte-wise) in exactly the same order as
//! the integers they represent, regardless of magnitude, which makes them
//! suitable as path segments of sortable keys.
//!
//! # Basic Usage
//!
//! ```rust
//! use colloquy_encoding::{decode, encode};
//!
//! let nine = encode(9);
//! let ten = encode(10);
//!
//! assert_eq!(nine, "09");
//! assert_eq!(ten, "0a");
//! assert!(encode(35) < encode(36));
//! assert_eq!(decode(&encode(1296)).unwrap(), 1296);
//! ```
//!
//! # Format
//!
//! Each encoded integer is a length marker followed by the lowercase base-36
//! digits of the value. See the [`alphadecimal`] module documentation for the
//! exact layout of the marker.

pub mod alphadecimal;
pub use alphadecimal::*;

mod error;
pub use error::*;
