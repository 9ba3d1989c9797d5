//! Core domain logic for Pebbles.
//!
//! This crate ties the provider adapter, the response normalizer, and storage
//! together into the operations the front end exposes:
//! - [`normalize`]: coerce provider JSON into a [`pebbles_shared::Pebble`]
//! - [`generate`]: topic → provider → normalized pebble
//! - [`library`]: one owner's pebbles and folders, including block edits

pub mod generate;
pub mod library;
pub mod normalize;

pub use generate::generate_pebble;
pub use library::{BlockSection, Library, Listing};
pub use normalize::{Normalizer, StampSource, SystemStamps, normalize_response, split_key_points};
