//! Round-trip toolkit for a cartridge image's level data.
//!
//! The image's maps live behind a purpose-built compression codec and two
//! revisions of a pointer-indexed level table. This crate decodes that
//! codec, walks the tables, extracts each level's components into editable
//! grids, and writes edited grids back while leaving every other byte of
//! the image identical.
//!
//! Data flow: image -> directory -> extractor -> grid text files and back
//! through the patcher, which decides in-place versus relocated placement
//! and rewrites the directory wholesale after every change.

pub mod binary_utils;
pub mod codec;
pub mod directory;
pub mod error;
pub mod extractor;
pub mod flags;
pub mod grid;
pub mod image;
pub mod objects;
pub mod patcher;
pub mod progress;
pub mod workspace;

pub use error::{Error, Result};
