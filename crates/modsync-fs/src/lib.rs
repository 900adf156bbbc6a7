#![doc = include_str!("../README.md")]
#![deny(unused_crate_dependencies)]

mod archive;
mod local;

pub use archive::ZipArchiver;
pub use local::{LocalFileSystem, available_space};
