#[doc = include_str!("../README.md")]
#[macro_use]
extern crate doc_comment;
doc_comment!(include_str!("../README.md"));

mod error;
pub use error::{Error, ErrorKind};

pub mod leiden;
pub mod readwrite;
