//! Errors returned by this crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("descriptor is not valid modified-UTF8: {0:?}")]
    InvalidDescriptor(Box<[u8]>),

    #[error("type descriptor `{0}` is not well-formed")]
    MalformedTypeDescriptor(String),

    #[error("duplicate class definition for type `{0}`")]
    DuplicateClass(String),

    #[error("class `{0}` not found in the class graph")]
    ClassNotFound(String),
}
