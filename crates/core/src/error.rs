//! Crate-wide error taxonomy.
//!
//! One enum for every error kind named in SPEC_FULL §7/§10. Downstream crates keep
//! their own narrow `thiserror` enums for adapter-local detail and bridge into this
//! one with an explicit `From` impl at the crate boundary, so nothing above the
//! adapter layer ever matches on anything but this taxonomy.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("call registry at capacity")]
    AtCapacity,

    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("failed to parse upstream response: {0}")]
    ParseFailure(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("out of stock: {0}")]
    OutOfStock(String),

    #[error("insufficient stock for {product_key}: requested {requested}, available {available}")]
    InsufficientStock {
        product_key: String,
        requested: u32,
        available: u32,
    },

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidState { from: String, to: String },

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
