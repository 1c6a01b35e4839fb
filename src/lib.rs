//! Crypt4GH: a streaming, chunked, authenticated encryption container.
//!
//! A writer encrypts a byte stream under one or more recipients' X25519
//! public keys; each recipient decrypts independently with their private
//! key. The per-file data key travels inside recipient-addressed header
//! packets; the payload follows as independently authenticated 64 KiB
//! segments.

pub mod error;
pub mod header;
pub mod kdf;
pub mod keys;
pub mod segment;
pub mod streaming;

pub use error::{Crypt4ghError, Result};
pub use header::DataEditList;
pub use keys::SecretKey;
pub use streaming::{Crypt4ghReader, Crypt4ghWriter};
