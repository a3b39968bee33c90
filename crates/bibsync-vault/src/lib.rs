//! Bibsync Vault - attachment blob storage backends
//!
//! Implements the `BlobStore` port from `bibsync-core`:
//! - [`LocalVault`] - one directory per library on local disk, MD5 etags
//! - [`MemoryVault`] - HashMap-backed store for tests
//!
//! Both backends store attachments under (container-per-library,
//! object-key-as-name) and report content checksums as MD5 hex digests —
//! the change detector the sync engine gates transfers on.

pub mod local;
pub mod memory;

pub use local::LocalVault;
pub use memory::MemoryVault;

use md5::{Digest, Md5};

/// Computes the MD5 hex digest of a byte slice
///
/// MD5 here is purely a change detector matching the remote protocol's
/// conditional headers, not a cryptographic guarantee.
#[must_use]
pub fn md5_hex(bytes: &[u8]) -> String {
    let digest = Md5::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}
