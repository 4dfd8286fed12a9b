//! Cipher block for tunnel payloads.
//!
//! Every frame body can be sealed with XChaCha20-Poly1305 under a key
//! derived from a secret shared by both ends of the tunnel:
//!
//! ```text
//! sealed = nonce (24) || ciphertext || tag (16)
//! ```
//!
//! A fresh random nonce is drawn for each frame, so no per-session counter
//! has to be kept in sync across reconnects.

mod block;

pub use block::*;
