//! Zero-knowledge proofs, made non-interactive over the transcript hash.
pub mod dlog;
