pub mod envelope;
pub mod fingerprint;

pub use fingerprint::FingerprintCache;
