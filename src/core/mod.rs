// Fingerprinting and grouping engine. Everything here is pure and per-request;
// batch orchestration lives in `services`.

pub mod digest;
pub mod duplicate;
pub mod fingerprint;
pub mod input;
pub mod metadata;
pub mod reference;
pub mod similar;
