//! Empty library target; this crate exists only to host the
//! property-based tests under `tests/`.
