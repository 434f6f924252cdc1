// ── Planora Atoms Layer ────────────────────────────────────────────────────
// Pure constants, error types, and plain data types — zero side effects.
// Dependency rule: atoms may only depend on std and external pure crates.
// Nothing here may import from auth/, http.rs, api/, or lib.rs.

pub mod constants;
pub mod error;
pub mod types;
