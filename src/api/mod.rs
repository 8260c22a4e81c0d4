// =============================================================================
// Admin HTTP Surface (§6) — Axum router + bearer auth
// =============================================================================

pub mod auth;
pub mod rest;
