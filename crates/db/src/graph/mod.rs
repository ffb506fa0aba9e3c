//! The canonical entity graph as seen by connectors: upsert-only writes keyed
//! by `(provider, native id)` plus the desired group memberships that drive
//! write-back.

pub mod models;
pub mod pg_repository;
pub mod repositories;
