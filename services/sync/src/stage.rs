//! Listing stages shared by the provider connectors: stream records, map them,
//! upsert the canonical entity and tally the outcome.

use serde_json::Value;

use strata_common::error::StrataResult;
use strata_db::graph::models::{
    CanonicalGroup, CanonicalIdentity, CanonicalOrganization, UpsertedKey,
};
use strata_db::graph::repositories::EntityGraphRepository;

use crate::connector::{MappingError, SyncResult};
use crate::pagination::{PageSource, Paginator};

pub enum Canonical {
    Identity(CanonicalIdentity),
    Group(CanonicalGroup),
    Organization(CanonicalOrganization),
}

impl Canonical {
    fn kind(&self) -> &'static str {
        match self {
            Self::Identity(_) => "user",
            Self::Group(_) => "group",
            Self::Organization(_) => "organization",
        }
    }

    async fn upsert(&self, graph: &dyn EntityGraphRepository) -> StrataResult<UpsertedKey> {
        match self {
            Self::Identity(identity) => graph.upsert_identity(identity).await,
            Self::Group(group) => graph.upsert_group(group).await,
            Self::Organization(org) => graph.upsert_organization(org).await,
        }
    }
}

/// What one provider record maps to.
pub enum Mapped {
    Upsert { native_id: String, entity: Canonical },
    Skip { native_id: String, reason: String },
}

pub struct Stage<'a> {
    pub provider: &'static str,
    /// `users`, `groups`; prefixes stage-level error messages.
    pub name: &'static str,
    pub source: &'a dyn PageSource,
    pub start_url: String,
}

/// Runs one listing to completion or to its first fetch failure.
///
/// A fetch failure ends the stage with `"<name>: <error>"`. Mapping and
/// upsert failures are recorded per item and the stage moves on.
pub async fn run_stage<F>(
    stage: Stage<'_>,
    graph: &dyn EntityGraphRepository,
    result: &mut SyncResult,
    mut map: F,
) where
    F: FnMut(Value) -> Result<Mapped, MappingError>,
{
    let Stage {
        provider,
        name,
        source,
        start_url,
    } = stage;
    let mut pages = Paginator::new(source, start_url);
    let mut skipped = 0usize;

    while let Some(item) = pages.next_record().await {
        let raw = match item {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(provider, stage = name, error = %e, "listing failed");
                result.push_error(format!("{name}: {e}"));
                break;
            }
        };

        let (native_id, entity) = match map(raw) {
            Ok(Mapped::Upsert { native_id, entity }) => (native_id, entity),
            Ok(Mapped::Skip { native_id, reason }) => {
                tracing::debug!(
                    provider,
                    stage = name,
                    native_id = %native_id,
                    reason = %reason,
                    "skipping record"
                );
                skipped += 1;
                continue;
            }
            Err(e) => {
                tracing::warn!(provider, stage = name, error = %e, "skipping unmappable record");
                result.push_error(format!("{name}: {e}"));
                continue;
            }
        };

        match entity.upsert(graph).await {
            Ok(key) => match &entity {
                Canonical::Organization(_) => result.record_organization(key.outcome),
                _ => result.record_entity(key.outcome),
            },
            Err(e) => {
                tracing::warn!(
                    provider,
                    native_id = %native_id,
                    error = %e,
                    "failed to upsert {}",
                    entity.kind()
                );
                result.push_error(format!("{} {native_id}: {e}", entity.kind()));
            }
        }
    }

    tracing::info!(
        provider,
        stage = name,
        pages = pages.pages_fetched(),
        skipped,
        "stage finished"
    );
}
