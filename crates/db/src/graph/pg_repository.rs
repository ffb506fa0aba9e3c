use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::graph::models::{
    CanonicalGroup, CanonicalIdentity, CanonicalOrganization, MembershipIntent, UpsertOutcome,
    UpsertedKey,
};
use crate::graph::repositories::EntityGraphRepository;
use strata_common::error::{StrataError, StrataResult};

#[derive(Clone)]
pub struct PgEntityGraphRepository {
    pool: PgPool,
}

impl PgEntityGraphRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // `xmax = 0` holds only for a row version created by this statement's insert.
    fn map_upsert_row(row: sqlx::postgres::PgRow) -> StrataResult<UpsertedKey> {
        let inserted: bool = row
            .try_get("inserted")
            .map_err(|e| StrataError::Database(e.to_string()))?;
        Ok(UpsertedKey {
            id: row
                .try_get("id")
                .map_err(|e| StrataError::Database(e.to_string()))?,
            outcome: if inserted {
                UpsertOutcome::Created
            } else {
                UpsertOutcome::Updated
            },
        })
    }
}

#[async_trait]
impl EntityGraphRepository for PgEntityGraphRepository {
    async fn upsert_identity(&self, identity: &CanonicalIdentity) -> StrataResult<UpsertedKey> {
        let row = sqlx::query(
            "insert into canonical_identities
             (id, provider, provider_id, username, email, display_name, identity_type, active, attributes)
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             on conflict (provider, provider_id) do update set
               username = excluded.username,
               email = excluded.email,
               display_name = excluded.display_name,
               identity_type = excluded.identity_type,
               active = excluded.active,
               attributes = excluded.attributes,
               last_seen_at = now(),
               updated_at = now()
             returning id, (xmax = 0) as inserted",
        )
        .bind(Uuid::new_v4())
        .bind(&identity.provider)
        .bind(&identity.provider_id)
        .bind(&identity.username)
        .bind(&identity.email)
        .bind(&identity.display_name)
        .bind(identity.identity_type.as_str())
        .bind(identity.active)
        .bind(&identity.attributes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StrataError::Database(e.to_string()))?;

        Self::map_upsert_row(row)
    }

    async fn upsert_group(&self, group: &CanonicalGroup) -> StrataResult<UpsertedKey> {
        let row = sqlx::query(
            "insert into canonical_groups (id, provider, provider_group_id, name, description)
             values ($1, $2, $3, $4, $5)
             on conflict (provider, provider_group_id) do update set
               name = excluded.name,
               description = excluded.description,
               updated_at = now()
             returning id, (xmax = 0) as inserted",
        )
        .bind(Uuid::new_v4())
        .bind(&group.provider)
        .bind(&group.provider_group_id)
        .bind(&group.name)
        .bind(&group.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StrataError::Database(e.to_string()))?;

        Self::map_upsert_row(row)
    }

    async fn upsert_organization(
        &self,
        organization: &CanonicalOrganization,
    ) -> StrataResult<UpsertedKey> {
        let row = sqlx::query(
            "insert into canonical_organizations (id, provider, provider_org_id, name, web_url)
             values ($1, $2, $3, $4, $5)
             on conflict (provider, provider_org_id) do update set
               name = excluded.name,
               web_url = excluded.web_url,
               updated_at = now()
             returning id, (xmax = 0) as inserted",
        )
        .bind(Uuid::new_v4())
        .bind(&organization.provider)
        .bind(&organization.provider_org_id)
        .bind(&organization.name)
        .bind(&organization.web_url)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StrataError::Database(e.to_string()))?;

        Self::map_upsert_row(row)
    }

    async fn list_membership_intents(
        &self,
        provider: &str,
    ) -> StrataResult<Vec<MembershipIntent>> {
        let rows = sqlx::query(
            "select provider_group_id, provider_user_id
             from group_membership_intents
             where provider = $1
             order by provider_group_id, provider_user_id",
        )
        .bind(provider)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StrataError::Database(e.to_string()))?;

        let mut by_group: BTreeMap<String, MembershipIntent> = BTreeMap::new();
        for row in rows {
            let group_id: String = row.get("provider_group_id");
            let user_id: String = row.get("provider_user_id");
            by_group
                .entry(group_id.clone())
                .or_insert_with(|| MembershipIntent {
                    provider: provider.to_owned(),
                    provider_group_id: group_id,
                    member_ids: Default::default(),
                })
                .member_ids
                .insert(user_id);
        }

        Ok(by_group.into_values().collect())
    }
}
