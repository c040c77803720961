use serde_json::Value;

use super::{DbPool, DbResult};
use crate::utils::{now_millis, ID_GENERATOR};
use crate::{db_execute, db_object};

db_object! {
    #[derive(Queryable, Selectable, Insertable, Debug)]
    #[diesel(table_name = org_profile)]
    pub struct OrgProfile {
        pub id: i64,
        pub industry: Option<String>,
        pub context: Option<String>,
        pub critical_services: Option<Value>,
        pub tone_notes: Option<String>,
        pub created_at: i64,
        pub updated_at: i64,
    }
}

impl OrgProfile {
    /// The profile with the lowest id.
    pub fn get_current(pool: &DbPool) -> DbResult<Option<OrgProfile>> {
        let conn = &mut pool.get_connection()?;
        db_execute!(conn, {
            let row = org_profile::table
                .order(org_profile::dsl::id.asc())
                .select(OrgProfileDb::as_select())
                .first::<OrgProfileDb>(conn)
                .optional()?;
            Ok(row.map(|r| r.from_db()))
        })
    }

    /// Replaces the current profile in place, or creates the first one.
    pub fn save(pool: &DbPool, profile: &OrgProfile) -> DbResult<OrgProfile> {
        let now = now_millis();
        let current = Self::get_current(pool)?;
        let conn = &mut pool.get_connection()?;
        db_execute!(conn, {
            let row = match current {
                Some(existing) => diesel::update(org_profile::table.find(existing.id))
                    .set((
                        org_profile::dsl::industry.eq(&profile.industry),
                        org_profile::dsl::context.eq(&profile.context),
                        org_profile::dsl::critical_services.eq(&profile.critical_services),
                        org_profile::dsl::tone_notes.eq(&profile.tone_notes),
                        org_profile::dsl::updated_at.eq(now),
                    ))
                    .returning(OrgProfileDb::as_returning())
                    .get_result::<OrgProfileDb>(conn)?,
                None => {
                    let new_profile = OrgProfile {
                        id: ID_GENERATOR.generate_id(),
                        created_at: now,
                        updated_at: now,
                        ..profile.clone()
                    };
                    diesel::insert_into(org_profile::table)
                        .values(OrgProfileDb::to_db(&new_profile))
                        .returning(OrgProfileDb::as_returning())
                        .get_result::<OrgProfileDb>(conn)?
                }
            };
            Ok(row.from_db())
        })
    }
}
