use super::{DbPool, DbResult};
use crate::utils::{now_millis, ID_GENERATOR};
use crate::{db_execute, db_object};

db_object! {
    #[derive(Queryable, Selectable, Insertable, Debug)]
    #[diesel(table_name = technician_mapping)]
    pub struct TechnicianMapping {
        pub id: i64,
        pub user_upn: String,
        pub technician_id_sdp: String,
        pub active: bool,
        pub created_at: i64,
        pub updated_at: i64,
    }
}

impl TechnicianMapping {
    /// The active mapping for a user principal name, if any.
    pub fn get_active_by_upn(pool: &DbPool, upn: &str) -> DbResult<Option<TechnicianMapping>> {
        let conn = &mut pool.get_connection()?;
        db_execute!(conn, {
            let row = technician_mapping::table
                .filter(technician_mapping::dsl::user_upn.eq(upn))
                .filter(technician_mapping::dsl::active.eq(true))
                .select(TechnicianMappingDb::as_select())
                .first::<TechnicianMappingDb>(conn)
                .optional()?;
            Ok(row.map(|r| r.from_db()))
        })
    }

    /// Inserts or updates the mapping keyed by `user_upn`.
    pub fn upsert(
        pool: &DbPool,
        upn: &str,
        technician_id_sdp: &str,
        active: bool,
    ) -> DbResult<TechnicianMapping> {
        let now = now_millis();
        let new_mapping = TechnicianMapping {
            id: ID_GENERATOR.generate_id(),
            user_upn: upn.to_string(),
            technician_id_sdp: technician_id_sdp.to_string(),
            active,
            created_at: now,
            updated_at: now,
        };
        let conn = &mut pool.get_connection()?;
        db_execute!(conn, {
            let row = diesel::insert_into(technician_mapping::table)
                .values(TechnicianMappingDb::to_db(&new_mapping))
                .on_conflict(technician_mapping::dsl::user_upn)
                .do_update()
                .set((
                    technician_mapping::dsl::technician_id_sdp.eq(technician_id_sdp),
                    technician_mapping::dsl::active.eq(active),
                    technician_mapping::dsl::updated_at.eq(now),
                ))
                .returning(TechnicianMappingDb::as_returning())
                .get_result::<TechnicianMappingDb>(conn)?;
            Ok(row.from_db())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::sqlite_pool;

    #[test]
    fn test_only_active_mapping_is_resolved() {
        let (_dir, pool) = sqlite_pool();
        TechnicianMapping::upsert(&pool, "ana@contoso.com", "501", true).unwrap();
        TechnicianMapping::upsert(&pool, "luis@contoso.com", "502", false).unwrap();

        let ana = TechnicianMapping::get_active_by_upn(&pool, "ana@contoso.com").unwrap();
        assert_eq!(ana.map(|m| m.technician_id_sdp), Some("501".to_string()));
        assert!(TechnicianMapping::get_active_by_upn(&pool, "luis@contoso.com").unwrap().is_none());
        assert!(TechnicianMapping::get_active_by_upn(&pool, "nobody@contoso.com").unwrap().is_none());
    }

    #[test]
    fn test_upsert_keeps_single_row_per_upn() {
        let (_dir, pool) = sqlite_pool();
        let first = TechnicianMapping::upsert(&pool, "ana@contoso.com", "501", true).unwrap();
        let second = TechnicianMapping::upsert(&pool, "ana@contoso.com", "777", true).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.technician_id_sdp, "777");
    }
}
