use serde_json::Value;

use super::{DbPool, DbResult};
use crate::utils::{now_millis, ID_GENERATOR};
use crate::{db_execute, db_object};

db_object! {
    #[derive(Queryable, Selectable, Insertable, Debug)]
    #[diesel(table_name = services_catalog)]
    pub struct ServiceCatalog {
        pub id: i64,
        pub service_code: String,
        pub name: String,
        pub short_description: Option<String>,
        pub requirements: Option<String>,
        pub first_response_notes: Option<String>,
        pub update_notes: Option<String>,
        pub closure_notes: Option<String>,
        pub comm_sla_p1_hours: Option<f64>,
        pub comm_sla_p2_hours: Option<f64>,
        pub comm_sla_p3_hours: Option<f64>,
        pub comm_sla_p4_hours: Option<f64>,
        pub sdp_mapping_info: Option<Value>,
        pub created_at: i64,
        pub updated_at: i64,
    }
}

impl ServiceCatalog {
    pub fn get_by_code(pool: &DbPool, code: &str) -> DbResult<Option<ServiceCatalog>> {
        let conn = &mut pool.get_connection()?;
        db_execute!(conn, {
            let row = services_catalog::table
                .filter(services_catalog::dsl::service_code.eq(code))
                .select(ServiceCatalogDb::as_select())
                .first::<ServiceCatalogDb>(conn)
                .optional()?;
            Ok(row.map(|r| r.from_db()))
        })
    }

    /// Case-insensitive lookup. An exact match wins over a folded one.
    pub fn get_by_code_ignore_case(pool: &DbPool, code: &str) -> DbResult<Option<ServiceCatalog>> {
        if let Some(found) = Self::get_by_code(pool, code)? {
            return Ok(Some(found));
        }
        let wanted = code.to_lowercase();
        Ok(Self::list_all(pool)?
            .into_iter()
            .find(|s| s.service_code.to_lowercase() == wanted))
    }

    pub fn list_all(pool: &DbPool) -> DbResult<Vec<ServiceCatalog>> {
        let conn = &mut pool.get_connection()?;
        db_execute!(conn, {
            let rows = services_catalog::table
                .order(services_catalog::dsl::service_code.asc())
                .select(ServiceCatalogDb::as_select())
                .load::<ServiceCatalogDb>(conn)?;
            Ok(rows.into_iter().map(|r| r.from_db()).collect())
        })
    }

    /// Inserts or replaces the entry keyed by `service_code`. `id` and the
    /// timestamps of `item` are ignored.
    pub fn upsert(pool: &DbPool, item: &ServiceCatalog) -> DbResult<ServiceCatalog> {
        let now = now_millis();
        let new_item = ServiceCatalog {
            id: ID_GENERATOR.generate_id(),
            created_at: now,
            updated_at: now,
            ..item.clone()
        };
        let conn = &mut pool.get_connection()?;
        db_execute!(conn, {
            let row = diesel::insert_into(services_catalog::table)
                .values(ServiceCatalogDb::to_db(&new_item))
                .on_conflict(services_catalog::dsl::service_code)
                .do_update()
                .set((
                    services_catalog::dsl::name.eq(&new_item.name),
                    services_catalog::dsl::short_description.eq(&new_item.short_description),
                    services_catalog::dsl::requirements.eq(&new_item.requirements),
                    services_catalog::dsl::first_response_notes.eq(&new_item.first_response_notes),
                    services_catalog::dsl::update_notes.eq(&new_item.update_notes),
                    services_catalog::dsl::closure_notes.eq(&new_item.closure_notes),
                    services_catalog::dsl::comm_sla_p1_hours.eq(new_item.comm_sla_p1_hours),
                    services_catalog::dsl::comm_sla_p2_hours.eq(new_item.comm_sla_p2_hours),
                    services_catalog::dsl::comm_sla_p3_hours.eq(new_item.comm_sla_p3_hours),
                    services_catalog::dsl::comm_sla_p4_hours.eq(new_item.comm_sla_p4_hours),
                    services_catalog::dsl::sdp_mapping_info.eq(&new_item.sdp_mapping_info),
                    services_catalog::dsl::updated_at.eq(now),
                ))
                .returning(ServiceCatalogDb::as_returning())
                .get_result::<ServiceCatalogDb>(conn)?;
            Ok(row.from_db())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::sqlite_pool;
    use serde_json::json;

    fn network_service() -> ServiceCatalog {
        ServiceCatalog {
            service_code: "NET-01".to_string(),
            name: "Red corporativa".to_string(),
            comm_sla_p1_hours: Some(4.0),
            sdp_mapping_info: Some(json!({"category": "Network"})),
            ..Default::default()
        }
    }

    #[test]
    fn test_lookup_exact_and_ignore_case() {
        let (_dir, pool) = sqlite_pool();
        ServiceCatalog::upsert(&pool, &network_service()).unwrap();

        assert!(ServiceCatalog::get_by_code(&pool, "NET-01").unwrap().is_some());
        assert!(ServiceCatalog::get_by_code(&pool, "net-01").unwrap().is_none());
        let folded = ServiceCatalog::get_by_code_ignore_case(&pool, "net-01").unwrap().unwrap();
        assert_eq!(folded.name, "Red corporativa");
        assert_eq!(folded.sdp_mapping_info, Some(json!({"category": "Network"})));
    }

    #[test]
    fn test_upsert_replaces_by_code() {
        let (_dir, pool) = sqlite_pool();
        let first = ServiceCatalog::upsert(&pool, &network_service()).unwrap();
        let mut changed = network_service();
        changed.comm_sla_p1_hours = Some(2.0);
        let second = ServiceCatalog::upsert(&pool, &changed).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.comm_sla_p1_hours, Some(2.0));
        assert_eq!(ServiceCatalog::list_all(&pool).unwrap().len(), 1);
    }
}
