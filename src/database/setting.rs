use std::collections::HashMap;

use serde_json::Value;

use super::{DbPool, DbResult};
use crate::utils::{now_millis, ID_GENERATOR};
use crate::{db_execute, db_object};

db_object! {
    #[derive(Queryable, Selectable, Insertable, Debug)]
    #[diesel(table_name = settings)]
    pub struct Setting {
        pub id: i64,
        pub key: String,
        pub value: Value,
        pub created_at: i64,
        pub updated_at: i64,
    }
}

impl Setting {
    pub fn load_map(pool: &DbPool) -> DbResult<HashMap<String, Value>> {
        let conn = &mut pool.get_connection()?;
        db_execute!(conn, {
            let rows = settings::table
                .select(SettingDb::as_select())
                .load::<SettingDb>(conn)?;
            Ok(rows
                .into_iter()
                .map(|r| {
                    let s = r.from_db();
                    (s.key, s.value)
                })
                .collect())
        })
    }

    pub fn upsert(pool: &DbPool, key: &str, value: &Value) -> DbResult<Setting> {
        let now = now_millis();
        let new_setting = Setting {
            id: ID_GENERATOR.generate_id(),
            key: key.to_string(),
            value: value.clone(),
            created_at: now,
            updated_at: now,
        };
        let conn = &mut pool.get_connection()?;
        db_execute!(conn, {
            let row = diesel::insert_into(settings::table)
                .values(SettingDb::to_db(&new_setting))
                .on_conflict(settings::dsl::key)
                .do_update()
                .set((
                    settings::dsl::value.eq(value),
                    settings::dsl::updated_at.eq(now),
                ))
                .returning(SettingDb::as_returning())
                .get_result::<SettingDb>(conn)?;
            Ok(row.from_db())
        })
    }
}
