use serde_json::Value;

use super::{DbPool, DbResult};
use crate::utils::{now_millis, ID_GENERATOR};
use crate::{db_execute, db_object};

db_object! {
    #[derive(Queryable, Selectable, Insertable, Debug)]
    #[diesel(table_name = persona_config)]
    pub struct PersonaConfig {
        pub id: i64,
        pub role_description: Option<String>,
        pub tone_attributes: Option<Value>,
        pub rules: Option<Value>,
        pub max_reply_length: Option<i32>,
        pub system_prompt_template: Option<String>,
        pub active: bool,
        pub created_at: i64,
        pub updated_at: i64,
    }
}

impl PersonaConfig {
    /// Most recent active persona, i.e. the highest id among active rows.
    pub fn get_active(pool: &DbPool) -> DbResult<Option<PersonaConfig>> {
        let conn = &mut pool.get_connection()?;
        db_execute!(conn, {
            let row = persona_config::table
                .filter(persona_config::dsl::active.eq(true))
                .order(persona_config::dsl::id.desc())
                .select(PersonaConfigDb::as_select())
                .first::<PersonaConfigDb>(conn)
                .optional()?;
            Ok(row.map(|r| r.from_db()))
        })
    }

    /// Inserts a new persona. Older rows keep their `active` flag.
    pub fn create(pool: &DbPool, persona: &PersonaConfig) -> DbResult<PersonaConfig> {
        let now = now_millis();
        let new_persona = PersonaConfig {
            id: ID_GENERATOR.generate_id(),
            created_at: now,
            updated_at: now,
            ..persona.clone()
        };
        let conn = &mut pool.get_connection()?;
        db_execute!(conn, {
            let row = diesel::insert_into(persona_config::table)
                .values(PersonaConfigDb::to_db(&new_persona))
                .returning(PersonaConfigDb::as_returning())
                .get_result::<PersonaConfigDb>(conn)?;
            Ok(row.from_db())
        })
    }
}
