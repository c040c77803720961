use super::{DbPool, DbResult};
use crate::utils::{now_millis, ID_GENERATOR};
use crate::{db_execute, db_object};

db_object! {
    #[derive(Queryable, Selectable, Insertable, Debug)]
    #[diesel(table_name = ia_logs)]
    pub struct IaLog {
        pub id: i64,
        pub timestamp: i64,
        pub user_upn: String,
        pub ticket_id: String,
        pub operation: String,
        pub message_type: Option<String>,
        pub model: Option<String>,
        pub success: Option<bool>,
        pub latency_ms: Option<i32>,
        pub prompt_chars: Option<i32>,
        pub response_chars: Option<i32>,
        pub error_message: Option<String>,
    }
}

/// One LLM invocation, as recorded in `ia_logs`.
#[derive(Debug, Clone, Default)]
pub struct NewIaLog {
    pub user_upn: String,
    pub ticket_id: String,
    pub operation: String,
    pub message_type: Option<String>,
    pub model: Option<String>,
    pub success: bool,
    pub latency_ms: i32,
    pub prompt_chars: i32,
    pub response_chars: Option<i32>,
    pub error_message: Option<String>,
}

impl IaLog {
    pub fn insert(pool: &DbPool, entry: &NewIaLog) -> DbResult<IaLog> {
        let log = IaLog {
            id: ID_GENERATOR.generate_id(),
            timestamp: now_millis(),
            user_upn: entry.user_upn.clone(),
            ticket_id: entry.ticket_id.clone(),
            operation: entry.operation.clone(),
            message_type: entry.message_type.clone(),
            model: entry.model.clone(),
            success: Some(entry.success),
            latency_ms: Some(entry.latency_ms),
            prompt_chars: Some(entry.prompt_chars),
            response_chars: entry.response_chars,
            error_message: entry.error_message.clone(),
        };
        let conn = &mut pool.get_connection()?;
        db_execute!(conn, {
            let row = diesel::insert_into(ia_logs::table)
                .values(IaLogDb::to_db(&log))
                .returning(IaLogDb::as_returning())
                .get_result::<IaLogDb>(conn)?;
            Ok(row.from_db())
        })
    }

    #[cfg(test)]
    pub fn list_by_ticket(pool: &DbPool, ticket_id: &str) -> DbResult<Vec<IaLog>> {
        let conn = &mut pool.get_connection()?;
        db_execute!(conn, {
            let rows = ia_logs::table
                .filter(ia_logs::dsl::ticket_id.eq(ticket_id))
                .order(ia_logs::dsl::id.asc())
                .select(IaLogDb::as_select())
                .load::<IaLogDb>(conn)?;
            Ok(rows.into_iter().map(|r| r.from_db()).collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::sqlite_pool;

    #[test]
    fn test_insert_and_list_by_ticket() {
        let (_dir, pool) = sqlite_pool();
        IaLog::insert(
            &pool,
            &NewIaLog {
                user_upn: "ana@contoso.com".to_string(),
                ticket_id: "10".to_string(),
                operation: "generate_reply".to_string(),
                message_type: Some("cierre".to_string()),
                model: Some("gpt-4o-mini".to_string()),
                success: false,
                latency_ms: 120,
                prompt_chars: 800,
                response_chars: None,
                error_message: Some("timeout".to_string()),
            },
        )
        .unwrap();

        let logs = IaLog::list_by_ticket(&pool, "10").unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].success, Some(false));
        assert_eq!(logs[0].latency_ms, Some(120));
        assert_eq!(logs[0].error_message.as_deref(), Some("timeout"));
        assert!(IaLog::list_by_ticket(&pool, "11").unwrap().is_empty());
    }
}
