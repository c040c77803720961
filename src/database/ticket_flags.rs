use super::{DbPool, DbResult};
use crate::controller::BaseError;
use crate::utils::{now_millis, ID_GENERATOR};
use crate::{db_execute, db_object};

db_object! {
    #[derive(Queryable, Selectable, Insertable, Debug)]
    #[diesel(table_name = ticket_flags)]
    pub struct TicketFlags {
        pub id: i64,
        pub ticket_id: String,
        pub display_id: Option<String>,
        pub service_code: Option<String>,
        pub priority: Option<String>,
        pub status: Option<String>,
        pub last_user_contact_at: Option<i64>,
        pub hours_since_last_user_contact: Option<f64>,
        pub communication_sla_hours: Option<f64>,
        pub is_silent: bool,
        pub experience_review_requested: bool,
        pub last_review_request_at: Option<i64>,
        pub updated_at: i64,
    }

    // Columns refreshed on every fetch. The review columns are left alone.
    #[derive(AsChangeset, Debug)]
    #[diesel(table_name = ticket_flags, treat_none_as_null = true)]
    pub struct TicketFlagsUpdate {
        pub display_id: Option<String>,
        pub service_code: Option<String>,
        pub priority: Option<String>,
        pub status: Option<String>,
        pub last_user_contact_at: Option<i64>,
        pub hours_since_last_user_contact: Option<f64>,
        pub communication_sla_hours: Option<f64>,
        pub is_silent: bool,
        pub updated_at: i64,
    }
}

/// What a ticket fetch observed about a ticket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TicketObservation {
    pub ticket_id: String,
    pub display_id: Option<String>,
    pub service_code: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub last_user_contact_at: Option<i64>,
    pub hours_since_last_user_contact: Option<f64>,
    pub communication_sla_hours: Option<f64>,
    pub is_silent: bool,
}

impl TicketObservation {
    fn new_row(&self, now: i64) -> TicketFlags {
        TicketFlags {
            id: ID_GENERATOR.generate_id(),
            ticket_id: self.ticket_id.clone(),
            display_id: self.display_id.clone(),
            service_code: self.service_code.clone(),
            priority: self.priority.clone(),
            status: self.status.clone(),
            last_user_contact_at: self.last_user_contact_at,
            hours_since_last_user_contact: self.hours_since_last_user_contact,
            communication_sla_hours: self.communication_sla_hours,
            is_silent: self.is_silent,
            experience_review_requested: false,
            last_review_request_at: None,
            updated_at: now,
        }
    }

    fn changes(&self, now: i64) -> TicketFlagsUpdate {
        TicketFlagsUpdate {
            display_id: self.display_id.clone(),
            service_code: self.service_code.clone(),
            priority: self.priority.clone(),
            status: self.status.clone(),
            last_user_contact_at: self.last_user_contact_at,
            hours_since_last_user_contact: self.hours_since_last_user_contact,
            communication_sla_hours: self.communication_sla_hours,
            is_silent: self.is_silent,
            updated_at: now,
        }
    }
}

impl TicketFlags {
    #[cfg(test)]
    pub fn get_by_ticket_id(pool: &DbPool, ticket_id: &str) -> DbResult<Option<TicketFlags>> {
        let conn = &mut pool.get_connection()?;
        db_execute!(conn, {
            let row = ticket_flags::table
                .filter(ticket_flags::dsl::ticket_id.eq(ticket_id))
                .select(TicketFlagsDb::as_select())
                .first::<TicketFlagsDb>(conn)
                .optional()?;
            Ok(row.map(|r| r.from_db()))
        })
    }

    /// Records a fetch. Never touches the review columns of an existing row.
    pub fn upsert_observation(pool: &DbPool, observation: &TicketObservation) -> DbResult<TicketFlags> {
        Self::upsert_many(pool, std::slice::from_ref(observation))?
            .pop()
            .ok_or(BaseError::DatabaseFatal(BaseError::detail("ticket_flags upsert returned no row")))
    }

    /// Upserts a batch in one transaction, returning rows in input order.
    pub fn upsert_many(
        pool: &DbPool,
        observations: &[TicketObservation],
    ) -> DbResult<Vec<TicketFlags>> {
        let conn = &mut pool.get_connection()?;
        db_execute!(conn, {
            conn.transaction::<_, BaseError, _>(|conn| {
                let mut rows = Vec::with_capacity(observations.len());
                for observation in observations {
                    let now = now_millis();
                    let row = diesel::insert_into(ticket_flags::table)
                        .values(TicketFlagsDb::to_db(&observation.new_row(now)))
                        .on_conflict(ticket_flags::dsl::ticket_id)
                        .do_update()
                        .set(TicketFlagsUpdateDb::to_db(&observation.changes(now)))
                        .returning(TicketFlagsDb::as_returning())
                        .get_result::<TicketFlagsDb>(conn)?;
                    rows.push(row.from_db());
                }
                Ok(rows)
            })
        })
    }

    /// Marks the ticket as having a requested experience review, creating
    /// the row when the ticket was never fetched.
    pub fn mark_review_requested(pool: &DbPool, ticket_id: &str) -> DbResult<TicketFlags> {
        let now = now_millis();
        let new_row = TicketFlags {
            id: ID_GENERATOR.generate_id(),
            ticket_id: ticket_id.to_string(),
            experience_review_requested: true,
            last_review_request_at: Some(now),
            updated_at: now,
            ..Default::default()
        };
        let conn = &mut pool.get_connection()?;
        db_execute!(conn, {
            let row = diesel::insert_into(ticket_flags::table)
                .values(TicketFlagsDb::to_db(&new_row))
                .on_conflict(ticket_flags::dsl::ticket_id)
                .do_update()
                .set((
                    ticket_flags::dsl::experience_review_requested.eq(true),
                    ticket_flags::dsl::last_review_request_at.eq(Some(now)),
                    ticket_flags::dsl::updated_at.eq(now),
                ))
                .returning(TicketFlagsDb::as_returning())
                .get_result::<TicketFlagsDb>(conn)?;
            Ok(row.from_db())
        })
    }
}
