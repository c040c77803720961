use std::path::Path;

use cyder_tools::log::info;
use diesel::{
    r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection},
    Connection, PgConnection, RunQueryDsl, SqliteConnection,
};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use thiserror::Error;

use crate::controller::BaseError;

pub mod ia_log;
pub mod org_profile;
pub mod persona_config;
pub mod services_catalog;
pub mod setting;
pub mod technician_mapping;
pub mod ticket_flags;

pub enum DbType {
    Postgres,
    Sqlite,
}

#[derive(Clone)]
pub enum DbPool {
    Postgres(Pool<ConnectionManager<PgConnection>>),
    Sqlite(Pool<ConnectionManager<SqliteConnection>>),
}

pub enum DbConnection {
    Postgres(PooledConnection<ConnectionManager<PgConnection>>),
    Sqlite(PooledConnection<ConnectionManager<SqliteConnection>>),
}

#[derive(Debug, Error)]
pub enum DbInitError {
    #[error("failed to connect to database: {0}")]
    Connection(#[from] diesel::ConnectionError),
    #[error("failed to prepare database: {0}")]
    Query(#[from] diesel::result::Error),
    #[error("failed to run migrations: {0}")]
    Migration(String),
    #[error("failed to create pool: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("failed to create database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid schema name: {0}")]
    Schema(String),
}

fn parse_db_type(db_url: &str) -> DbType {
    if db_url.starts_with("postgres") {
        DbType::Postgres
    } else {
        DbType::Sqlite
    }
}

impl DbPool {
    pub fn establish(db_url: &str, schema: &str) -> Result<Self, DbInitError> {
        match parse_db_type(db_url) {
            DbType::Postgres => Ok(DbPool::Postgres(init_pg_pool(db_url, schema)?)),
            DbType::Sqlite => Ok(DbPool::Sqlite(init_sqlite_pool(db_url)?)),
        }
    }

    pub fn get_connection(&self) -> DbResult<DbConnection> {
        match self {
            DbPool::Postgres(pool) => Ok(DbConnection::Postgres(pool.get()?)),
            DbPool::Sqlite(pool) => Ok(DbConnection::Sqlite(pool.get()?)),
        }
    }

    /// Runs `SELECT 1` on a pooled connection.
    pub fn ping(&self) -> DbResult<()> {
        let conn = &mut self.get_connection()?;
        match conn {
            DbConnection::Postgres(conn) => diesel::sql_query("SELECT 1").execute(conn)?,
            DbConnection::Sqlite(conn) => diesel::sql_query("SELECT 1").execute(conn)?,
        };
        Ok(())
    }
}

#[path = "../schema/sqlite.rs"]
pub mod _sqlite_schema;

#[path = "../schema/postgres.rs"]
pub mod _postgres_schema;

#[macro_export]
macro_rules! db_object {
    (
        $(
            $( #[$attr:meta] )*
            pub struct $name:ident {
                $( $( #[$field_attr:meta] )* $vis:vis $field:ident : $typ:ty ),+
                $(,)?
            }
        )+
    ) => {
        $(
            #[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
            pub struct $name { $( $vis $field : $typ, )+ }
        )+

        pub mod _postgres_model {
            $( $crate::db_object! { @expand postgres |  $( #[$attr] )* | $name |  $( $( #[$field_attr] )* $field : $typ ),+ } )+
        }
        pub mod _sqlite_model {
            $( $crate::db_object! { @expand sqlite |  $( #[$attr] )* | $name |  $( $( #[$field_attr] )* $field : $typ ),+ } )+
        }
    };
    ( @expand $db_type:ident | $( #[$attr:meta] )* | $name:ident | $( $( #[$field_attr:meta] )* $vis:vis $field:ident : $typ:ty),+) => {
        paste::paste! {
            #[allow(unused_imports)] use super::*;
            #[allow(unused_imports)] use crate::database::[<_ $db_type _schema>]::*;
            #[allow(unused_imports)] use diesel::prelude::*;

            $( #[$attr] )*
            pub struct [<$name Db>] { $(
                $( #[$field_attr] )* $vis $field : $typ,
            )+ }

            impl [<$name Db>] {
                #[inline(always)]
                #[allow(dead_code)]
                pub fn from_db(self) -> super::$name {
                    super::$name { $( $field: self.$field, )+ }
                }

                #[inline(always)]
                #[allow(dead_code)]
                pub fn to_db(x: &super::$name) -> Self {
                    Self {
                        $( $field: x.$field.clone(), )+
                    }
                }
            }
        }
    }
}

#[macro_export]
macro_rules! db_execute {
    ($conn:ident, $block:block) => {
        match $conn {
            crate::database::DbConnection::Postgres($conn) => {
                use crate::database::_postgres_schema::*;
                #[allow(unused_imports)]
                use _postgres_model::*;
                #[allow(unused_imports)]
                use diesel::prelude::*;

                $block
            }
            crate::database::DbConnection::Sqlite($conn) => {
                use crate::database::_sqlite_schema::*;
                #[allow(unused_imports)]
                use _sqlite_model::*;
                #[allow(unused_imports)]
                use diesel::prelude::*;

                $block
            }
        }
    };
}

const SQLITE_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/sqlite");
const POSTGRES_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/postgres");

/// Points every pooled Postgres connection at the configured schema.
#[derive(Debug)]
struct SearchPathCustomizer {
    schema: String,
}

impl CustomizeConnection<PgConnection, diesel::r2d2::Error> for SearchPathCustomizer {
    fn on_acquire(&self, conn: &mut PgConnection) -> Result<(), diesel::r2d2::Error> {
        diesel::sql_query(format!("SET search_path TO \"{}\"", self.schema))
            .execute(conn)
            .map(|_| ())
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

#[derive(Debug)]
struct SqliteCustomizer;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqliteCustomizer {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        diesel::sql_query("PRAGMA busy_timeout = 5000")
            .execute(conn)
            .map(|_| ())
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

fn init_sqlite_pool(db_url: &str) -> Result<Pool<ConnectionManager<SqliteConnection>>, DbInitError> {
    let db_path = db_url.strip_prefix("sqlite://").unwrap_or(db_url);
    if let Some(parent_dir) = Path::new(db_path).parent() {
        if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
            std::fs::create_dir_all(parent_dir)?;
        }
    }

    let mut connection = SqliteConnection::establish(db_path)?;
    let applied = connection
        .run_pending_migrations(SQLITE_MIGRATIONS)
        .map_err(|e| DbInitError::Migration(e.to_string()))?;
    info!("sqlite migrations applied: {}", applied.len());

    let manager = ConnectionManager::<SqliteConnection>::new(db_path);
    Ok(Pool::builder()
        .test_on_check_out(true)
        .max_size(5)
        .connection_customizer(Box::new(SqliteCustomizer))
        .build(manager)?)
}

fn init_pg_pool(db_url: &str, schema: &str) -> Result<Pool<ConnectionManager<PgConnection>>, DbInitError> {
    if schema.is_empty() || schema.contains('"') {
        return Err(DbInitError::Schema(schema.to_string()));
    }
    let mut connection = PgConnection::establish(db_url)?;
    diesel::sql_query(format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", schema)).execute(&mut connection)?;
    diesel::sql_query(format!("SET search_path TO \"{}\"", schema)).execute(&mut connection)?;
    let applied = connection
        .run_pending_migrations(POSTGRES_MIGRATIONS)
        .map_err(|e| DbInitError::Migration(e.to_string()))?;
    info!("postgres migrations applied on schema {}: {}", schema, applied.len());

    let manager = ConnectionManager::<PgConnection>::new(db_url);
    Ok(Pool::builder()
        .max_size(5)
        .connection_customizer(Box::new(SearchPathCustomizer {
            schema: schema.to_string(),
        }))
        .build(manager)?)
}

pub type DbResult<T> = Result<T, BaseError>;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_db_type() {
        assert!(matches!(parse_db_type("postgres://localhost/copilot"), DbType::Postgres));
        assert!(matches!(parse_db_type("postgresql://localhost/copilot"), DbType::Postgres));
        assert!(matches!(parse_db_type("data/copilot.db"), DbType::Sqlite));
        assert!(matches!(parse_db_type("sqlite://data/copilot.db"), DbType::Sqlite));
    }

    #[test]
    fn test_sqlite_pool_is_migrated_and_pingable() {
        let (_dir, pool) = test_support::sqlite_pool();
        assert!(pool.ping().is_ok());
    }
}
