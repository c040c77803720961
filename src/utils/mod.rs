use chrono::Utc;
use cyder_tools::snow_flake::Snowflake;
use once_cell::sync::Lazy;

pub mod auth;
pub mod review_token;
pub mod sla;

pub static ID_GENERATOR: Lazy<Snowflake> = Lazy::new(|| Snowflake::new(1));

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
