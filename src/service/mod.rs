pub mod app_state;
pub mod gateway;
pub mod llm;
pub mod mail;
pub mod prompt;
pub mod seed;
pub mod settings;
