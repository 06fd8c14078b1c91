// Connected accounts, watermarks and the account store
pub mod account;

// Action model and property normalization
pub mod action;

// Sync configuration (TOML + environment)
pub mod config;

// OAuth credentials and token encryption
pub mod credentials;

// Action sinks
pub mod sink;

pub use account::{Account, AccountStore, Resource, SqliteAccountStore};
pub use action::Action;
pub use credentials::Credentials;
pub use sink::ActionSink;
