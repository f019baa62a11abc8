pub mod app;
pub mod cli;
pub mod config;
pub mod emoji;
pub mod journaling;
pub mod session;
pub mod storage;
pub mod ui;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use session::{Dispatch, Intent, Session, SessionOptions};
pub use storage::{KeyValueStore, StoreHandle};
