pub mod bridge;
pub mod config;
pub mod error;
pub mod events;
pub mod mappings;
pub mod script;
pub mod services;
pub mod utils;

pub use bridge::{Bridge, EventSender};
pub use config::{Config, RepeatSettings, SetupConfig};
pub use error::{BridgeError, Result, SpawnError};
pub use script::{CallbackId, ScriptEngine, ScriptError, ScriptValue};
