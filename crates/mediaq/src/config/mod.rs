pub mod loader;
pub mod schema;

pub use loader::{
    apply_overrides, load, load_config, load_config_from_str, load_from_env, load_from_lookup,
    ENV_PREFIX,
};
pub use schema::{LogFormat, WorkerConfig};
