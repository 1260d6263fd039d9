pub mod filesystem;
pub mod public;

pub use filesystem::{ensure_directory, move_file, remove_best_effort, write_atomic};
pub use public::PublicFiles;
