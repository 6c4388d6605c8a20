pub mod dossier;
pub mod task;

pub use dossier::*;
pub use task::*;
