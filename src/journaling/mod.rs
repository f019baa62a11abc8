pub mod autosave;

pub use autosave::{AutoSaveEvent, AutoSaveStatus, AutosaveController, DebounceTimer, SaveTrigger};
