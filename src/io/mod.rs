// External I/O operations module
pub mod lock; // Single-instance lock file and notifying the running instance
pub mod signals; // Unix signal handling
