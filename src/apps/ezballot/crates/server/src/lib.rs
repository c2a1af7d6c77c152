// Library interface for the ezballot server
// This exposes the internal modules for testing and external use

pub mod api;
pub mod cli;
pub mod config;
pub mod election;
pub mod refresh;
pub mod state;
pub mod storage;

// Re-export commonly used types for convenience
pub use config::AppConfig;
pub use election::Election;
pub use refresh::ResultsRefresher;
pub use state::AppState;
