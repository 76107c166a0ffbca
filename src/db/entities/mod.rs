pub mod state_entries;
