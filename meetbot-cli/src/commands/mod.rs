pub mod backup;
pub mod status;
pub mod upgrade;

// Backup commands
pub use backup::{run_backup, run_clean, run_list_backups, run_rollback};

// Status commands
pub use status::run_status;

// Upgrade commands
pub use upgrade::run_upgrade;
