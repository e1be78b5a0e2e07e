use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging for the objmesh application.
pub fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            EnvFilter::new("objmesh=debug")
        } else {
            EnvFilter::new("objmesh=info")
        }
    });

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)?;

    info!("objmesh logging initialized");
    Ok(())
}

/// Initialize logging with fallback behavior if setup fails.
pub fn init_logging_safe() {
    if let Err(e) = init_logging() {
        eprintln!(
            "Warning: Failed to set up advanced logging: {}. Using basic logging.",
            e
        );
        eprintln!("objmesh logging initialized with fallback");
    }
}

/// Log membership/heartbeat events.
pub fn log_membership_event(event: &str, details: &str) {
    info!(target: "objmesh::membership", "{}: {}", event, details);
}

/// Log file-level operations (admission, split, join, delete).
pub fn log_file_operation(operation: &str, hash: &str, details: &str) {
    info!(target: "objmesh::file", "{} {}: {}", operation, hash, details);
}

/// Log shard-level operations (put, get, delete, repair).
pub fn log_shard_operation(operation: &str, shard: &str, details: &str) {
    info!(target: "objmesh::shard", "{} {}: {}", operation, shard, details);
}

/// Log a shard placement failure (fewer than D shards succeeded).
pub fn log_placement_event(hash: &str, details: &str) {
    error!(target: "objmesh::placement", "{}: {}", hash, details);
}

/// Log error with context.
pub fn log_error_with_context(context: &str, error: &dyn std::error::Error) {
    error!(target: "objmesh::error", "{}: {}", context, error);
}
