use chrono::Utc;
use log::info;
use std::io::Write;

/// Log setup shared by both binaries
pub struct CharlaLogger;

impl CharlaLogger {
    /// Installs the global logger. `RUST_LOG` overrides `level` when set.
    pub fn init(level: &str) -> Result<(), Box<dyn std::error::Error>> {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{}] [{}] [{}:{}] {}",
                    Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
                    record.level(),
                    record.file().unwrap_or("unknown"),
                    record.line().unwrap_or(0),
                    record.args()
                )
            })
            .try_init()?;

        info!("Charla logger initialized at level {}", level);
        Ok(())
    }
}
