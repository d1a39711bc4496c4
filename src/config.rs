// ⚙️ Process configuration - built once at startup, passed explicitly
// Credentials come from .env.local (if present) or the process environment;
// nothing else reads ambient state.

use anyhow::{bail, Result};
use std::path::PathBuf;

/// Everything the run needs from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Destination base URL, without trailing slash
    pub supabase_url: String,
    /// Service-role key, sent as bearer credential
    pub service_key: String,
    /// Directory holding the five export files
    pub export_dir: PathBuf,
}

impl Config {
    /// Load configuration. Missing credentials are fatal before any export
    /// file is touched.
    pub fn from_env() -> Result<Self> {
        // Values already in the environment win over .env.local
        let _ = dotenvy::from_filename(".env.local");

        let supabase_url = env_value("SUPABASE_URL");
        let service_key = env_value("SUPABASE_SERVICE_ROLE_KEY");
        if supabase_url.is_empty() || service_key.is_empty() {
            bail!("Faltan SUPABASE_URL o SUPABASE_SERVICE_ROLE_KEY en el entorno.");
        }

        let export_dir = match env_value("CRM_EXPORT_DIR") {
            dir if dir.is_empty() => PathBuf::from("."),
            dir => PathBuf::from(dir),
        };

        Ok(Config {
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            service_key,
            export_dir,
        })
    }
}

fn env_value(key: &str) -> String {
    std::env::var(key).unwrap_or_default().trim().to_string()
}
