// 🔄 Remote sync engine - idempotent upsert against the destination API
// PostgREST semantics: create-or-update keyed on the natural external_id with
// merge-on-conflict, then a full paginated listing to rebuild the id map.
// Every call is synchronous; a failed batch aborts the run (re-running is
// safe because the upsert is idempotent per row).

use crate::config::Config;
use crate::entities::EntityKind;
use crate::resolve::IdMap;
use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use reqwest::Method;
use serde_json::Value;

/// Rows per upsert request.
pub const UPSERT_BATCH_SIZE: usize = 500;
/// Rows per id-map listing page.
pub const ID_MAP_PAGE_SIZE: usize = 1000;

/// The destination store seam. The pipeline only ever needs these two
/// operations; tests run against an in-memory implementation.
pub trait CrmStore {
    /// Create-or-update a set of rows, batched, keyed on `conflict_key`.
    fn upsert(&self, kind: EntityKind, rows: &[Value], conflict_key: &str) -> Result<()>;

    /// Full `external_id → internal id` mapping for one entity table,
    /// reflecting the destination's complete current state (earlier imports
    /// included), not just this run's writes.
    fn fetch_id_map(&self, kind: EntityKind) -> Result<IdMap>;
}

/// Production store over the Supabase REST interface.
pub struct SupabaseStore {
    base_url: String,
    service_key: String,
    http: Client,
}

impl SupabaseStore {
    pub fn new(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .build()
            .context("Failed to build HTTP client")?;
        Ok(SupabaseStore {
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
            http,
        })
    }

    /// One REST call. Non-success responses become errors carrying method,
    /// URL, status code and response body, so the operator can diagnose and
    /// re-run. An empty success body reads as zero rows.
    fn request(
        &self,
        method: Method,
        table: &str,
        query: &str,
        payload: Option<&Value>,
        prefer: Option<&str>,
    ) -> Result<Vec<Value>> {
        let url = format!("{}/rest/v1/{}{}", self.base_url, table, query);
        let mut request = self
            .http
            .request(method.clone(), url.as_str())
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
            .header("Content-Type", "application/json");
        if let Some(prefer) = prefer {
            request = request.header("Prefer", prefer);
        }
        if let Some(payload) = payload {
            request = request.json(payload);
        }
        let response = request
            .send()
            .with_context(|| format!("{method} {url} failed"))?;
        let status = response.status();
        if !status.is_success() {
            // Body is error-message decoration here; a failed read still aborts
            let body = response.text().unwrap_or_default();
            bail!("{method} {url} -> {}: {body}", status.as_u16());
        }
        // A body read that dies mid-transfer must abort the run: treating it
        // as an empty page would truncate the id map and null later FKs
        let body = response
            .text()
            .with_context(|| format!("{method} {url} body read failed"))?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&body)
            .with_context(|| format!("{method} {url} returned an unexpected body"))
    }
}

impl CrmStore for SupabaseStore {
    fn upsert(&self, kind: EntityKind, rows: &[Value], conflict_key: &str) -> Result<()> {
        for (batch_index, batch) in rows.chunks(UPSERT_BATCH_SIZE).enumerate() {
            let payload = Value::Array(batch.to_vec());
            self.request(
                Method::POST,
                kind.table(),
                &format!("?on_conflict={conflict_key}"),
                Some(&payload),
                Some("resolution=merge-duplicates"),
            )
            .with_context(|| format!("Upsert batch {batch_index} for {} failed", kind.table()))?;
        }
        Ok(())
    }

    fn fetch_id_map(&self, kind: EntityKind) -> Result<IdMap> {
        let mut map = IdMap::new();
        let mut offset = 0usize;
        loop {
            let rows = self.request(
                Method::GET,
                kind.table(),
                &format!("?select=id,external_id&limit={ID_MAP_PAGE_SIZE}&offset={offset}"),
                None,
                None,
            )?;
            if rows.is_empty() {
                break;
            }
            offset += rows.len();
            for row in rows {
                let external_id = external_id_string(row.get("external_id"));
                if external_id.is_empty() {
                    continue;
                }
                if let Some(id) = row.get("id") {
                    map.insert(external_id, id.clone());
                }
            }
        }
        Ok(map)
    }
}

/// External ids come back as strings or numbers depending on the column
/// type; both compare as strings everywhere else.
pub(crate) fn external_id_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_external_id_string() {
        assert_eq!(external_id_string(Some(&json!("123"))), "123");
        assert_eq!(external_id_string(Some(&json!(123))), "123");
        assert_eq!(external_id_string(Some(&Value::Null)), "");
        assert_eq!(external_id_string(None), "");
    }

    #[test]
    fn test_truncated_body_is_fatal() {
        use crate::config::Config;
        use std::io::{Read, Write};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buffer = [0u8; 2048];
            let _ = stream.read(&mut buffer);
            // Declared length exceeds what gets sent, then the connection
            // drops: a 200 whose body read fails client-side
            let _ = stream.write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 9999\r\n\r\n[");
        });

        let config = Config {
            supabase_url: format!("http://{addr}"),
            service_key: "test-key".to_string(),
            export_dir: std::path::PathBuf::from("."),
        };
        let store = SupabaseStore::new(&config).unwrap();
        let error = store.fetch_id_map(EntityKind::Client).unwrap_err();
        // Must abort, never read as an empty page (which would truncate the
        // id map and null every later foreign key)
        assert!(
            error.to_string().contains("body read failed"),
            "unexpected error: {error:#}"
        );
        server.join().unwrap();
    }

    #[test]
    fn test_batch_partitioning() {
        let rows: Vec<Value> = (0..1201).map(|i| json!({ "external_id": i })).collect();
        let batches: Vec<&[Value]> = rows.chunks(UPSERT_BATCH_SIZE).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 500);
        assert_eq!(batches[2].len(), 201);
    }
}
