// CRM Import - Core Library
// Migrates Pipedrive exports (organizations, people, deals, activities,
// notes) into the CRM backend, idempotently, keyed on external_id.

pub mod config;
pub mod entities;
pub mod extract;
pub mod normalize;
pub mod pipeline;
pub mod resolve;
pub mod sync;
pub mod table;

// Re-export commonly used types
pub use config::Config;
pub use entities::{client_link_index, EntityKind, Record};
pub use extract::{
    extract_activities, extract_clients, extract_contacts, extract_notes, extract_opportunities,
};
pub use normalize::{
    combine_date_time, normalize_id, normalize_name, normalize_text, parse_bool,
    parse_duration_minutes, parse_number, split_tags, to_iso,
};
pub use pipeline::{run, ExportTables, RunSummary};
pub use resolve::{
    activity_payload, client_payload, contact_payload, inherit_client_links, note_payload,
    opportunity_payload, IdMap, LinkVia,
};
pub use sync::{CrmStore, SupabaseStore, ID_MAP_PAGE_SIZE, UPSERT_BATCH_SIZE};
pub use table::{find_export, SourceTable};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
