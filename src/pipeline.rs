// 🚚 Import pipeline - extract, resolve, sync, in strict stage order
// Each stage's foreign keys are resolved through the id map fetched after
// the previous stage's upsert, so stages cannot be reordered: clients →
// contacts → opportunities → activities → notes.

use crate::entities::{client_link_index, EntityKind};
use crate::extract::{
    extract_activities, extract_clients, extract_contacts, extract_notes, extract_opportunities,
};
use crate::resolve::{
    activity_payload, client_payload, contact_payload, inherit_client_links, note_payload,
    opportunity_payload, LinkVia,
};
use crate::sync::CrmStore;
use crate::table::{find_export, SourceTable};
use anyhow::Result;
use serde_json::Value;
use std::path::Path;

/// The five loaded export tables.
pub struct ExportTables {
    pub organizations: SourceTable,
    pub people: SourceTable,
    pub deals: SourceTable,
    pub activities: SourceTable,
    pub notes: SourceTable,
}

impl ExportTables {
    /// Locate and load all five exports. A missing file for any entity type
    /// is a fatal startup error.
    pub fn load(dir: &Path) -> Result<Self> {
        Ok(ExportTables {
            organizations: SourceTable::from_csv_path(&find_export(dir, "organizations-*.csv")?)?,
            people: SourceTable::from_csv_path(&find_export(dir, "people-*.csv")?)?,
            deals: SourceTable::from_csv_path(&find_export(dir, "deals-*.csv")?)?,
            activities: SourceTable::from_csv_path(&find_export(dir, "activities-*.csv")?)?,
            notes: SourceTable::from_csv_path(&find_export(dir, "notes-*.csv")?)?,
        })
    }
}

/// Per-entity record counts after extraction (rows that survived the
/// required-field checks).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub clients: usize,
    pub contacts: usize,
    pub opportunities: usize,
    pub activities: usize,
    pub notes: usize,
}

/// Run the whole migration against a store. Generic over the store so tests
/// can drive the full pipeline in memory.
pub fn run(store: &impl CrmStore, tables: &ExportTables) -> Result<RunSummary> {
    // Extraction is order-independent
    let clients = extract_clients(&tables.organizations);
    let contacts = extract_contacts(&tables.people);
    let mut opportunities = extract_opportunities(&tables.deals);
    let mut activities = extract_activities(&tables.activities);
    let mut notes = extract_notes(&tables.notes);

    // Client-link inheritance uses the in-memory indexes, in dependency
    // order: deals need the contact index, activities/notes need both.
    let contact_clients = client_link_index(&contacts);
    inherit_client_links(&mut opportunities, &[(LinkVia::Contact, &contact_clients)]);
    let deal_clients = client_link_index(&opportunities);
    let fallbacks = [
        (LinkVia::Deal, &deal_clients),
        (LinkVia::Contact, &contact_clients),
    ];
    inherit_client_links(&mut activities, &fallbacks);
    inherit_client_links(&mut notes, &fallbacks);

    let summary = RunSummary {
        clients: clients.len(),
        contacts: contacts.len(),
        opportunities: opportunities.len(),
        activities: activities.len(),
        notes: notes.len(),
    };
    println!(
        "Clientes: {} | Contactos: {} | Negocios: {} | Actividades: {} | Notas: {}",
        summary.clients, summary.contacts, summary.opportunities, summary.activities, summary.notes
    );

    println!("⬆️  Upsert clientes...");
    let rows: Vec<Value> = clients.iter().map(client_payload).collect();
    store.upsert(EntityKind::Client, &rows, "external_id")?;
    let client_ids = store.fetch_id_map(EntityKind::Client)?;

    println!("⬆️  Upsert contactos...");
    let rows: Vec<Value> = contacts
        .iter()
        .map(|record| contact_payload(record, &client_ids))
        .collect();
    store.upsert(EntityKind::Contact, &rows, "external_id")?;
    let contact_ids = store.fetch_id_map(EntityKind::Contact)?;

    println!("⬆️  Upsert oportunidades...");
    let rows: Vec<Value> = opportunities
        .iter()
        .map(|record| opportunity_payload(record, &client_ids, &contact_ids))
        .collect();
    store.upsert(EntityKind::Opportunity, &rows, "external_id")?;
    let opportunity_ids = store.fetch_id_map(EntityKind::Opportunity)?;

    println!("⬆️  Upsert actividades...");
    let rows: Vec<Value> = activities
        .iter()
        .map(|record| activity_payload(record, &client_ids, &contact_ids, &opportunity_ids))
        .collect();
    store.upsert(EntityKind::Activity, &rows, "external_id")?;
    let activity_ids = store.fetch_id_map(EntityKind::Activity)?;

    println!("⬆️  Upsert notas...");
    let rows: Vec<Value> = notes
        .iter()
        .map(|record| {
            note_payload(
                record,
                &client_ids,
                &contact_ids,
                &opportunity_ids,
                &activity_ids,
            )
        })
        .collect();
    store.upsert(EntityKind::Note, &rows, "external_id")?;

    println!("✅ Import finalizado.");
    Ok(summary)
}

// ============================================================================
// TESTS
// ============================================================================
