// 🗂️ Canonical entity model - one record shape for all five CRM entities
// Soft references hold EXTERNAL ids (source natural keys); internal ids only
// exist after a sync round-trip and are attached at payload time.

use serde_json::{Map, Value};
use std::collections::HashMap;

/// The five entity types, in strict sync dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Client,
    Contact,
    Opportunity,
    Activity,
    Note,
}

impl EntityKind {
    /// Destination table name.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Client => "crm_clients",
            EntityKind::Contact => "crm_contacts",
            EntityKind::Opportunity => "crm_opportunities",
            EntityKind::Activity => "crm_activities",
            EntityKind::Note => "crm_notes",
        }
    }

    /// Console label (Spanish, matching the rest of the operator output).
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Client => "clientes",
            EntityKind::Contact => "contactos",
            EntityKind::Opportunity => "oportunidades",
            EntityKind::Activity => "actividades",
            EntityKind::Note => "notas",
        }
    }
}

/// A canonical record extracted from one export row.
///
/// `fields` already holds destination-shaped JSON values (empty string vs
/// null decided per field at extraction time); the soft reference slots hold
/// external ids, empty string meaning "no link".
#[derive(Debug, Clone, Default)]
pub struct Record {
    pub external_id: String,
    pub client_external_id: String,
    pub contact_external_id: String,
    pub deal_external_id: String,
    /// Referenced by the notes payload but never populated: the export has
    /// no note→activity column, so this stays empty and the foreign key
    /// resolves to null. Kept as a slot in case a future export grows one.
    pub activity_external_id: String,
    pub fields: Map<String, Value>,
    pub meta: Map<String, Value>,
    /// ISO-8601 or None
    pub created_at: Option<String>,
    /// Defaults to created_at when the export has no update time
    pub updated_at: Option<String>,
}

impl Record {
    pub fn new(external_id: String) -> Self {
        Record {
            external_id,
            ..Record::default()
        }
    }

    /// Convenience for tests and payload assembly.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// external_id → client_external_id, for relationship inheritance.
/// Built from the in-memory extraction output, independent of the
/// destination's state.
pub fn client_link_index(records: &[Record]) -> HashMap<String, String> {
    records
        .iter()
        .filter(|record| !record.client_external_id.is_empty())
        .map(|record| (record.external_id.clone(), record.client_external_id.clone()))
        .collect()
}
