// 🔗 Reference resolution - soft external references → internal foreign keys
// Two layers:
//   1. Client-link inheritance between extracted records (in-memory indexes,
//      independent of the destination's state).
//   2. Payload assembly, translating external ids to internal ids through the
//      identifier map fetched after each sync stage. Unresolved references
//      become null foreign keys; links to rows outside the export are normal.

use crate::entities::Record;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// external_id → destination-assigned internal id, for one entity type.
/// Internal ids are kept as opaque JSON values (uuid or integer, the
/// destination's choice) and written back verbatim.
pub type IdMap = HashMap<String, Value>;

// ============================================================================
// CLIENT-LINK INHERITANCE
// ============================================================================

/// Fill empty client links from fallback indexes, in fixed order. Only
/// consulted lazily: a record with its own client link is left untouched.
///
/// Deals pass one index (via contact); activities and notes pass two
/// (via deal first, then via contact).
pub fn inherit_client_links(records: &mut [Record], fallbacks: &[(LinkVia, &HashMap<String, String>)]) {
    for record in records.iter_mut() {
        if !record.client_external_id.is_empty() {
            continue;
        }
        for (via, index) in fallbacks {
            let key = match via {
                LinkVia::Contact => &record.contact_external_id,
                LinkVia::Deal => &record.deal_external_id,
            };
            if key.is_empty() {
                continue;
            }
            if let Some(client) = index.get(key) {
                record.client_external_id = client.clone();
                break;
            }
        }
    }
}

/// Which soft reference a fallback index is keyed on.
#[derive(Debug, Clone, Copy)]
pub enum LinkVia {
    Contact,
    Deal,
}

// ============================================================================
// PAYLOAD ASSEMBLY
// ============================================================================

fn resolve_ref(map: &IdMap, external_id: &str) -> Value {
    if external_id.is_empty() {
        return Value::Null;
    }
    map.get(external_id).cloned().unwrap_or(Value::Null)
}

fn base_payload(record: &Record) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("external_id".to_string(), Value::String(record.external_id.clone()));
    for (name, value) in &record.fields {
        payload.insert(name.clone(), value.clone());
    }
    payload.insert("meta".to_string(), Value::Object(record.meta.clone()));
    payload.insert(
        "created_at".to_string(),
        record.created_at.clone().map_or(Value::Null, Value::String),
    );
    payload.insert(
        "updated_at".to_string(),
        record.updated_at.clone().map_or(Value::Null, Value::String),
    );
    payload
}

pub fn client_payload(record: &Record) -> Value {
    Value::Object(base_payload(record))
}

pub fn contact_payload(record: &Record, clients: &IdMap) -> Value {
    let mut payload = base_payload(record);
    payload.insert(
        "client_id".to_string(),
        resolve_ref(clients, &record.client_external_id),
    );
    Value::Object(payload)
}

pub fn opportunity_payload(record: &Record, clients: &IdMap, contacts: &IdMap) -> Value {
    let mut payload = base_payload(record);
    payload.insert(
        "client_id".to_string(),
        resolve_ref(clients, &record.client_external_id),
    );
    payload.insert(
        "contact_id".to_string(),
        resolve_ref(contacts, &record.contact_external_id),
    );
    Value::Object(payload)
}

pub fn activity_payload(
    record: &Record,
    clients: &IdMap,
    contacts: &IdMap,
    opportunities: &IdMap,
) -> Value {
    let mut payload = base_payload(record);
    payload.insert(
        "client_id".to_string(),
        resolve_ref(clients, &record.client_external_id),
    );
    payload.insert(
        "contact_id".to_string(),
        resolve_ref(contacts, &record.contact_external_id),
    );
    payload.insert(
        "opportunity_id".to_string(),
        resolve_ref(opportunities, &record.deal_external_id),
    );
    Value::Object(payload)
}

pub fn note_payload(
    record: &Record,
    clients: &IdMap,
    contacts: &IdMap,
    opportunities: &IdMap,
    activities: &IdMap,
) -> Value {
    let mut payload = base_payload(record);
    payload.insert(
        "client_id".to_string(),
        resolve_ref(clients, &record.client_external_id),
    );
    payload.insert(
        "contact_id".to_string(),
        resolve_ref(contacts, &record.contact_external_id),
    );
    payload.insert(
        "opportunity_id".to_string(),
        resolve_ref(opportunities, &record.deal_external_id),
    );
    // activity_external_id is never populated by extraction (the export has
    // no such column), so this resolves to null today.
    payload.insert(
        "activity_id".to_string(),
        resolve_ref(activities, &record.activity_external_id),
    );
    Value::Object(payload)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::client_link_index;
    use serde_json::json;

    fn record(external: &str, client: &str, contact: &str, deal: &str) -> Record {
        let mut record = Record::new(external.to_string());
        record.client_external_id = client.to_string();
        record.contact_external_id = contact.to_string();
        record.deal_external_id = deal.to_string();
        record
    }

    #[test]
    fn test_deal_inherits_client_from_contact() {
        let mut contact = Record::new("10".to_string());
        contact.client_external_id = "1".to_string();
        let contact_clients = client_link_index(&[contact]);

        let mut deals = vec![record("100", "", "10", "")];
        inherit_client_links(&mut deals, &[(LinkVia::Contact, &contact_clients)]);
        assert_eq!(deals[0].client_external_id, "1");
    }

    #[test]
    fn test_own_client_link_wins() {
        let mut contact = Record::new("10".to_string());
        contact.client_external_id = "1".to_string();
        let contact_clients = client_link_index(&[contact]);

        let mut deals = vec![record("100", "2", "10", "")];
        inherit_client_links(&mut deals, &[(LinkVia::Contact, &contact_clients)]);
        // Direct field beats the fallback
        assert_eq!(deals[0].client_external_id, "2");
    }

    #[test]
    fn test_activity_fallback_order_deal_then_contact() {
        let mut deal = Record::new("100".to_string());
        deal.client_external_id = "1".to_string();
        let deal_clients = client_link_index(&[deal]);

        let mut contact = Record::new("10".to_string());
        contact.client_external_id = "2".to_string();
        let contact_clients = client_link_index(&[contact]);

        // Linked to both: deal's client wins
        let mut activities = vec![
            record("200", "", "10", "100"),
            record("201", "", "10", ""),
            record("202", "", "", ""),
        ];
        inherit_client_links(
            &mut activities,
            &[(LinkVia::Deal, &deal_clients), (LinkVia::Contact, &contact_clients)],
        );
        assert_eq!(activities[0].client_external_id, "1");
        // No deal link: falls through to the contact's client
        assert_eq!(activities[1].client_external_id, "2");
        // Nothing to inherit from
        assert_eq!(activities[2].client_external_id, "");
    }

    #[test]
    fn test_unknown_fallback_key_leaves_link_empty() {
        let contact_clients = HashMap::new();
        let mut deals = vec![record("100", "", "999", "")];
        inherit_client_links(&mut deals, &[(LinkVia::Contact, &contact_clients)]);
        assert_eq!(deals[0].client_external_id, "");
    }

    #[test]
    fn test_payload_resolves_internal_ids() {
        let mut clients = IdMap::new();
        clients.insert("1".to_string(), json!("uuid-client-1"));
        let contacts = IdMap::new();

        let deal = record("100", "1", "10", "");
        let payload = opportunity_payload(&deal, &clients, &contacts);
        assert_eq!(payload["client_id"], json!("uuid-client-1"));
        // Contact 10 not in the destination: null FK, not an error
        assert_eq!(payload["contact_id"], Value::Null);
        assert_eq!(payload["external_id"], json!("100"));
        assert_eq!(payload["meta"], json!({}));
    }

    #[test]
    fn test_note_activity_link_always_null() {
        let mut activities = IdMap::new();
        activities.insert("200".to_string(), json!("uuid-act"));
        let note = record("300", "", "", "");
        let payload = note_payload(&note, &IdMap::new(), &IdMap::new(), &IdMap::new(), &activities);
        assert_eq!(payload["activity_id"], Value::Null);
    }

    #[test]
    fn test_payload_timestamps() {
        let mut rec = Record::new("1".to_string());
        rec.created_at = Some("2024-01-05T08:00:00".to_string());
        rec.updated_at = Some("2024-01-06T09:00:00".to_string());
        let payload = client_payload(&rec);
        assert_eq!(payload["created_at"], json!("2024-01-05T08:00:00"));
        assert_eq!(payload["updated_at"], json!("2024-01-06T09:00:00"));

        let bare = Record::new("2".to_string());
        let payload = client_payload(&bare);
        assert_eq!(payload["created_at"], Value::Null);
        assert_eq!(payload["updated_at"], Value::Null);
    }
}
