// 📥 Entity extraction - one parameterized pass driven by per-entity field maps
// Candidate column lists double as fallback chains: the first candidate with a
// non-empty value wins, so header synonyms and value-level fallbacks are both
// declarative. The few shapes a flat table cannot express (name concatenation,
// date+time splicing, flag OR) live in small per-entity hooks.

use crate::entities::Record;
use crate::table::{Row, SourceTable};
use serde_json::{json, Map, Value};

// ============================================================================
// FIELD SPECS
// ============================================================================

/// How a destination field is derived from its source columns.
#[derive(Debug, Clone, Copy)]
pub enum Norm {
    /// Cleaned text, kept as a (possibly empty) string
    Text,
    /// Cleaned text, empty → JSON null
    TextOrNull,
    /// Decimal or null
    Number,
    /// ISO timestamp or null
    IsoOrNull,
    /// 10-char date portion of the timestamp, or null
    DateOrNull,
    /// Integer minutes or null
    DurationMinutes,
    /// Deduplicated tag list or null
    Tags,
}

/// Destination field ← candidate source columns (priority order) + normalizer.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub dest: &'static str,
    pub columns: &'static [&'static str],
    pub norm: Norm,
}

const fn field(dest: &'static str, columns: &'static [&'static str], norm: Norm) -> FieldSpec {
    FieldSpec { dest, columns, norm }
}

fn apply(spec: &FieldSpec, row: &Row<'_>) -> Value {
    match spec.norm {
        Norm::Text => Value::String(row.text(spec.columns)),
        Norm::TextOrNull => text_or_null(row.text(spec.columns)),
        Norm::Number => row.number(spec.columns).map_or(Value::Null, |n| json!(n)),
        Norm::IsoOrNull => text_or_null(row.iso(spec.columns)),
        Norm::DateOrNull => {
            let iso = row.iso(spec.columns);
            if iso.len() >= 10 {
                Value::String(iso[..10].to_string())
            } else {
                Value::Null
            }
        }
        Norm::DurationMinutes => row
            .duration_minutes(spec.columns)
            .map_or(Value::Null, |m| json!(m)),
        Norm::Tags => row.tags(spec.columns).map_or(Value::Null, |t| json!(t)),
    }
}

fn text_or_null(text: String) -> Value {
    if text.is_empty() {
        Value::Null
    } else {
        Value::String(text)
    }
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

// ============================================================================
// ENTITY SPECS
// ============================================================================

/// Everything the shared extraction routine needs for one entity type.
struct EntitySpec {
    id_columns: &'static [&'static str],
    client_ref: &'static [&'static str],
    contact_ref: &'static [&'static str],
    deal_ref: &'static [&'static str],
    created: &'static [&'static str],
    updated: &'static [&'static str],
    fields: &'static [FieldSpec],
    meta: &'static [FieldSpec],
}

const ORG_REF: &[&str] = &["ID de la organizacion"];
const PERSON_REF: &[&str] = &["ID de la persona de contacto"];
const DEAL_REF: &[&str] = &["ID del trato"];
const UPDATED: &[&str] = &["Hora de actualizacion"];

const CLIENT_SPEC: EntitySpec = EntitySpec {
    id_columns: &["ID"],
    client_ref: &[],
    contact_ref: &[],
    deal_ref: &[],
    created: &["Organizacion creada"],
    updated: UPDATED,
    fields: &[
        field("name", &["Nombre"], Norm::Text),
        field("industry", &["Sub-sector"], Norm::Text),
        field(
            "city",
            &["Ciudad/pueblo/poblacion/localidad de Direccion"],
            Norm::Text,
        ),
        field("owner", &["Propietario"], Norm::Text),
        field("client_type", &["Tipo de cliente"], Norm::Text),
        field("relation", &["Relacion"], Norm::Text),
        field("potential", &["Potencial"], Norm::Text),
        field("tags", &["Etiquetas"], Norm::Tags),
        field(
            "address",
            &["Direccion completa/combinada de Direccion", "Direccion"],
            Norm::Text,
        ),
        field("state", &["Estado/municipio de Direccion"], Norm::Text),
        field("country", &["Pais de Direccion"], Norm::Text),
        field("postal_code", &["Codigo postal de Direccion"], Norm::Text),
    ],
    meta: &[
        field("boilers", &["Calderas Instaladas"], Norm::Text),
        field("burners", &["Quemadores instalados"], Norm::Text),
        field("lat", &["Latitud de Direccion"], Norm::Text),
        field("lng", &["Longitud de Direccion"], Norm::Text),
    ],
};

const CONTACT_SPEC: EntitySpec = EntitySpec {
    id_columns: &["ID"],
    client_ref: ORG_REF,
    contact_ref: &[],
    deal_ref: &[],
    created: &["Persona creada"],
    updated: UPDATED,
    fields: &[
        field("role", &["Cargo"], Norm::Text),
        field(
            "phone",
            &[
                "Telefono - Movil",
                "Telefono - Trabajo",
                "Telefono - Personal",
                "Telefono - Otro",
            ],
            Norm::Text,
        ),
        field(
            "email",
            &[
                "Correo electronico - Trabajo",
                "Correo electronico - Personal",
                "Correo electronico - Otro",
            ],
            Norm::Text,
        ),
        field("area", &["Area"], Norm::Text),
        field("tags", &["Etiquetas"], Norm::Tags),
    ],
    // meta is nested (phones/emails per channel) and built in the hook
    meta: &[],
};

const OPPORTUNITY_SPEC: EntitySpec = EntitySpec {
    id_columns: &["ID"],
    client_ref: ORG_REF,
    contact_ref: PERSON_REF,
    deal_ref: &[],
    created: &["Trato creado"],
    updated: UPDATED,
    fields: &[
        field("name", &["Titulo"], Norm::Text),
        field("stage", &["Etapa"], Norm::TextOrNull),
        field("status", &["Estado"], Norm::TextOrNull),
        field("value", &["Valor"], Norm::Number),
        field("currency", &["Moneda de Valor"], Norm::TextOrNull),
        field("weighted_value", &["Valor ponderado"], Norm::Number),
        field("probability", &["Probabilidad"], Norm::Number),
        field("pipeline", &["Embudo"], Norm::TextOrNull),
        field("owner", &["Propietario"], Norm::TextOrNull),
        field("source", &["Origen de la fuente"], Norm::TextOrNull),
        field("source_channel", &["Canal de la fuente"], Norm::TextOrNull),
        field("lost_reason", &["Motivo de la perdida"], Norm::TextOrNull),
        field(
            "expected_close_date",
            &["Fecha prevista de cierre"],
            Norm::DateOrNull,
        ),
        field("close_date", &["Trato cerrado el"], Norm::DateOrNull),
        field(
            "last_stage_change_at",
            &["Ultimo cambio de la etapa"],
            Norm::IsoOrNull,
        ),
    ],
    meta: &[
        field("product_name", &["Nombre del producto"], Norm::Text),
        field("product_amount", &["Monto del producto"], Norm::Number),
        field("product_qty", &["Cantidad de producto"], Norm::Number),
    ],
};

const ACTIVITY_SPEC: EntitySpec = EntitySpec {
    id_columns: &["ID"],
    client_ref: ORG_REF,
    contact_ref: PERSON_REF,
    deal_ref: DEAL_REF,
    // Header spelling drifted between export versions
    created: &["Hora de adicion", "Hora de anadicion"],
    updated: UPDATED,
    fields: &[
        field("type", &["Tipo"], Norm::TextOrNull),
        field("notes", &["Nota"], Norm::TextOrNull),
        field(
            "completed_at",
            &["Hora en que se marco como completada"],
            Norm::IsoOrNull,
        ),
        field("duration_minutes", &["Duracion"], Norm::DurationMinutes),
        field(
            "location",
            &["Direccion completa/combinada de Ubicacion", "Ubicacion"],
            Norm::TextOrNull,
        ),
        field("priority", &["Prioridad"], Norm::TextOrNull),
        field("owner", &["Asignada al usuario"], Norm::TextOrNull),
    ],
    meta: &[
        field("public_description", &["Descripcion publica"], Norm::Text),
        field("free_busy", &["Libre/ocupado"], Norm::Text),
        field("prospect", &["Prospecto"], Norm::Text),
        field("project", &["Proyecto"], Norm::Text),
    ],
};

const NOTE_SPEC: EntitySpec = EntitySpec {
    id_columns: &["ID"],
    client_ref: ORG_REF,
    contact_ref: PERSON_REF,
    deal_ref: DEAL_REF,
    created: &["Hora de adicion"],
    updated: UPDATED,
    fields: &[
        field("title", &["Titulo"], Norm::TextOrNull),
        field("content", &["Contenido"], Norm::TextOrNull),
        field("owner", &["Usuario"], Norm::TextOrNull),
    ],
    meta: &[],
};

// ============================================================================
// SHARED EXTRACTION ROUTINE
// ============================================================================

/// Run one extraction pass. Rows without an external id are dropped before
/// the hook runs; the hook finishes entity-specific fields and returns false
/// to drop the row (failed required-field check).
fn extract_with(
    spec: &EntitySpec,
    table: &SourceTable,
    finish: impl Fn(&Row<'_>, &mut Record) -> bool,
) -> Vec<Record> {
    let mut records = Vec::new();
    for row in table.rows() {
        let external_id = row.id(spec.id_columns);
        if external_id.is_empty() {
            continue;
        }
        let mut record = Record::new(external_id);
        record.client_external_id = row.id(spec.client_ref);
        record.contact_external_id = row.id(spec.contact_ref);
        record.deal_external_id = row.id(spec.deal_ref);
        for field_spec in spec.fields {
            record
                .fields
                .insert(field_spec.dest.to_string(), apply(field_spec, &row));
        }
        for field_spec in spec.meta {
            record
                .meta
                .insert(field_spec.dest.to_string(), apply(field_spec, &row));
        }
        record.created_at = non_empty(row.iso(spec.created));
        // Never leave updated unset when a creation time is known
        record.updated_at = non_empty(row.iso(spec.updated)).or_else(|| record.created_at.clone());
        if !finish(&row, &mut record) {
            continue;
        }
        records.push(record);
    }
    records
}

fn field_is_empty(record: &Record, name: &str) -> bool {
    !matches!(record.field(name), Some(Value::String(s)) if !s.is_empty())
}

// ============================================================================
// PER-ENTITY PASSES
// ============================================================================

/// Organizations → clients. Requires a non-empty name.
pub fn extract_clients(table: &SourceTable) -> Vec<Record> {
    extract_with(&CLIENT_SPEC, table, |_row, record| {
        !field_is_empty(record, "name")
    })
}

/// People → contacts. Name falls back to first + last name concatenation;
/// still-empty names drop the row.
pub fn extract_contacts(table: &SourceTable) -> Vec<Record> {
    extract_with(&CONTACT_SPEC, table, |row, record| {
        let mut name = row.text(&["Nombre"]);
        if name.is_empty() {
            let first = row.text(&["Nombre.1"]);
            let last = row.text(&["Apellidos"]);
            name = [first, last]
                .iter()
                .filter(|part| !part.is_empty())
                .cloned()
                .collect::<Vec<_>>()
                .join(" ");
        }
        if name.is_empty() {
            return false;
        }
        record.fields.insert("name".to_string(), json!(name));
        record.meta = contact_meta(row);
        true
    })
}

/// All channel variants are preserved under meta even when the first-class
/// phone/email already picked a winner.
fn contact_meta(row: &Row<'_>) -> Map<String, Value> {
    let meta = json!({
        "phones": {
            "work": row.text(&["Telefono - Trabajo"]),
            "personal": row.text(&["Telefono - Personal"]),
            "mobile": row.text(&["Telefono - Movil"]),
            "other": row.text(&["Telefono - Otro"]),
        },
        "emails": {
            "work": row.text(&["Correo electronico - Trabajo"]),
            "personal": row.text(&["Correo electronico - Personal"]),
            "other": row.text(&["Correo electronico - Otro"]),
        },
    });
    match meta {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Deals → opportunities. Requires a non-empty title (stored as `name`).
pub fn extract_opportunities(table: &SourceTable) -> Vec<Record> {
    extract_with(&OPPORTUNITY_SPEC, table, |_row, record| {
        !field_is_empty(record, "name")
    })
}

/// Activities. Title falls back to the activity type, then a generic label;
/// outcome derives from the completion flag.
pub fn extract_activities(table: &SourceTable) -> Vec<Record> {
    extract_with(&ACTIVITY_SPEC, table, |row, record| {
        let mut title = row.text(&["Asunto"]);
        if title.is_empty() {
            title = row.text(&["Tipo"]);
        }
        if title.is_empty() {
            title = "Actividad".to_string();
        }
        record.fields.insert("title".to_string(), json!(title));

        let outcome = if row.boolean(&["Finalizada"]) {
            "completada"
        } else {
            "pendiente"
        };
        record.fields.insert("outcome".to_string(), json!(outcome));

        let due_at = row.date_time(&["Fecha de vencimiento"], &["Hora de vencimiento"]);
        record
            .fields
            .insert("due_at".to_string(), text_or_null(due_at));
        true
    })
}

/// Notes. Pinned if pinned to any of deal / organization / person.
pub fn extract_notes(table: &SourceTable) -> Vec<Record> {
    extract_with(&NOTE_SPEC, table, |row, record| {
        let is_pinned = row.boolean(&[
            "La nota esta anclada al trato",
            "La nota esta anclada a la organizacion",
            "La nota esta anclada a la persona",
        ]);
        record
            .fields
            .insert("is_pinned".to_string(), json!(is_pinned));
        true
    })
}

// ============================================================================
// TESTS
// ============================================================================
