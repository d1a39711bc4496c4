// 🧹 Field Normalizers - raw export cells → canonical scalar values
// Every transform here is pure; "missing cell" is Option::None throughout.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// ISO-8601 with time component, the only timestamp shape the destination accepts
const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

// ============================================================================
// TEXT
// ============================================================================

/// Clean a raw text cell: unescape HTML entities, replace non-breaking
/// spaces, trim. Missing cell becomes the empty string.
///
/// Must run before any other text-dependent transform.
pub fn normalize_text(value: Option<&str>) -> String {
    let Some(raw) = value else {
        return String::new();
    };
    let text = unescape_entities(raw);
    text.replace('\u{a0}', " ").trim().to_string()
}

/// Decode the HTML entities that actually show up in CRM exports
/// (named basics plus numeric `&#NNN;` / `&#xHH;` forms).
/// Unknown or malformed entities are left verbatim.
fn unescape_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        // Entity names are short; a far-away ';' means this '&' is literal
        let end = rest.find(';').filter(|&end| end > 1 && end <= 10);
        match end.and_then(|end| decode_entity(&rest[1..end]).map(|ch| (end, ch))) {
            Some((end, ch)) => {
                out.push(ch);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let code = name.strip_prefix('#')?;
            let value = if let Some(hex) = code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                code.parse::<u32>().ok()?
            };
            char::from_u32(value)
        }
    }
}

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Canonical form of an external identifier.
///
/// Spreadsheet tooling renders integer ids as floats ("4711.0"); those are
/// coerced back to the integer string so ids compare equal across exports.
/// Idempotent: normalizing an already-normal id is a no-op.
pub fn normalize_id(value: Option<&str>) -> String {
    let Some(raw) = value else {
        return String::new();
    };
    let text = raw.trim();
    if let Some(stem) = text.strip_suffix(".0") {
        if !stem.is_empty() && stem.bytes().all(|b| b.is_ascii_digit()) {
            return stem.to_string();
        }
    }
    text.to_string()
}

/// Canonical form of a column header, used only for header matching:
/// uppercase, diacritics stripped (NFD, combining marks dropped), anything
/// outside `[A-Z0-9 ]` collapsed to single spaces.
///
/// Two headers name the same field iff their normalized forms are equal.
pub fn normalize_name(value: Option<&str>) -> String {
    let text = normalize_text(value).to_uppercase();
    let stripped: String = text.nfd().filter(|c| !is_combining_mark(*c)).collect();
    let cleaned: String = stripped
        .chars()
        .map(|c| {
            if c.is_ascii_uppercase() || c.is_ascii_digit() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============================================================================
// DATES
// ============================================================================

/// Locale-tolerant datetime parsing. The exports mix ISO timestamps,
/// ISO dates and day-first Spanish forms depending on tool version.
pub(crate) fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    const DATETIME_FORMATS: [&str; 8] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%d/%m/%Y %H:%M:%S",
        "%d/%m/%Y %H:%M",
        "%d-%m-%Y %H:%M:%S",
        "%d-%m-%Y %H:%M",
    ];
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed);
        }
    }
    const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"];
    for format in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(text, format) {
            return Some(NaiveDateTime::new(parsed, NaiveTime::MIN));
        }
    }
    None
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    const TIME_FORMATS: [&str; 2] = ["%H:%M:%S", "%H:%M"];
    for format in TIME_FORMATS {
        if let Ok(parsed) = NaiveTime::parse_from_str(text, format) {
            return Some(parsed);
        }
    }
    // Some exports put a full timestamp in the time column
    parse_datetime(text).map(|dt| dt.time())
}

/// Full ISO-8601 timestamp (with time component), or the empty string when
/// the cell is missing or unparseable. Date-only cells get `T00:00:00`.
pub fn to_iso(value: Option<&str>) -> String {
    let text = normalize_text(value);
    match parse_datetime(&text) {
        Some(parsed) => parsed.format(ISO_FORMAT).to_string(),
        None => String::new(),
    }
}

/// Splice a time-of-day cell onto a date cell. Unparseable date yields the
/// fallback; an unparseable time is ignored and the date stands alone.
pub fn combine_date_time(date: Option<&str>, time: Option<&str>, fallback: &str) -> String {
    let date_text = normalize_text(date);
    let Some(mut combined) = parse_datetime(&date_text) else {
        return fallback.to_string();
    };
    let time_text = normalize_text(time);
    if let Some(parsed) = parse_time(&time_text) {
        combined = NaiveDateTime::new(combined.date(), parsed);
    }
    combined.format(ISO_FORMAT).to_string()
}

// ============================================================================
// NUMBERS, DURATIONS, FLAGS, TAGS
// ============================================================================

/// Decimal value of a cell; spaces and thousand-separator commas are
/// stripped first. Unparseable → None.
pub fn parse_number(value: Option<&str>) -> Option<f64> {
    let text = normalize_text(value);
    if text.is_empty() {
        return None;
    }
    let compact = text.replace([' ', ','], "");
    compact.parse::<f64>().ok()
}

/// Duration in minutes: either "H:MM" (hours/minutes) or a bare number of
/// minutes. Anything else → None.
pub fn parse_duration_minutes(value: Option<&str>) -> Option<i64> {
    let text = normalize_text(value);
    if text.is_empty() {
        return None;
    }
    if let Some((hours_part, minutes_part)) = text.split_once(':') {
        let hours = hours_part.trim().parse::<i64>().ok()?;
        let minutes = if minutes_part.trim().is_empty() {
            0
        } else {
            // "1:30:00" shows up occasionally; seconds are dropped
            let minutes_only = minutes_part.split(':').next().unwrap_or("0");
            minutes_only.trim().parse::<i64>().ok()?
        };
        return Some(hours * 60 + minutes);
    }
    if let Ok(minutes) = text.parse::<i64>() {
        return Some(minutes);
    }
    // Numeric cells exported as floats ("45.0")
    text.parse::<f64>().ok().map(|minutes| minutes as i64)
}

/// Affirmative flags as written in the exports (Spanish locale).
pub fn parse_bool(value: Option<&str>) -> bool {
    let text = normalize_text(value).to_lowercase();
    matches!(text.as_str(), "si" | "sí" | "yes" | "true" | "1" | "x")
}

/// Split a tag cell on `;`, `,` or `/`, trimming parts, dropping empties and
/// deduplicating while preserving first-seen order. Empty result is None,
/// never an empty list.
pub fn split_tags(value: Option<&str>) -> Option<Vec<String>> {
    let text = normalize_text(value);
    if text.is_empty() {
        return None;
    }
    let mut tags: Vec<String> = Vec::new();
    for part in text.split([';', ',', '/']) {
        let part = part.trim();
        if part.is_empty() || tags.iter().any(|seen| seen == part) {
            continue;
        }
        tags.push(part.to_string());
    }
    if tags.is_empty() {
        None
    } else {
        Some(tags)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text_basic() {
        assert_eq!(normalize_text(Some("  hola  ")), "hola");
        assert_eq!(normalize_text(None), "");
        assert_eq!(normalize_text(Some("")), "");
    }

    #[test]
    fn test_normalize_text_entities() {
        assert_eq!(normalize_text(Some("Juan &amp; Cia")), "Juan & Cia");
        assert_eq!(normalize_text(Some("a &lt;b&gt; c")), "a <b> c");
        assert_eq!(normalize_text(Some("&quot;citado&quot;")), "\"citado\"");
        assert_eq!(normalize_text(Some("O&#39;Brien")), "O'Brien");
        assert_eq!(normalize_text(Some("&#x41;cme")), "Acme");
        // Unknown entity stays verbatim
        assert_eq!(normalize_text(Some("R&D; lab")), "R&D; lab");
    }

    #[test]
    fn test_normalize_text_nbsp() {
        assert_eq!(normalize_text(Some("a\u{a0}b")), "a b");
        assert_eq!(normalize_text(Some("x&nbsp;y")), "x y");
        // NBSP at the edges trims away entirely
        assert_eq!(normalize_text(Some("\u{a0}z\u{a0}")), "z");
    }

    #[test]
    fn test_normalize_id_float_coercion() {
        assert_eq!(normalize_id(Some("123.0")), "123");
        assert_eq!(normalize_id(Some("42")), "42");
        assert_eq!(normalize_id(Some(" 7.0 ")), "7");
        // Not an integer-valued float: left alone
        assert_eq!(normalize_id(Some("12.5")), "12.5");
        assert_eq!(normalize_id(Some("abc.0")), "abc.0");
        assert_eq!(normalize_id(Some(".0")), ".0");
        assert_eq!(normalize_id(None), "");
    }

    #[test]
    fn test_normalize_id_idempotent() {
        for raw in ["123.0", "123", "12.5", "abc", "  9.0 ", ""] {
            let once = normalize_id(Some(raw));
            let twice = normalize_id(Some(&once));
            assert_eq!(once, twice, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_normalize_name_diacritics() {
        assert_eq!(normalize_name(Some("Á é î")), "A E I");
        assert_eq!(normalize_name(Some("Organización creada")), "ORGANIZACION CREADA");
        assert_eq!(normalize_name(Some("Teléfono - Móvil")), "TELEFONO MOVIL");
    }

    #[test]
    fn test_normalize_name_collapses_noise() {
        assert_eq!(normalize_name(Some("  Hora   de adición ")), "HORA DE ADICION");
        assert_eq!(
            normalize_name(Some("Dirección completa/combinada de Dirección")),
            "DIRECCION COMPLETA COMBINADA DE DIRECCION"
        );
        assert_eq!(normalize_name(None), "");
    }

    #[test]
    fn test_to_iso_formats() {
        assert_eq!(to_iso(Some("2024-03-15 10:30:00")), "2024-03-15T10:30:00");
        assert_eq!(to_iso(Some("2024-03-15")), "2024-03-15T00:00:00");
        assert_eq!(to_iso(Some("15/03/2024")), "2024-03-15T00:00:00");
        assert_eq!(to_iso(Some("15/03/2024 09:05")), "2024-03-15T09:05:00");
        assert_eq!(to_iso(Some("2024-03-15T10:30:00.123")), "2024-03-15T10:30:00");
        assert_eq!(to_iso(Some("garbage")), "");
        assert_eq!(to_iso(None), "");
    }

    #[test]
    fn test_combine_date_time() {
        assert_eq!(
            combine_date_time(Some("2024-03-15"), Some("14:30"), ""),
            "2024-03-15T14:30:00"
        );
        assert_eq!(
            combine_date_time(Some("2024-03-15"), Some("14:30:45"), ""),
            "2024-03-15T14:30:45"
        );
        // Unparseable time: date stands alone
        assert_eq!(
            combine_date_time(Some("2024-03-15"), Some("???"), ""),
            "2024-03-15T00:00:00"
        );
        // Unparseable date: fallback wins
        assert_eq!(combine_date_time(Some("nope"), Some("14:30"), ""), "");
        assert_eq!(
            combine_date_time(None, None, "2020-01-01T00:00:00"),
            "2020-01-01T00:00:00"
        );
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(Some("1,250.50")), Some(1250.50));
        assert_eq!(parse_number(Some(" 42 ")), Some(42.0));
        assert_eq!(parse_number(Some("1 000")), Some(1000.0));
        assert_eq!(parse_number(Some("n/a")), None);
        assert_eq!(parse_number(Some("")), None);
        assert_eq!(parse_number(None), None);
    }

    #[test]
    fn test_parse_duration_minutes() {
        assert_eq!(parse_duration_minutes(Some("1:30")), Some(90));
        assert_eq!(parse_duration_minutes(Some("45")), Some(45));
        assert_eq!(parse_duration_minutes(Some("0:15")), Some(15));
        assert_eq!(parse_duration_minutes(Some("2:")), Some(120));
        assert_eq!(parse_duration_minutes(Some("1:30:00")), Some(90));
        assert_eq!(parse_duration_minutes(Some("45.0")), Some(45));
        assert_eq!(parse_duration_minutes(Some("bad")), None);
        assert_eq!(parse_duration_minutes(None), None);
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool(Some("SI")));
        assert!(parse_bool(Some("sí")));
        assert!(parse_bool(Some("yes")));
        assert!(parse_bool(Some("1")));
        assert!(parse_bool(Some("x")));
        assert!(!parse_bool(Some("no")));
        assert!(!parse_bool(Some("0")));
        assert!(!parse_bool(Some("")));
        assert!(!parse_bool(None));
    }

    #[test]
    fn test_split_tags() {
        assert_eq!(
            split_tags(Some("a; b,c/ a")),
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
        assert_eq!(
            split_tags(Some("industrial;;caldera")),
            Some(vec!["industrial".to_string(), "caldera".to_string()])
        );
        assert_eq!(split_tags(Some(" ; , / ")), None);
        assert_eq!(split_tags(Some("")), None);
        assert_eq!(split_tags(None), None);
    }
}
