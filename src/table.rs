// 📋 Source tables - CSV loading + tolerant column resolution
// Export column naming drifts across tool versions and locales, so every
// lookup goes through normalized header names with candidate fallbacks.

use crate::normalize::{
    combine_date_time, normalize_id, normalize_name, normalize_text, parse_bool,
    parse_duration_minutes, parse_number, split_tags, to_iso,
};
use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One loaded export table: headers plus raw string cells.
#[derive(Debug, Clone)]
pub struct SourceTable {
    headers: Vec<String>,
    /// normalized header name → column index
    column_map: HashMap<String, usize>,
    rows: Vec<Vec<String>>,
}

impl SourceTable {
    /// Load a CSV export. Rows shorter than the header are tolerated
    /// (missing cells read as absent).
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("Failed to open export file {}", path.display()))?;
        let headers: Vec<String> = reader
            .headers()
            .with_context(|| format!("Failed to read headers from {}", path.display()))?
            .iter()
            .map(|h| h.to_string())
            .collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record =
                record.with_context(|| format!("Failed to read row from {}", path.display()))?;
            rows.push(record.iter().map(|cell| cell.to_string()).collect());
        }
        Ok(Self::from_rows(headers, rows))
    }

    /// Build a table directly from headers and rows (tests, mostly).
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let column_map = headers
            .iter()
            .enumerate()
            .map(|(index, header)| (normalize_name(Some(header)), index))
            .collect();
        SourceTable {
            headers,
            column_map,
            rows,
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Resolve the first candidate whose normalized name matches a header.
    /// None means the field is unavailable in this export.
    pub fn column(&self, candidates: &[&str]) -> Option<usize> {
        candidates
            .iter()
            .find_map(|candidate| self.column_map.get(&normalize_name(Some(candidate))).copied())
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(move |cells| Row { table: self, cells })
    }
}

/// One row with typed cell accessors. Every accessor takes a candidate
/// column list and returns the first non-empty value in priority order,
/// which covers both header synonyms and value-level fallback chains.
#[derive(Clone, Copy)]
pub struct Row<'t> {
    table: &'t SourceTable,
    cells: &'t [String],
}

impl<'t> Row<'t> {
    /// Raw cell under the first matching candidate column, untouched.
    pub fn raw(&self, candidates: &[&str]) -> Option<&'t str> {
        self.table
            .column(candidates)
            .and_then(|index| self.cells.get(index))
            .map(|cell| cell.as_str())
    }

    fn first_non_empty<T>(
        &self,
        candidates: &[&str],
        normalizer: impl Fn(Option<&str>) -> T,
        is_empty: impl Fn(&T) -> bool,
    ) -> T {
        let mut result = normalizer(None);
        for candidate in candidates.iter().copied() {
            let value = normalizer(self.raw(&[candidate]));
            if !is_empty(&value) {
                return value;
            }
            result = value;
        }
        result
    }

    pub fn text(&self, candidates: &[&str]) -> String {
        self.first_non_empty(candidates, normalize_text, String::is_empty)
    }

    pub fn id(&self, candidates: &[&str]) -> String {
        self.first_non_empty(candidates, normalize_id, String::is_empty)
    }

    pub fn iso(&self, candidates: &[&str]) -> String {
        self.first_non_empty(candidates, to_iso, String::is_empty)
    }

    pub fn number(&self, candidates: &[&str]) -> Option<f64> {
        self.first_non_empty(candidates, parse_number, Option::is_none)
    }

    pub fn duration_minutes(&self, candidates: &[&str]) -> Option<i64> {
        self.first_non_empty(candidates, parse_duration_minutes, Option::is_none)
    }

    pub fn boolean(&self, candidates: &[&str]) -> bool {
        self.first_non_empty(candidates, parse_bool, |flag| !flag)
    }

    pub fn tags(&self, candidates: &[&str]) -> Option<Vec<String>> {
        self.first_non_empty(candidates, split_tags, Option::is_none)
    }

    /// Date + time-of-day splice across two columns (due dates).
    pub fn date_time(&self, date_candidates: &[&str], time_candidates: &[&str]) -> String {
        combine_date_time(self.raw(date_candidates), self.raw(time_candidates), "")
    }
}

// ============================================================================
// EXPORT FILE LOCATION
// ============================================================================

/// Find the export file matching a `prefix-*.ext` pattern inside a
/// directory. Matches are sorted by name so reruns pick the same file.
/// No match is a fatal startup error.
pub fn find_export(dir: &Path, pattern: &str) -> Result<PathBuf> {
    let (prefix, suffix) = pattern
        .split_once('*')
        .with_context(|| format!("Invalid export pattern {pattern}"))?;
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read export directory {}", dir.display()))?;
    let mut matches: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(prefix) && name.ends_with(suffix) && entry.path().is_file() {
            matches.push(entry.path());
        }
    }
    matches.sort();
    match matches.into_iter().next() {
        Some(path) => Ok(path),
        None => bail!(
            "No se encontro archivo para patron {pattern} en {}",
            dir.display()
        ),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SourceTable {
        SourceTable::from_rows(
            vec![
                "ID".to_string(),
                "Organización creada".to_string(),
                " Teléfono - Móvil ".to_string(),
                "Etiquetas".to_string(),
            ],
            vec![vec![
                "12.0".to_string(),
                "2024-01-05 08:00:00".to_string(),
                "".to_string(),
                "a;b;a".to_string(),
            ]],
        )
    }

    #[test]
    fn test_column_matches_despite_accents_and_case() {
        let table = table();
        assert_eq!(table.column(&["id"]), Some(0));
        assert_eq!(table.column(&["Organizacion creada"]), Some(1));
        assert_eq!(table.column(&["TELEFONO - MOVIL"]), Some(2));
        assert_eq!(table.column(&["No existe"]), None);
    }

    #[test]
    fn test_column_candidate_priority() {
        let table = table();
        // First candidate missing → second wins
        assert_eq!(table.column(&["Hora de adicion", "Organizacion creada"]), Some(1));
        // First candidate present → it wins even if later ones also match
        assert_eq!(table.column(&["ID", "Etiquetas"]), Some(0));
    }

    #[test]
    fn test_row_accessors() {
        let table = table();
        let row = table.rows().next().unwrap();
        assert_eq!(row.id(&["ID"]), "12");
        assert_eq!(row.iso(&["Organizacion creada"]), "2024-01-05T08:00:00");
        assert_eq!(row.text(&["Telefono - Movil"]), "");
        assert_eq!(
            row.tags(&["Etiquetas"]),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        // Missing column behaves like a missing cell
        assert_eq!(row.text(&["Inexistente"]), "");
        assert_eq!(row.number(&["Inexistente"]), None);
    }

    #[test]
    fn test_row_value_level_fallback() {
        let table = SourceTable::from_rows(
            vec!["Direccion completa".to_string(), "Direccion".to_string()],
            vec![
                vec!["".to_string(), "Calle Falsa 123".to_string()],
                vec!["Av. Siempreviva 742".to_string(), "otra".to_string()],
            ],
        );
        let rows: Vec<Row<'_>> = table.rows().collect();
        // Empty first value → falls through to the second column
        assert_eq!(rows[0].text(&["Direccion completa", "Direccion"]), "Calle Falsa 123");
        // Non-empty first value wins
        assert_eq!(rows[1].text(&["Direccion completa", "Direccion"]), "Av. Siempreviva 742");
    }

    #[test]
    fn test_short_rows_read_as_missing() {
        let table = SourceTable::from_rows(
            vec!["ID".to_string(), "Nombre".to_string()],
            vec![vec!["5".to_string()]],
        );
        let row = table.rows().next().unwrap();
        assert_eq!(row.id(&["ID"]), "5");
        assert_eq!(row.text(&["Nombre"]), "");
    }

    #[test]
    fn test_find_export() {
        let dir = std::env::temp_dir().join(format!("crm-import-find-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("organizations-2024.csv"), "ID\n1\n").unwrap();
        std::fs::write(dir.join("people-2024.csv"), "ID\n1\n").unwrap();

        let found = find_export(&dir, "organizations-*.csv").unwrap();
        assert!(found.ends_with("organizations-2024.csv"));
        assert!(find_export(&dir, "deals-*.csv").is_err());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
