use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

pub const SOURCE_FILE_KEY: &str = "source_file";
pub const FOOD_NAME_KEY: &str = "food_name";
pub const UNKNOWN_FOOD_NAME: &str = "desconhecido";

pub const MAX_VALUE_CHARS: usize = 400;
pub const VALUE_TRUNCATION_MARKER: &str = "... [truncado]";
pub const MAX_TEXT_CHARS: usize = 3000;
pub const TEXT_TRUNCATION_MARKER: &str = "... [reduced for LLM]";

const PROVENANCE_PREFIX: &str = "Fonte: ";
const FIELD_SEPARATOR: &str = " | ";
const DEGREE_WORD: &str = " graus";
// Unit symbols that survive the ASCII filter.
const UNIT_SYMBOL_WHITELIST: [char; 4] = ['°', 'º', 'ª', 'µ'];

/// Column names that may carry the food's name, in priority order.
/// Matching is case-insensitive.
pub const FOOD_NAME_ALIASES: &[&str] = &[
    "food",
    "name",
    "alimento",
    "food_name",
    "food_item",
    "description",
    "descricao",
];

/// A scalar metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetadataValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Text(s) => write!(f, "{}", s),
            MetadataValue::Integer(i) => write!(f, "{}", i),
            MetadataValue::Float(x) => write!(f, "{}", x),
            MetadataValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Text(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::Text(s)
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

/// One tabular row: header/cell pairs in column order. A `None` cell is null.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub index: usize,
    pub cells: Vec<(String, Option<String>)>,
}

impl Row {
    pub fn new(index: usize, cells: Vec<(String, Option<String>)>) -> Self {
        Self { index, cells }
    }

    /// Convenience for tests and small fixtures: every cell is non-null.
    pub fn from_pairs(index: usize, pairs: &[(&str, &str)]) -> Self {
        let cells = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Some(v.to_string())))
            .collect();
        Self { index, cells }
    }
}

/// A normalized, retrievable record built from one source row.
///
/// Fields are private; a document is never changed once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    id: String,
    text: String,
    metadata: Metadata,
    excluded_embed_keys: Vec<String>,
    excluded_llm_keys: Vec<String>,
}

impl Document {
    /// Builds a document whose `source_file` metadata is hidden from both the
    /// embedder and the generator.
    pub fn new(id: impl Into<String>, text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata,
            excluded_embed_keys: vec![SOURCE_FILE_KEY.to_string()],
            excluded_llm_keys: vec![SOURCE_FILE_KEY.to_string()],
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn food_name(&self) -> &str {
        match self.metadata.get(FOOD_NAME_KEY) {
            Some(MetadataValue::Text(name)) => name,
            _ => UNKNOWN_FOOD_NAME,
        }
    }

    pub fn source_file(&self) -> Option<&str> {
        match self.metadata.get(SOURCE_FILE_KEY) {
            Some(MetadataValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Text handed to the embedding provider.
    pub fn embed_text(&self) -> String {
        self.render_with_metadata(&self.excluded_embed_keys)
    }

    /// Text placed in the generation context.
    pub fn llm_text(&self) -> String {
        self.render_with_metadata(&self.excluded_llm_keys)
    }

    // Visible metadata as `key: value` lines, a blank line, then the body.
    fn render_with_metadata(&self, excluded: &[String]) -> String {
        let header: Vec<String> = self
            .metadata
            .iter()
            .filter(|(key, _)| !excluded.iter().any(|e| e == *key))
            .map(|(key, value)| format!("{}: {}", key, value))
            .collect();
        if header.is_empty() {
            self.text.clone()
        } else {
            format!("{}\n\n{}", header.join("\n"), self.text)
        }
    }
}

/// Normalizes a single cell value: trims, spells out the degree sign, drops
/// characters outside printable ASCII (bar a few unit symbols) and bounds the
/// length to [`MAX_VALUE_CHARS`] plus the truncation marker.
pub fn sanitize_value(raw: &str) -> String {
    let replaced = raw.trim().replace('°', DEGREE_WORD);
    let cleaned: String = replaced
        .chars()
        .map(|c| if c.is_ascii_whitespace() { ' ' } else { c })
        .filter(|c| *c == ' ' || c.is_ascii_graphic() || UNIT_SYMBOL_WHITELIST.contains(c))
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.chars().count() > MAX_VALUE_CHARS {
        let keep = MAX_VALUE_CHARS - 3;
        let mut truncated: String = cleaned.chars().take(keep).collect();
        truncated.push_str(VALUE_TRUNCATION_MARKER);
        truncated
    } else {
        cleaned.to_string()
    }
}

/// Resolves the canonical food name from whichever alias column is present
/// and non-empty, falling back to [`UNKNOWN_FOOD_NAME`].
pub fn resolve_food_name(cells: &[(String, Option<String>)]) -> String {
    for alias in FOOD_NAME_ALIASES {
        let hit = cells.iter().find_map(|(column, value)| {
            if !column.trim().eq_ignore_ascii_case(alias) {
                return None;
            }
            value.as_deref().map(str::trim).filter(|v| !v.is_empty())
        });
        if let Some(name) = hit {
            return name.to_string();
        }
    }
    UNKNOWN_FOOD_NAME.to_string()
}

/// Display name of a source: its file name when it has one.
pub fn source_label(source: &str) -> String {
    Path::new(source)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(source)
        .to_string()
}

/// Converts one row into a [`Document`].
///
/// Returns `None` when no cell holds a printable value; such rows carry
/// nothing beyond provenance and are not indexed.
pub fn build_document(row: &Row, source: &str) -> Option<Document> {
    let label = source_label(source);
    let mut parts = vec![format!("{}{}", PROVENANCE_PREFIX, label)];

    for (column, value) in &row.cells {
        let Some(raw) = value else { continue };
        let cleaned = sanitize_value(raw);
        if cleaned.is_empty() {
            continue;
        }
        parts.push(format!("{}: {}", column.trim(), cleaned));
    }

    if parts.len() == 1 {
        return None;
    }

    let mut text = parts.join(FIELD_SEPARATOR);
    if text.chars().count() > MAX_TEXT_CHARS {
        let mut clipped: String = text.chars().take(MAX_TEXT_CHARS - 3).collect();
        clipped.push_str(TEXT_TRUNCATION_MARKER);
        text = clipped;
    }

    let mut metadata = Metadata::new();
    metadata.insert(FOOD_NAME_KEY.to_string(), resolve_food_name(&row.cells).into());
    metadata.insert(SOURCE_FILE_KEY.to_string(), source.into());

    Some(Document::new(format!("{}#{}", label, row.index), text, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banana_row_matches_expected_document() {
        let row = Row::from_pairs(0, &[("food", "Banana"), ("calories", "89"), ("protein", "1.1")]);
        let doc = build_document(&row, "foods.csv").unwrap();

        assert_eq!(doc.text(), "Fonte: foods.csv | food: Banana | calories: 89 | protein: 1.1");
        assert_eq!(doc.food_name(), "Banana");
        assert_eq!(doc.source_file(), Some("foods.csv"));
        assert_eq!(doc.metadata().len(), 2);
        assert_eq!(doc.id(), "foods.csv#0");
    }

    #[test]
    fn provenance_uses_file_name_but_metadata_keeps_full_path() {
        let row = Row::from_pairs(3, &[("name", "Apple")]);
        let doc = build_document(&row, "data/healthy_foods_database.csv").unwrap();
        assert!(doc.text().starts_with("Fonte: healthy_foods_database.csv | "));
        assert_eq!(doc.source_file(), Some("data/healthy_foods_database.csv"));
    }

    #[test]
    fn null_cells_are_skipped() {
        let row = Row::new(
            1,
            vec![
                ("food".into(), Some("Kiwi".into())),
                ("fiber".into(), None),
                ("sugar".into(), Some("".into())),
                ("kcal".into(), Some(" 61 ".into())),
            ],
        );
        let doc = build_document(&row, "foods.csv").unwrap();
        assert_eq!(doc.text(), "Fonte: foods.csv | food: Kiwi | kcal: 61");
    }

    #[test]
    fn entirely_empty_row_yields_nothing() {
        let row = Row::new(2, vec![("food".into(), None), ("kcal".into(), Some("   ".into()))]);
        assert!(build_document(&row, "foods.csv").is_none());
    }

    #[test]
    fn degree_sign_becomes_word_and_non_ascii_is_dropped() {
        assert_eq!(sanitize_value("Cozinhar a 180°C"), "Cozinhar a 180 grausC");
        assert_eq!(sanitize_value("açúcar"), "acar");
        assert_eq!(sanitize_value("5 µg"), "5 µg");
        assert_eq!(sanitize_value("1º lugar"), "1º lugar");
        assert_eq!(sanitize_value("line\nbreak"), "line break");
    }

    #[test]
    fn long_values_are_truncated_with_marker() {
        let raw = "a".repeat(1000);
        let cleaned = sanitize_value(&raw);
        assert!(cleaned.ends_with(VALUE_TRUNCATION_MARKER));
        assert!(
            cleaned.chars().count() <= MAX_VALUE_CHARS + VALUE_TRUNCATION_MARKER.chars().count()
        );
        assert_eq!(cleaned.chars().count(), 397 + VALUE_TRUNCATION_MARKER.chars().count());
    }

    #[test]
    fn value_at_limit_is_kept_whole() {
        let raw = "b".repeat(MAX_VALUE_CHARS);
        assert_eq!(sanitize_value(&raw), raw);
    }

    #[test]
    fn long_rows_are_truncated_with_marker() {
        let cells: Vec<(String, Option<String>)> = (0..20)
            .map(|i| (format!("col{}", i), Some("z".repeat(390))))
            .collect();
        let doc = build_document(&Row::new(0, cells), "wide.csv").unwrap();
        assert!(doc.text().ends_with(TEXT_TRUNCATION_MARKER));
        assert_eq!(
            doc.text().chars().count(),
            MAX_TEXT_CHARS - 3 + TEXT_TRUNCATION_MARKER.chars().count()
        );
    }

    #[test]
    fn food_name_alias_priority_and_default() {
        let both = vec![
            ("Name".to_string(), Some("Generic".to_string())),
            ("food".to_string(), Some("Specific".to_string())),
        ];
        assert_eq!(resolve_food_name(&both), "Specific");

        let local = vec![("Alimento".to_string(), Some("Maçã".to_string()))];
        assert_eq!(resolve_food_name(&local), "Maçã");

        let empty_food = vec![
            ("food".to_string(), Some("  ".to_string())),
            ("name".to_string(), Some("Fallback".to_string())),
        ];
        assert_eq!(resolve_food_name(&empty_food), "Fallback");

        let none = vec![("calories".to_string(), Some("10".to_string()))];
        assert_eq!(resolve_food_name(&none), UNKNOWN_FOOD_NAME);
    }

    #[test]
    fn builder_is_deterministic() {
        let row = Row::from_pairs(7, &[("food", "Oats"), ("kcal", "389")]);
        assert_eq!(build_document(&row, "a.csv"), build_document(&row, "a.csv"));
    }

    #[test]
    fn source_file_is_hidden_from_embedder_and_generator() {
        let row = Row::from_pairs(0, &[("food", "Banana")]);
        let doc = build_document(&row, "foods.csv").unwrap();

        for rendered in [doc.embed_text(), doc.llm_text()] {
            assert!(rendered.starts_with("food_name: Banana\n\n"));
            assert!(!rendered.contains("source_file"));
            assert!(rendered.ends_with(doc.text()));
        }
    }
}
