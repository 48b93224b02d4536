use csv::ReaderBuilder;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::document::{build_document, Document, Row};
use crate::error::IngestionError;

/// Per-file counters reported after ingestion.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestStats {
    pub rows_read: usize,
    pub documents: usize,
    pub empty_rows: usize,
    pub unreadable_rows: usize,
}

/// Reads one CSV file and turns every row into a [`Document`].
///
/// Invalid UTF-8 is replaced rather than rejected. Rows the CSV reader cannot
/// decode are logged and skipped; an unreadable file is an error.
pub fn load_csv_documents(csv_path: &Path) -> Result<(Vec<Document>, IngestStats), IngestionError> {
    if !csv_path.exists() {
        return Err(IngestionError::Missing(csv_path.to_path_buf()));
    }

    let read_err = |source: csv::Error| IngestionError::Read {
        path: csv_path.to_path_buf(),
        source,
    };

    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(csv_path)
        .map_err(read_err)?;

    let headers: Vec<String> = rdr
        .byte_headers()
        .map_err(read_err)?
        .iter()
        .map(|h| String::from_utf8_lossy(h).trim_start_matches('\u{feff}').to_string())
        .collect();

    let source = csv_path.to_string_lossy().to_string();
    let mut documents = Vec::new();
    let mut stats = IngestStats::default();

    for (row_index, result) in rdr.byte_records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    path = %csv_path.display(),
                    row = row_index,
                    error = %e,
                    "skipping unreadable row"
                );
                stats.unreadable_rows += 1;
                continue;
            }
        };
        stats.rows_read += 1;

        let cells = headers
            .iter()
            .enumerate()
            .map(|(col, header)| {
                let value = record
                    .get(col)
                    .map(|raw| String::from_utf8_lossy(raw).to_string())
                    .filter(|v| !v.is_empty());
                (header.clone(), value)
            })
            .collect();

        match build_document(&Row::new(row_index, cells), &source) {
            Some(doc) => documents.push(doc),
            None => stats.empty_rows += 1,
        }
    }

    stats.documents = documents.len();
    if stats.empty_rows > 0 {
        debug!(
            path = %csv_path.display(),
            empty_rows = stats.empty_rows,
            "dropped rows without printable values"
        );
    }
    Ok((documents, stats))
}

/// Loads every source, skipping the ones that are missing or unreadable.
/// Fails only when nothing at all could be turned into a document.
pub fn load_sources(paths: &[PathBuf]) -> Result<Vec<Document>, IngestionError> {
    let mut documents = Vec::new();

    for path in paths {
        match load_csv_documents(path) {
            Ok((docs, stats)) => {
                info!(
                    path = %path.display(),
                    rows = stats.rows_read,
                    documents = stats.documents,
                    "loaded source"
                );
                documents.extend(docs);
            }
            Err(IngestionError::Missing(p)) => {
                warn!(path = %p.display(), "source not found, skipping");
            }
            Err(e) => {
                warn!(error = %e, "failed to process source, skipping");
            }
        }
    }

    if documents.is_empty() {
        return Err(IngestionError::NoDocuments);
    }
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv_file() -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "food,calories,protein").unwrap();
        writeln!(file, "Banana,89,1.1").unwrap();
        writeln!(file, "Apple,,0.3").unwrap();
        writeln!(file, ",,").unwrap();
        writeln!(file, "Carrot,41,0.9").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn loads_documents_and_drops_empty_rows() {
        let file = create_test_csv_file();
        let (docs, stats) = load_csv_documents(file.path()).unwrap();

        assert_eq!(docs.len(), 3);
        assert_eq!(stats.rows_read, 4);
        assert_eq!(stats.empty_rows, 1);

        let label = crate::document::source_label(&file.path().to_string_lossy());
        assert_eq!(
            docs[0].text(),
            format!("Fonte: {} | food: Banana | calories: 89 | protein: 1.1", label)
        );
        assert_eq!(docs[1].text(), format!("Fonte: {} | food: Apple | protein: 0.3", label));
        assert_eq!(docs[2].food_name(), "Carrot");
    }

    #[test]
    fn short_rows_and_bad_utf8_are_tolerated() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"name,kcal\nCaf\xe9,2\nLonely\n").unwrap();
        file.flush().unwrap();

        let (docs, _) = load_csv_documents(file.path()).unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs[0].text().contains("name: Caf"));
        assert!(docs[1].text().ends_with("name: Lonely"));
    }

    #[test]
    fn missing_file_is_reported() {
        let result = load_csv_documents(Path::new("this_file_does_not_exist.csv"));
        assert!(matches!(result, Err(IngestionError::Missing(_))));
    }

    #[test]
    fn missing_sources_are_skipped() {
        let file = create_test_csv_file();
        let paths = vec![PathBuf::from("nope.csv"), file.path().to_path_buf()];
        let docs = load_sources(&paths).unwrap();
        assert_eq!(docs.len(), 3);
    }

    #[test]
    fn no_documents_at_all_is_fatal() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "food,calories").unwrap();
        file.flush().unwrap();

        let paths = vec![PathBuf::from("nope.csv"), file.path().to_path_buf()];
        assert!(matches!(load_sources(&paths), Err(IngestionError::NoDocuments)));
    }
}
