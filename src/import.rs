use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::cache::IngredientCache;
use crate::db::Database;
use crate::error::ApiError;
use crate::models::NewIngredient;
use crate::query;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("unsupported file format {0:?}, expected .csv or .json")]
    UnsupportedFormat(String),
    #[error("file {0} not found")]
    NotFound(PathBuf),
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid CSV at row {row}: expected columns name, measurement_unit")]
    Csv { row: usize },
    #[error("invalid JSON file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("entry {index} is missing name or measurement_unit")]
    MissingField { index: usize },
    #[error("could not store ingredients: {0}")]
    Database(#[from] ApiError),
}

/// Outcome of an import: rows read from the file and rows that were new.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub parsed: usize,
    pub inserted: usize,
}

/// Loads the whole file before writing, so a bad row leaves the catalogue untouched.
pub fn import_file(
    db: &Database,
    cache: Option<&IngredientCache>,
    path: &Path,
) -> Result<ImportSummary, ImportError> {
    let rows = read_ingredients(path)?;
    let parsed = rows.len();
    let inserted = db.run_blocking(move |conn| {
        Ok(query::ingredients::insert_ignoring_duplicates(conn, &rows)?)
    })?;
    if let Some(cache) = cache {
        cache.invalidate();
    }
    log::info!(
        "imported ingredients from {}: {} parsed, {} new",
        path.display(),
        parsed,
        inserted
    );
    Ok(ImportSummary { parsed, inserted })
}

#[derive(Debug, Deserialize)]
struct JsonRecord {
    name: Option<String>,
    measurement_unit: Option<String>,
}

/// Reads ingredients from a `.csv` (`name,measurement_unit`, no header) or a
/// `.json` array of `{name, measurement_unit}` objects.
pub fn read_ingredients(path: &Path) -> Result<Vec<NewIngredient>, ImportError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if extension != "csv" && extension != "json" {
        return Err(ImportError::UnsupportedFormat(extension));
    }
    let file = File::open(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ImportError::NotFound(path.to_path_buf())
        } else {
            ImportError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    let reader = BufReader::new(file);
    match extension.as_str() {
        "csv" => parse_csv(reader),
        _ => parse_json(reader),
    }
}

pub fn parse_csv<R: std::io::Read>(reader: R) -> Result<Vec<NewIngredient>, ImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut ingredients = Vec::new();
    for (index, record) in csv_reader.records().enumerate() {
        let row = index + 1;
        let record = record.map_err(|_| ImportError::Csv { row })?;
        if record.len() != 2 {
            return Err(ImportError::Csv { row });
        }
        let name = record[0].trim();
        let measurement_unit = record[1].trim();
        if name.is_empty() || measurement_unit.is_empty() {
            return Err(ImportError::Csv { row });
        }
        ingredients.push(NewIngredient {
            name: name.to_string(),
            measurement_unit: measurement_unit.to_string(),
        });
    }
    Ok(ingredients)
}

pub fn parse_json<R: std::io::Read>(reader: R) -> Result<Vec<NewIngredient>, ImportError> {
    let records: Vec<JsonRecord> = serde_json::from_reader(reader)?;
    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            let name = record.name.as_deref().map(str::trim).unwrap_or_default();
            let unit = record
                .measurement_unit
                .as_deref()
                .map(str::trim)
                .unwrap_or_default();
            if name.is_empty() || unit.is_empty() {
                return Err(ImportError::MissingField { index });
            }
            Ok(NewIngredient {
                name: name.to_string(),
                measurement_unit: unit.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn ingredient(name: &str, unit: &str) -> NewIngredient {
        NewIngredient {
            name: name.to_string(),
            measurement_unit: unit.to_string(),
        }
    }

    #[test]
    fn parses_csv_rows() {
        let data = "абрикосовое варенье,г\nmilk, ml\n\"salt, sea\",g\n";
        let parsed = parse_csv(data.as_bytes()).unwrap();
        assert_eq!(
            parsed,
            vec![
                ingredient("абрикосовое варенье", "г"),
                ingredient("milk", "ml"),
                ingredient("salt, sea", "g"),
            ]
        );
    }

    #[test]
    fn csv_with_wrong_columns_fails() {
        let err = parse_csv("flour,g\nsugar\n".as_bytes()).unwrap_err();
        assert!(matches!(err, ImportError::Csv { row: 2 }));

        let err = parse_csv("flour,g,extra\n".as_bytes()).unwrap_err();
        assert!(matches!(err, ImportError::Csv { row: 1 }));
    }

    #[test]
    fn parses_json_records() {
        let data = r#"[{"name": "flour", "measurement_unit": "g"}, {"name": "egg", "measurement_unit": "pcs"}]"#;
        let parsed = parse_json(data.as_bytes()).unwrap();
        assert_eq!(parsed, vec![ingredient("flour", "g"), ingredient("egg", "pcs")]);
    }

    #[test]
    fn json_missing_field_fails() {
        let data = r#"[{"name": "flour", "measurement_unit": "g"}, {"name": "egg"}]"#;
        let err = parse_json(data.as_bytes()).unwrap_err();
        assert!(matches!(err, ImportError::MissingField { index: 1 }));
    }

    #[test]
    fn malformed_json_fails() {
        assert!(matches!(parse_json("{not json".as_bytes()), Err(ImportError::Json(_))));
    }

    #[test]
    fn dispatches_on_extension() {
        let dir = tempfile::tempdir().unwrap();

        let csv_path = dir.path().join("ingredients.CSV");
        let mut file = File::create(&csv_path).unwrap();
        writeln!(file, "rice,g").unwrap();
        assert_eq!(read_ingredients(&csv_path).unwrap(), vec![ingredient("rice", "g")]);

        let json_path = dir.path().join("ingredients.json");
        std::fs::write(&json_path, r#"[{"name": "oil", "measurement_unit": "ml"}]"#).unwrap();
        assert_eq!(read_ingredients(&json_path).unwrap(), vec![ingredient("oil", "ml")]);

        let txt_path = dir.path().join("ingredients.txt");
        std::fs::write(&txt_path, "rice,g").unwrap();
        assert!(matches!(
            read_ingredients(&txt_path),
            Err(ImportError::UnsupportedFormat(ext)) if ext == "txt"
        ));

        assert!(matches!(
            read_ingredients(&dir.path().join("missing.csv")),
            Err(ImportError::NotFound(_))
        ));
    }
}
