//! Review CSV loading
//!
//! The file must carry `Title`, `Review`, `Rating` and `Date` columns. Each row
//! becomes one [`Document`] whose id is the zero-based row position.

use crate::types::{AppError, Document, Result, ReviewMetadata};
use std::path::Path;
use tracing::{debug, info, instrument};

pub const TITLE_COLUMN: &str = "Title";
pub const REVIEW_COLUMN: &str = "Review";
pub const RATING_COLUMN: &str = "Rating";
pub const DATE_COLUMN: &str = "Date";

struct Columns {
    title: usize,
    review: usize,
    rating: usize,
    date: usize,
}

impl Columns {
    fn locate(headers: &csv::StringRecord, path: &Path) -> Result<Self> {
        let find = |name: &str| {
            headers.iter().position(|h| h == name).ok_or_else(|| {
                AppError::Validation(format!(
                    "{} is missing required column '{}'",
                    path.display(),
                    name
                ))
            })
        };

        Ok(Self {
            title: find(TITLE_COLUMN)?,
            review: find(REVIEW_COLUMN)?,
            rating: find(RATING_COLUMN)?,
            date: find(DATE_COLUMN)?,
        })
    }
}

/// Read every review in `path`.
///
/// # Errors
///
/// [`AppError::Validation`] if the file is missing, lacks a required column,
/// or a row has a rating that is not a number.
#[instrument]
pub fn load_reviews(path: &Path) -> Result<Vec<Document>> {
    if !path.is_file() {
        return Err(AppError::Validation(format!(
            "Review file not found: {}",
            path.display()
        )));
    }

    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| AppError::Validation(format!("Cannot read {}: {}", path.display(), e)))?;

    let headers = reader
        .headers()
        .map_err(|e| AppError::Validation(format!("Cannot read headers of {}: {}", path.display(), e)))?
        .clone();
    let columns = Columns::locate(&headers, path)?;

    let mut documents = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record
            .map_err(|e| AppError::Validation(format!("Row {}: malformed record: {}", row, e)))?;
        let field = |idx: usize| record.get(idx).unwrap_or_default();

        let raw_rating = field(columns.rating).trim();
        let rating = raw_rating
            .parse::<f64>()
            .ok()
            .filter(|r| r.is_finite())
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "Row {}: rating '{}' is not a number",
                    row, raw_rating
                ))
            })?;

        let document = Document {
            id: row.to_string(),
            content: format!("{} {}", field(columns.title), field(columns.review)),
            metadata: ReviewMetadata::new(rating, raw_rating, field(columns.date)),
        };
        debug!(id = %document.id, "Loaded review");
        documents.push(document);
    }

    info!(count = documents.len(), "Loaded reviews");
    Ok(documents)
}
