//! Export predictions to CSV.
//!
//! Two columns, matching the submission format: `User_ID,Purchased_Coverage_Bundle`.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::domain::Prediction;
use crate::error::AppError;
use crate::schema::{ID_COLUMN, TARGET_COLUMN};

/// Write predictions to a CSV file.
pub fn write_predictions_csv(path: &Path, predictions: &[Prediction]) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create predictions CSV '{}': {e}", path.display())))?;
    write_predictions(file, predictions)
}

/// Write predictions as CSV to any writer.
pub fn write_predictions<W: Write>(out: W, predictions: &[Prediction]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_writer(out);
    writer
        .write_record([ID_COLUMN, TARGET_COLUMN])
        .map_err(|e| AppError::new(2, format!("Failed to write predictions CSV header: {e}")))?;

    for p in predictions {
        writer
            .write_record([p.user_id.as_deref().unwrap_or(""), &p.bundle.to_string()])
            .map_err(|e| AppError::new(2, format!("Failed to write predictions CSV row: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush predictions CSV: {e}")))?;
    Ok(())
}
