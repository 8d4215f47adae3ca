use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use std::path::Path;

use crate::table::{CellValue, Table};

/// Name of the single worksheet in a downloaded workbook
pub const SHEET_NAME: &str = "Processed Data";

/// Convert a processed table to XLSX format
///
/// Writes the column names as a bold header row followed by the data rows.
/// Numbers and booleans keep their type; empty cells are left blank.
///
/// # Arguments
/// * `table` - The processed result to export
///
/// # Returns
/// * `Result<Vec<u8>, XlsxError>` - XLSX file content as bytes or an error
///
/// # Examples
/// ```
/// use data_extractor::downloader::to_xlsx;
/// use data_extractor::table::Table;
///
/// let table = Table::from_csv("a,b\n1,2").unwrap();
/// let xlsx = to_xlsx(&table).unwrap();
/// assert!(xlsx.starts_with(b"PK"));
/// ```
pub fn to_xlsx(table: &Table) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    worksheet.set_name(SHEET_NAME)?;

    let header = Format::new().set_bold();
    for (c, column) in table.columns.iter().enumerate() {
        worksheet.write_string_with_format(0, c as u16, column, &header)?;
    }

    for (r, row) in table.rows.iter().enumerate() {
        let row_index = (r + 1) as u32;
        for (c, cell) in row.iter().enumerate() {
            let col_index = c as u16;
            match cell {
                CellValue::Empty => {}
                CellValue::Bool(b) => {
                    worksheet.write_boolean(row_index, col_index, *b)?;
                }
                CellValue::Int(n) => {
                    worksheet.write_number(row_index, col_index, *n as f64)?;
                }
                CellValue::Float(f) => {
                    worksheet.write_number(row_index, col_index, *f)?;
                }
                CellValue::Text(s) => {
                    worksheet.write_string(row_index, col_index, s)?;
                }
            }
        }
    }

    workbook.push_worksheet(worksheet);

    let buffer = workbook.save_to_buffer()?;

    Ok(buffer)
}

/// Name offered for the downloaded workbook
///
/// Keeps the stem of the uploaded file and always uses the `.xlsx` extension,
/// since the download is written as XLSX whatever was uploaded.
///
/// # Examples
/// ```
/// use data_extractor::downloader::download_filename;
///
/// assert_eq!(download_filename("data.xlsx"), "processed_data.xlsx");
/// assert_eq!(download_filename("legacy.xls"), "processed_legacy.xlsx");
/// ```
pub fn download_filename(original_name: &str) -> String {
    let stem = Path::new(original_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("result");

    format!("processed_{}.xlsx", stem)
}
