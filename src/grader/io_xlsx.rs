// Primitives for reading Excel files: only the first worksheet is read.

use calamine::{open_workbook, DataType, Reader, Xlsx};
use log::{debug, warn};
use snafu::prelude::*;

use crate::grader::io_common::RawTable;
use crate::grader::*;

pub fn read_excel_table(path: &str) -> AppResult<RawTable> {
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;
    let wrange = workbook
        .worksheet_range_at(0)
        .context(EmptyExcelSnafu { path })?
        .context(OpeningExcelSnafu { path })?;

    let mut iter = wrange.rows();
    let header: Vec<String> = iter
        .next()
        .context(EmptyExcelSnafu { path })?
        .iter()
        .map(|c| read_cell(path, 1, c))
        .collect();
    debug!("read_excel_table: {}: header: {:?}", path, header);

    let rows = iter
        .enumerate()
        .map(|(idx, row)| {
            let lineno = idx + 2;
            (lineno, row.iter().map(|c| read_cell(path, lineno, c)).collect())
        })
        .collect();
    Ok(RawTable { header, rows })
}

fn read_cell(path: &str, lineno: usize, cell: &DataType) -> String {
    match cell {
        DataType::String(s) => s.clone(),
        DataType::Float(f) => f.to_string(),
        DataType::Int(i) => i.to_string(),
        DataType::Bool(b) => b.to_string(),
        DataType::DateTime(d) => d.to_string(),
        DataType::Empty => String::new(),
        _ => {
            warn!(
                "{}:{}: could not understand cell {:?}, using an empty value",
                path, lineno, cell
            );
            String::new()
        }
    }
}
