// Primitives for reading CSV files.

use std::io::Read;

use log::debug;
use snafu::prelude::*;

use crate::grader::io_common::RawTable;
use crate::grader::*;

pub fn read_csv_table(path: &str) -> AppResult<RawTable> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;
    read_records(path, rdr)
}

fn read_records<R: Read>(path: &str, rdr: csv::Reader<R>) -> AppResult<RawTable> {
    let mut records = rdr.into_records();
    let header = records
        .next()
        .context(MissingHeaderSnafu { path })?
        .context(CsvLineParseSnafu { path, lineno: 1usize })?;
    let header: Vec<String> = header.iter().map(|s| s.to_string()).collect();
    debug!("read_csv_table: {}: header: {:?}", path, header);

    let mut rows: Vec<(usize, Vec<String>)> = Vec::new();
    for (idx, line_r) in records.enumerate() {
        let lineno = idx + 2;
        let line = line_r.context(CsvLineParseSnafu { path, lineno })?;
        rows.push((lineno, line.iter().map(|s| s.to_string()).collect()));
    }
    Ok(RawTable { header, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn read_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "Name,Lastname,\"Programming: how good?\"").unwrap();
        writeln!(f, "John,Doe,\"Expert, really\"").unwrap();
        writeln!(f, ",,").unwrap();
        writeln!(f, "Mary,Smith").unwrap();
        f.flush().unwrap();
        let path = f.path().display().to_string();
        let t = read_csv_table(&path).unwrap();
        assert_eq!(t.header.len(), 3);
        assert_eq!(t.rows.len(), 3);
        assert_eq!(t.rows[0].1[2], "Expert, really");
        assert_eq!(t.rows[2].0, 4);
        assert_eq!(t.rows[2].1.len(), 2);
    }

    #[test]
    fn empty_file() {
        let rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader("".as_bytes());
        assert!(matches!(
            read_records("empty.csv", rdr),
            Err(AppError::MissingHeader { .. })
        ));
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            read_csv_table("/nonexistent/applications.csv"),
            Err(AppError::CsvOpen { .. })
        ));
    }
}
