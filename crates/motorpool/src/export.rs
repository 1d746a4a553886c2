//! Trip log export.
//!
//! One row per log with Korean column headers. The same rows back the
//! terminal table, which pads each column to its width hint.

use std::io::Write;

use chrono::NaiveDate;

use crate::error::Result;
use crate::model::TripLog;

/// Column headers, in order.
pub const HEADERS: [&str; 9] = [
    "날짜",
    "차량번호",
    "차종",
    "운전자",
    "용무/목적지",
    "출차시간",
    "반납시간",
    "상태",
    "현장",
];

/// Column width hints, in characters.
pub const COLUMN_WIDTHS: [usize; 9] = [12, 12, 10, 10, 25, 20, 20, 10, 10];

/// Shown in the return column for trips still out.
pub const NOT_RETURNED: &str = "미반납";

/// One exported row.
#[must_use]
pub fn row(log: &TripLog) -> [String; 9] {
    [
        log.out_time.date().format("%Y-%m-%d").to_string(),
        log.plate.clone(),
        log.model.clone(),
        log.driver.clone(),
        log.purpose.clone(),
        log.out_time.to_string(),
        log.in_time
            .map_or_else(|| NOT_RETURNED.to_string(), |t| t.to_string()),
        log.status.label().to_string(),
        log.project_id.label().to_string(),
    ]
}

/// Write `logs` as CSV with a header row.
///
/// # Errors
///
/// Returns an error if writing to `out` fails.
pub fn write_csv<'a, W, I>(out: W, logs: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a TripLog>,
{
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(HEADERS)?;
    for log in logs {
        writer.write_record(row(log))?;
    }
    writer.flush()?;
    Ok(())
}

/// Default export file name for `date`.
#[must_use]
pub fn default_file_name(date: NaiveDate) -> String {
    format!("운행기록_{}.csv", date.format("%Y-%m-%d"))
}

/// Render `logs` as a fixed-width text table.
#[must_use]
pub fn render_table<'a, I>(logs: I) -> String
where
    I: IntoIterator<Item = &'a TripLog>,
{
    let mut out = pad_line(HEADERS.iter().map(|h| (*h).to_string()));
    for log in logs {
        out.push_str(&pad_line(row(log)));
    }
    out
}

fn pad_line(cells: impl IntoIterator<Item = String>) -> String {
    let mut line = cells
        .into_iter()
        .zip(COLUMN_WIDTHS)
        .map(|(cell, width)| {
            let len = cell.chars().count();
            if len >= width {
                format!("{cell} ")
            } else {
                format!("{cell}{}", " ".repeat(width - len))
            }
        })
        .collect::<String>()
        .trim_end()
        .to_string();
    line.push('\n');
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LogPatch, NewTripLog, Vehicle};
    use crate::timestamp::Timestamp;

    fn sample() -> Vec<TripLog> {
        let fleet = Vehicle::default_fleet();
        let out = Timestamp::parse("2024-01-05 10:00").unwrap();
        let mut done = NewTripLog::departing(&fleet[0], "Kim", "Bank", out).with_id(1);
        LogPatch::complete(Timestamp::parse("2024-01-05 11:30").unwrap()).apply(&mut done);
        let ongoing = NewTripLog::departing(&fleet[4], "Lee", "Site visit", out).with_id(2);
        vec![done, ongoing]
    }

    #[test]
    fn test_row_labels() {
        let logs = sample();
        let done = row(&logs[0]);
        assert_eq!(done[0], "2024-01-05");
        assert_eq!(done[6], "2024-01-05 11:30");
        assert_eq!(done[7], "반납완료");
        assert_eq!(done[8], "초순수");

        let ongoing = row(&logs[1]);
        assert_eq!(ongoing[6], NOT_RETURNED);
        assert_eq!(ongoing[7], "운행중");
        assert_eq!(ongoing[8], "그린동");
    }

    #[test]
    fn test_write_csv() {
        let logs = sample();
        let mut buf = Vec::new();
        write_csv(&mut buf, &logs).unwrap();

        let mut reader = csv::Reader::from_reader(buf.as_slice());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), HEADERS);

        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get(1), Some("170허8468"));
        assert_eq!(records[1].get(6), Some(NOT_RETURNED));
    }

    #[test]
    fn test_write_csv_empty_has_header_only() {
        let mut buf = Vec::new();
        write_csv(&mut buf, std::iter::empty()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("날짜,차량번호"));
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_csv_reports_io_failure() {
        let err = write_csv(BrokenPipe, &sample()).unwrap_err();
        assert!(matches!(err, crate::error::Error::Io(_)));
    }

    #[test]
    fn test_default_file_name() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(default_file_name(date), "운행기록_2024-03-09.csv");
    }

    #[test]
    fn test_render_table_pads_columns() {
        let logs = sample();
        let table = render_table(&logs);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with(&format!("날짜{}", " ".repeat(10))));
        assert!(lines[1].contains("170허8468"));
    }
}
