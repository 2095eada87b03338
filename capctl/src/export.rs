//! CSV and XLSX rendering of enrollment exports.
//!
//! Both formats share the same fixed column set. An export with no rows is answered with a
//! plain-text message instead of a header-only file.

use axum::{
    body::Body,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{NaiveDate, Utc};
use rust_xlsxwriter::{Format, Workbook};

use crate::{db::models::enrollments::EnrollmentExportRow, errors::Error};

pub const EMPTY_EXPORT_MESSAGE: &str = "No enrollments found for the selected filters.";

/// Header text and spreadsheet width of each exported column
const COLUMNS: [(&str, f64); 10] = [
    ("Participant", 28.0),
    ("Email", 32.0),
    ("Phone", 16.0),
    ("Dealer", 24.0),
    ("Course", 30.0),
    ("Group", 20.0),
    ("Group date", 12.0),
    ("Attendance", 12.0),
    ("Notes", 40.0),
    ("Enrolled at", 18.0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Xlsx,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        }
    }
}

/// `inscripciones-YYYYMMDD.<ext>`
pub fn export_filename(format: ExportFormat, date: NaiveDate) -> String {
    format!("inscripciones-{}.{}", date.format("%Y%m%d"), format.extension())
}

/// Prefix cells that a spreadsheet would evaluate as a formula with `'`
fn neutralize_formula(value: &str) -> String {
    match value.chars().next() {
        Some('=' | '+' | '-' | '@' | '\t' | '\r') => format!("'{value}"),
        _ => value.to_string(),
    }
}

fn row_values(row: &EnrollmentExportRow) -> [String; 10] {
    let text = neutralize_formula;
    let optional = |value: &Option<String>| value.as_deref().map(neutralize_formula).unwrap_or_default();

    [
        text(&row.participant_name),
        text(&row.participant_email),
        optional(&row.phone),
        text(&row.dealer_name),
        text(&row.course_name),
        optional(&row.group_name),
        row.group_date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default(),
        row.attendance.label().to_string(),
        optional(&row.notes),
        row.created_at.format("%Y-%m-%d %H:%M").to_string(),
    ]
}

pub fn write_csv(rows: &[EnrollmentExportRow]) -> Result<Vec<u8>, Error> {
    let csv_error = |e: csv::Error| Error::Internal {
        operation: format!("write CSV export: {e}"),
    };

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(COLUMNS.iter().map(|(name, _)| *name)).map_err(csv_error)?;
    for row in rows {
        writer.write_record(row_values(row)).map_err(csv_error)?;
    }

    writer.into_inner().map_err(|e| Error::Internal {
        operation: format!("flush CSV export: {e}"),
    })
}

pub fn write_xlsx(rows: &[EnrollmentExportRow]) -> Result<Vec<u8>, Error> {
    let xlsx_error = |e: rust_xlsxwriter::XlsxError| Error::Internal {
        operation: format!("write XLSX export: {e}"),
    };

    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Inscripciones").map_err(xlsx_error)?;

    for (col, (name, width)) in COLUMNS.iter().enumerate() {
        let col = col as u16;
        worksheet
            .write_string_with_format(0, col, *name, &header_format)
            .map_err(xlsx_error)?;
        worksheet.set_column_width(col, *width).map_err(xlsx_error)?;
    }
    worksheet.set_freeze_panes(1, 0).map_err(xlsx_error)?;

    for (index, row) in rows.iter().enumerate() {
        let row_num = index as u32 + 1;
        for (col, value) in row_values(row).iter().enumerate() {
            worksheet.write_string(row_num, col as u16, value).map_err(xlsx_error)?;
        }
    }

    workbook.save_to_buffer().map_err(xlsx_error)
}

/// Build the HTTP response for an export, dated today
pub fn export_response(format: ExportFormat, rows: &[EnrollmentExportRow]) -> Result<Response, Error> {
    if rows.is_empty() {
        return Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            EMPTY_EXPORT_MESSAGE,
        )
            .into_response());
    }

    let bytes = match format {
        ExportFormat::Csv => write_csv(rows)?,
        ExportFormat::Xlsx => write_xlsx(rows)?,
    };
    let disposition = format!(
        "attachment; filename=\"{}\"",
        export_filename(format, Utc::now().date_naive())
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from(bytes),
    )
        .into_response())
}
