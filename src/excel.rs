use anyhow::Result;
use calamine::{Data, Reader, Xlsx};
use rust_xlsxwriter::Workbook;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;

use crate::db::NewJob;
use crate::models::{JobStatus, PostingMode};

/// Recognized columns of a bulk-upload workbook. Matched by name,
/// case-insensitively; order is irrelevant and extra columns are ignored.
pub const BULK_JOB_HEADERS: [&str; 9] = [
    "Title",
    "Company",
    "Location",
    "Salary",
    "Type",
    "Job Type",
    "External Link",
    "Description",
    "Skills",
];

const TEMPLATE_COLUMN_WIDTHS: [f64; 9] = [22.0, 12.0, 12.0, 12.0, 10.0, 10.0, 28.0, 40.0, 25.0];

/// One data row of a bulk-upload sheet, trimmed, with defaults applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobRow {
    pub title: String,
    pub company: String,
    pub location: String,
    pub salary: String,
    /// "Type" column; defaults to "Full-time" when blank.
    pub employment_type: String,
    /// "Job Type" column, raw; defaults to "internal" when blank.
    pub job_type: String,
    pub external_link: String,
    pub description: String,
    /// Comma-separated skill list, raw.
    pub skills: String,
}

#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub rows: Vec<JobRow>,
    /// All failure is reported here; parsing never panics or errors out.
    pub errors: Vec<String>,
}

impl ParseOutcome {
    fn failed(message: String) -> Self {
        Self {
            rows: Vec::new(),
            errors: vec![message],
        }
    }
}

/// Parse an .xlsx workbook into validated job rows. The first sheet is
/// read as a grid whose first row is the header; "Title" and "Company"
/// are required columns. Rows with both of those cells blank are skipped
/// as trailing filler.
pub fn parse_job_workbook(bytes: &[u8]) -> ParseOutcome {
    let mut workbook = match Xlsx::new(Cursor::new(bytes)) {
        Ok(wb) => wb,
        Err(e) => return ParseOutcome::failed(format!("Could not read file: {e}")),
    };
    let names = workbook.sheet_names();
    let Some(first_sheet) = names.first().cloned() else {
        return ParseOutcome::failed("No sheet found.".to_string());
    };
    let range = match workbook.worksheet_range(&first_sheet) {
        Ok(range) => range,
        Err(e) => return ParseOutcome::failed(format!("Could not read sheet: {e}")),
    };

    let mut grid = range.rows();
    let Some(header_row) = grid.next() else {
        return ParseOutcome::failed("Sheet must have 'Title' and 'Company' columns.".to_string());
    };
    let headers: Vec<String> = header_row.iter().map(cell_text).collect();
    let col = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    if col("Title").is_none() || col("Company").is_none() {
        return ParseOutcome::failed("Sheet must have 'Title' and 'Company' columns.".to_string());
    }
    let get = |row: &[Data], name: &str| -> String {
        col(name)
            .and_then(|i| row.get(i))
            .map(cell_text)
            .unwrap_or_default()
    };

    let mut rows = Vec::new();
    for row in grid {
        let title = get(row, "Title");
        let company = get(row, "Company");
        if title.is_empty() && company.is_empty() {
            continue;
        }
        rows.push(JobRow {
            title,
            company,
            location: get(row, "Location"),
            salary: get(row, "Salary"),
            employment_type: or_default(get(row, "Type"), "Full-time"),
            job_type: or_default(get(row, "Job Type"), "internal"),
            external_link: get(row, "External Link"),
            description: get(row, "Description"),
            skills: get(row, "Skills"),
        });
    }

    let mut errors = Vec::new();
    if rows.is_empty() {
        errors.push("No valid job rows found.".to_string());
    }
    ParseOutcome { rows, errors }
}

/// Index every row that shares a case-insensitive (title, company) key
/// with at least one other row — including the first occurrence, which is
/// flagged retroactively when its repeat shows up. Rows whose key is
/// effectively empty are never flagged.
pub fn find_duplicate_rows(rows: &[JobRow]) -> HashSet<usize> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut duplicates = HashSet::new();
    for (i, row) in rows.iter().enumerate() {
        let key = format!(
            "{}|{}",
            row.title.to_lowercase(),
            row.company.to_lowercase()
        );
        if key.strip_suffix('|').unwrap_or(&key).is_empty() {
            continue;
        }
        match seen.get(&key) {
            Some(&first) => {
                duplicates.insert(first);
                duplicates.insert(i);
            }
            None => {
                seen.insert(key, i);
            }
        }
    }
    duplicates
}

/// Produce the downloadable upload template: the header row plus two
/// example rows. Pure formatting.
pub fn generate_template() -> Result<Vec<u8>> {
    let example_rows: [[&str; 9]; 2] = [
        [
            "Senior React Developer",
            "TechCorp",
            "Bangalore",
            "₹18-25 LPA",
            "Full-time",
            "internal",
            "",
            "We are looking for a Senior React Developer...",
            "React, TypeScript, Node.js",
        ],
        [
            "Product Designer",
            "DesignLab",
            "Mumbai",
            "₹12-18 LPA",
            "Remote",
            "external",
            "https://example.com/apply",
            "Join our design team.",
            "Figma, UI/UX",
        ],
    ];

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Jobs")?;
    for (c, header) in BULK_JOB_HEADERS.iter().enumerate() {
        worksheet.write_string(0, c as u16, *header)?;
        worksheet.set_column_width(c as u16, TEMPLATE_COLUMN_WIDTHS[c])?;
    }
    for (r, row) in example_rows.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            worksheet.write_string(r as u32 + 1, c as u16, *cell)?;
        }
    }
    Ok(workbook.save_to_buffer()?)
}

impl JobRow {
    /// Convert a parsed row into a posting payload attributed to the
    /// uploading employer, so bulk publish flows through the same
    /// validated create path as single postings.
    pub fn into_new_job(self, employer_id: &str, employer_name: &str) -> NewJob {
        let external = self.job_type.trim().eq_ignore_ascii_case("external");
        let external_link = Some(self.external_link)
            .filter(|link| external && !link.trim().is_empty());
        NewJob {
            title: self.title,
            company: self.company,
            company_logo: None,
            location: self.location,
            salary: self.salary,
            employment_type: self.employment_type,
            description: self.description,
            requirements: self
                .skills
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            employer_id: employer_id.to_string(),
            employer_name: employer_name.to_string(),
            status: JobStatus::Active,
            posting_mode: if external {
                PostingMode::External
            } else {
                PostingMode::Internal
            },
            external_link,
            form_schema: None,
        }
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        other => other.to_string().trim().to_string(),
    }
}

fn or_default(value: String, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value
    }
}
