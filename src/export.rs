use anyhow::{Context, Result};

/// A flat record that can be laid out as one table row.
pub trait TableRow {
    fn to_record(&self) -> Vec<String>;
}

/// Titled table handed to an exporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn new<R: TableRow>(title: &str, headers: &[&str], rows: &[R]) -> Self {
        Self {
            title: title.to_string(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows.iter().map(TableRow::to_record).collect(),
        }
    }
}

/// An exported blob with its suggested file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

pub trait TabularExport: Send + Sync {
    fn export(&self, sheet: &Sheet) -> Result<ExportedFile>;
}

/// UTF-8 CSV with a BOM so spreadsheet apps pick the right encoding.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvExport;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

impl TabularExport for CsvExport {
    fn export(&self, sheet: &Sheet) -> Result<ExportedFile> {
        let mut writer = csv::Writer::from_writer(UTF8_BOM.to_vec());

        writer
            .write_record(&sheet.headers)
            .context("Failed to write CSV header")?;
        for row in &sheet.rows {
            writer.write_record(row).context("Failed to write CSV row")?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush CSV: {}", e))?;

        Ok(ExportedFile {
            file_name: format!("{}.csv", sanitize_file_name(&sheet.title)),
            bytes,
        })
    }
}

fn sanitize_file_name(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "report".to_string()
    } else {
        trimmed.to_string()
    }
}
