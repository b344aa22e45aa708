use anyhow::{anyhow, Context};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::fs::File;
use std::io::Cursor;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) if n.fract() == 0.0 => format!("{n:.0}"),
            Cell::Number(n) => n.to_string(),
        }
    }

    /// Numeric value of the cell; blank cells are `Ok(None)`.
    pub fn number(&self) -> Result<Option<f64>, String> {
        match self {
            Cell::Empty => Ok(None),
            Cell::Number(n) => Ok(Some(*n)),
            Cell::Text(s) if s.trim().is_empty() => Ok(None),
            Cell::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| format!("not a number: {s:?}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    pub header: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Csv,
    Workbook,
}

pub fn format_for(path: &Path) -> Option<Format> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "csv" => Some(Format::Csv),
        "xlsx" | "xls" | "ods" => Some(Format::Workbook),
        _ => None,
    }
}

fn data_cell(d: &Data) -> Cell {
    match d {
        Data::Empty => Cell::Empty,
        Data::String(s) if s.trim().is_empty() => Cell::Empty,
        Data::String(s) => Cell::Text(s.trim().to_string()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        other => Cell::Text(other.to_string()),
    }
}

fn parse_csv(bytes: &[u8]) -> anyhow::Result<Sheet> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);
    let header = reader
        .headers()
        .context("failed to read csv header")?
        .iter()
        .map(str::to_string)
        .collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.context("failed to read csv row")?;
        rows.push(
            record
                .iter()
                .map(|v| {
                    if v.is_empty() {
                        Cell::Empty
                    } else {
                        Cell::Text(v.to_string())
                    }
                })
                .collect(),
        );
    }
    Ok(Sheet { header, rows })
}

fn parse_workbook(bytes: Vec<u8>) -> anyhow::Result<Sheet> {
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes)).context("failed to open workbook")?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("workbook has no sheets"))?
        .context("failed to read first sheet")?;
    let mut rows = range.rows();
    let header = rows
        .next()
        .map(|r| r.iter().map(|c| data_cell(c).text()).collect())
        .unwrap_or_default();
    Ok(Sheet {
        header,
        rows: rows.map(|r| r.iter().map(data_cell).collect()).collect(),
    })
}

/// Reads the first sheet of a csv or workbook file. Returns the raw bytes too
/// so callers can fingerprint what was read.
pub fn read_sheet(path: &Path) -> anyhow::Result<(Vec<u8>, Sheet)> {
    let format = format_for(path)
        .ok_or_else(|| anyhow!("unsupported file type: {}", path.to_string_lossy()))?;
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
    let sheet = match format {
        Format::Csv => parse_csv(&bytes)?,
        Format::Workbook => parse_workbook(bytes.clone())?,
    };
    Ok((bytes, sheet))
}

fn write_csv(path: &Path, sheet: &Sheet) -> anyhow::Result<()> {
    let mut w = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.to_string_lossy()))?;
    w.write_record(&sheet.header)?;
    for row in &sheet.rows {
        w.write_record(row.iter().map(Cell::text))?;
    }
    w.flush()?;
    Ok(())
}

fn write_xlsx(path: &Path, sheet: &Sheet) -> anyhow::Result<()> {
    let mut book = umya_spreadsheet::new_file();
    let ws = book
        .get_sheet_mut(&0)
        .ok_or_else(|| anyhow!("new workbook has no sheet"))?;
    ws.set_name("Marks");

    for (col, h) in sheet.header.iter().enumerate() {
        let c = ws.get_cell_mut(((col as u32) + 1, 1));
        c.set_value_string(h.as_str());
        c.get_style_mut().get_font_mut().set_bold(true);
    }
    for (r, row) in sheet.rows.iter().enumerate() {
        let row_num = (r as u32) + 2;
        for (col, cell) in row.iter().enumerate() {
            let at = ((col as u32) + 1, row_num);
            match cell {
                Cell::Empty => {}
                Cell::Number(n) => {
                    ws.get_cell_mut(at).set_value_number(*n);
                }
                // Text stays text: roll numbers like "01" must not turn into 1.
                Cell::Text(t) => {
                    ws.get_cell_mut(at).set_value_string(t.as_str());
                }
            }
        }
    }

    let mut out = File::create(path)
        .with_context(|| format!("failed to create {}", path.to_string_lossy()))?;
    umya_spreadsheet::writer::xlsx::write_writer(&book, &mut out)
        .map_err(|e| anyhow!("failed to write workbook {}: {e}", path.to_string_lossy()))?;
    Ok(())
}

/// Writes `.csv` or `.xlsx` depending on the extension.
pub fn write_sheet(path: &Path, sheet: &Sheet) -> anyhow::Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => write_csv(path, sheet),
        "xlsx" => write_xlsx(path, sheet),
        _ => Err(anyhow!(
            "export supports .csv and .xlsx, got {}",
            path.to_string_lossy()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("outcomesd-sheet-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("temp dir");
        dir.join(name)
    }

    fn sample() -> Sheet {
        Sheet {
            header: vec!["Roll No".into(), "Name".into(), "Q1".into(), "Total".into()],
            rows: vec![
                vec![
                    Cell::Text("01".into()),
                    Cell::Text("Ada & Co".into()),
                    Cell::Number(7.5),
                    Cell::Number(7.5),
                ],
                vec![Cell::Text("02".into()), Cell::Text("Grace".into()), Cell::Empty, Cell::Empty],
            ],
        }
    }

    #[test]
    fn csv_cells_come_back_as_text() {
        let path = temp_path("marks.csv");
        write_sheet(&path, &sample()).expect("write");
        let (bytes, sheet) = read_sheet(&path).expect("read");
        assert!(!bytes.is_empty());
        assert_eq!(sheet.header, sample().header);
        assert_eq!(sheet.rows[0][2].number(), Ok(Some(7.5)));
        assert_eq!(sheet.rows[1][2], Cell::Empty);
    }

    #[test]
    fn xlsx_is_readable_by_the_workbook_reader() {
        let path = temp_path("marks.xlsx");
        write_sheet(&path, &sample()).expect("write");
        let (_, sheet) = read_sheet(&path).expect("read");
        assert_eq!(sheet.header[0], "Roll No");
        assert_eq!(sheet.rows[0][1].text(), "Ada & Co");
        assert_eq!(sheet.rows[0][2].number(), Ok(Some(7.5)));
    }

    #[test]
    fn xlsx_text_cells_keep_leading_zeros() {
        let path = temp_path("rolls.xlsx");
        write_sheet(&path, &sample()).expect("write");
        let (_, sheet) = read_sheet(&path).expect("read");
        assert_eq!(sheet.rows[0][0], Cell::Text("01".into()));
        assert_eq!(sheet.rows[1][0].text(), "02");
        assert_eq!(sheet.rows[1][2], Cell::Empty);
    }

    #[test]
    fn rejects_unknown_extensions() {
        assert!(read_sheet(Path::new("/tmp/marks.txt")).is_err());
        assert!(write_sheet(Path::new("/tmp/marks.ods"), &sample()).is_err());
    }
}
