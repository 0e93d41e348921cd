use anyhow::{Context, Result};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::{
    fs::{self, File},
    io::{Cursor, Read},
    path::{Path, PathBuf},
};
use tracing::{info, warn};
use zip::ZipArchive;

/// Raw CSV name derived from an archive member stem.
pub fn raw_csv_name(stem: &str) -> String {
    format!("sales_data_{}.csv", stem)
}

fn is_spreadsheet(name: &str) -> bool {
    let lower = name.to_lowercase();
    [".xlsx", ".xls", ".xlsb", ".ods"]
        .iter()
        .any(|ext| lower.ends_with(ext))
}

/// Convert every spreadsheet member of `zip_path` into a CSV under `out_dir`.
///
/// Members whose CSV already exists are skipped, so reruns only convert what
/// is missing. A member that fails to convert is logged and skipped; the rest
/// of the archive still goes through. Returns the CSV paths for all
/// spreadsheet members, produced or pre-existing.
pub fn convert_archive(zip_path: &Path, out_dir: &Path) -> Result<Vec<PathBuf>> {
    let file = File::open(zip_path)
        .with_context(|| format!("opening archive `{}`", zip_path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("reading archive `{}`", zip_path.display()))?;
    fs::create_dir_all(out_dir)?;

    let mut csv_paths = Vec::new();
    for i in 0..archive.len() {
        let mut entry = match archive.by_index(i) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(index = i, error = %err, "unreadable member; skipping");
                continue;
            }
        };
        let name = entry.name().to_string();
        if !entry.is_file() || !is_spreadsheet(&name) {
            continue;
        }

        let stem = Path::new(&name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| name.clone());
        let csv_path = out_dir.join(raw_csv_name(&stem));

        if csv_path.exists() {
            info!(member = %name, csv = %csv_path.display(), "already converted");
            csv_paths.push(csv_path);
            continue;
        }

        // Zip entries only implement Read; calamine needs Seek, so buffer the
        // member into memory first.
        let mut buf = Vec::with_capacity(entry.size() as usize);
        if let Err(err) = entry.read_to_end(&mut buf) {
            warn!(member = %name, error = %err, "failed to read member; skipping");
            continue;
        }

        match workbook_to_csv(&buf, &csv_path) {
            Ok(rows) => {
                info!(member = %name, rows, csv = %csv_path.display(), "converted");
                csv_paths.push(csv_path);
            }
            Err(err) => {
                warn!(member = %name, "conversion failed; skipping: {:#}", err);
            }
        }
    }

    Ok(csv_paths)
}

/// Render the first worksheet of an in-memory workbook as CSV. Writes through
/// a temp file so an interrupted conversion never leaves a half-written CSV
/// that later runs would treat as done.
fn workbook_to_csv(data: &[u8], csv_path: &Path) -> Result<u64> {
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(data)).context("opening workbook")?;
    let sheet_names = workbook.sheet_names().to_vec();
    let first = sheet_names
        .first()
        .context("workbook has no sheets")?
        .clone();
    let range = workbook
        .worksheet_range(&first)
        .with_context(|| format!("reading sheet `{}`", first))?;

    let tmp_path = csv_path.with_extension("csv.tmp");
    let mut writer = csv::Writer::from_path(&tmp_path)
        .with_context(|| format!("creating `{}`", tmp_path.display()))?;
    let mut rows = 0u64;
    for row in range.rows() {
        writer.write_record(row.iter().map(cell_to_string))?;
        rows += 1;
    }
    writer.flush()?;
    drop(writer);
    fs::rename(&tmp_path, csv_path)
        .with_context(|| format!("renaming `{}`", tmp_path.display()))?;

    // header row is not data
    Ok(rows.saturating_sub(1))
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        // Integral floats (identifiers, quantities) lose the spurious ".0".
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|naive| naive.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| dt.as_f64().to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::{ExtendedFileOptions, FileOptions};
    use zip::CompressionMethod;

    fn write_zip(path: &Path, members: &[(&str, &[u8])]) -> Result<()> {
        let mut zip = zip::ZipWriter::new(File::create(path)?);
        for (name, bytes) in members {
            let options = FileOptions::<ExtendedFileOptions>::default()
                .compression_method(CompressionMethod::Stored);
            zip.start_file(*name, options)?;
            zip.write_all(bytes)?;
        }
        zip.finish()?;
        Ok(())
    }

    /// Hand-built minimal xlsx: one sheet, inline strings and plain numbers.
    fn sample_xlsx() -> Result<Vec<u8>> {
        const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
</Types>"#;
        const RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#;
        const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets><sheet name="Online Retail" sheetId="1" r:id="rId1"/></sheets>
</workbook>"#;
        const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
</Relationships>"#;
        const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<sheetData>
<row r="1"><c r="A1" t="inlineStr"><is><t>InvoiceNo</t></is></c><c r="B1" t="inlineStr"><is><t>Quantity</t></is></c></row>
<row r="2"><c r="A2" t="inlineStr"><is><t>536365</t></is></c><c r="B2"><v>6</v></c></row>
<row r="3"><c r="A3" t="inlineStr"><is><t>C536379</t></is></c><c r="B3"><v>-2</v></c></row>
</sheetData>
</worksheet>"#;

        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            for (name, body) in [
                ("[Content_Types].xml", CONTENT_TYPES),
                ("_rels/.rels", RELS),
                ("xl/workbook.xml", WORKBOOK),
                ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
                ("xl/worksheets/sheet1.xml", SHEET),
            ] {
                let options = FileOptions::<ExtendedFileOptions>::default()
                    .compression_method(CompressionMethod::Stored);
                zip.start_file(name, options)?;
                zip.write_all(body.as_bytes())?;
            }
            zip.finish()?;
        }
        Ok(buf)
    }

    #[test]
    fn converts_spreadsheet_members() -> Result<()> {
        let dir = tempdir()?;
        let zip_path = dir.path().join("online+retail.zip");
        let xlsx = sample_xlsx()?;
        write_zip(&zip_path, &[("Online Retail.xlsx", xlsx.as_slice())])?;

        let produced = convert_archive(&zip_path, dir.path())?;
        assert_eq!(
            produced,
            vec![dir.path().join("sales_data_Online Retail.csv")]
        );

        let body = fs::read_to_string(&produced[0])?;
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines[0], "InvoiceNo,Quantity");
        assert_eq!(lines[1], "536365,6");
        assert_eq!(lines[2], "C536379,-2");
        Ok(())
    }

    #[test]
    fn corrupt_member_is_logged_and_skipped() -> Result<()> {
        let dir = tempdir()?;
        let zip_path = dir.path().join("archive.zip");
        write_zip(&zip_path, &[("broken.xlsx", b"this is not a workbook")])?;

        let produced = convert_archive(&zip_path, dir.path())?;
        assert!(produced.is_empty());
        assert!(!dir.path().join("sales_data_broken.csv").exists());
        Ok(())
    }

    #[test]
    fn existing_csv_is_not_reconverted() -> Result<()> {
        let dir = tempdir()?;
        let zip_path = dir.path().join("archive.zip");
        // The member is junk; the pre-existing CSV must short-circuit before
        // conversion is even attempted.
        write_zip(&zip_path, &[("Online Retail.xlsx", b"junk")])?;
        let csv_path = dir.path().join("sales_data_Online Retail.csv");
        fs::write(&csv_path, "sentinel")?;

        let produced = convert_archive(&zip_path, dir.path())?;
        assert_eq!(produced, vec![csv_path.clone()]);
        assert_eq!(fs::read_to_string(&csv_path)?, "sentinel");
        Ok(())
    }

    #[test]
    fn non_spreadsheet_members_are_ignored() -> Result<()> {
        let dir = tempdir()?;
        let zip_path = dir.path().join("archive.zip");
        write_zip(&zip_path, &[("readme.txt", b"hello")])?;

        let produced = convert_archive(&zip_path, dir.path())?;
        assert!(produced.is_empty());
        Ok(())
    }

    #[test]
    fn integral_floats_render_without_fraction() {
        assert_eq!(cell_to_string(&Data::Float(17850.0)), "17850");
        assert_eq!(cell_to_string(&Data::Float(2.55)), "2.55");
        assert_eq!(cell_to_string(&Data::Empty), "");
        assert_eq!(cell_to_string(&Data::String("WHITE HEART".into())), "WHITE HEART");
    }
}
