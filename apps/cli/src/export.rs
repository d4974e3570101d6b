//! CSV export of scout results.
//!
//! Files are UTF-8 with a byte-order mark so spreadsheet tools pick up the
//! encoding. Absent values are written as empty cells.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use color_eyre::eyre::{Result, WrapErr};

use asinscout_core::pipeline::ScoutReport;
use asinscout_shared::{Asin, ProductSnapshot, ScoredSnapshot};

const BOM: &[u8] = b"\xEF\xBB\xBF";

const COLUMNS: [&str; 6] = ["asin", "title", "price", "rating", "reviews", "url"];

/// `asin_competitors_{SEED}_{YYYYMMDD}`
pub(crate) fn file_stem(seed: &Asin, date: NaiveDate) -> String {
    format!("asin_competitors_{seed}_{}", date.format("%Y%m%d"))
}

/// Write the full snapshot list and, when `filtered` is set, the kept list.
/// Returns the paths written.
pub(crate) fn write_report(
    dir: &Path,
    report: &ScoutReport,
    filtered: bool,
    date: NaiveDate,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .wrap_err_with(|| format!("cannot create output directory {}", dir.display()))?;

    let stem = file_stem(&report.seed, date);
    let mut written = Vec::new();

    let all_path = dir.join(format!("{stem}.csv"));
    write_snapshots(&all_path, &report.snapshots)?;
    written.push(all_path);

    if filtered {
        let kept_path = dir.join(format!("{stem}_filtered.csv"));
        write_scored(&kept_path, &report.kept)?;
        written.push(kept_path);
    }

    Ok(written)
}

fn row(s: &ProductSnapshot) -> [String; 6] {
    [
        s.asin.to_string(),
        s.title.clone().unwrap_or_default(),
        s.price.map(|p| p.to_string()).unwrap_or_default(),
        s.rating.map(|r| r.to_string()).unwrap_or_default(),
        s.reviews.map(|r| r.to_string()).unwrap_or_default(),
        s.url.clone(),
    ]
}

fn open_with_bom(path: &Path) -> Result<csv::Writer<File>> {
    let mut file =
        File::create(path).wrap_err_with(|| format!("cannot create {}", path.display()))?;
    file.write_all(BOM)?;
    Ok(csv::Writer::from_writer(file))
}

fn write_snapshots(path: &Path, snapshots: &[ProductSnapshot]) -> Result<()> {
    let mut writer = open_with_bom(path)?;
    writer.write_record(COLUMNS)?;
    for snapshot in snapshots {
        writer.write_record(row(snapshot))?;
    }
    writer.flush()?;
    Ok(())
}

fn write_scored(path: &Path, scored: &[ScoredSnapshot]) -> Result<()> {
    let mut writer = open_with_bom(path)?;
    writer.write_record(COLUMNS.iter().copied().chain(["relevanceScore"]))?;
    for item in scored {
        let [asin, title, price, rating, reviews, url] = row(&item.snapshot);
        writer.write_record([asin, title, price, rating, reviews, url, item.score.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}
