//! Export of synchronized results.
//!
//! Consumes the orchestrator's terminal outputs: the per-source parameters
//! always land in `SYNC.csv` (plus a `SYNC.json` snapshot), and callers can
//! request named column-subset tables or a `TOTAL.csv` outer join over all
//! synchronized sources. The table names `SYNC` and `TOTAL` are reserved and
//! rejected before any file is written.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::errors::{SyncError, SyncResult};
use crate::frame::Frame;
use crate::sync::Synchronizer;

/// Reserved name of the parameter table.
pub const SYNC_TABLE: &str = "SYNC";
/// Reserved name of the full outer-join table.
pub const TOTAL_TABLE: &str = "TOTAL";

/// Table name -> source name -> columns to pull from that source.
///
/// Each root key becomes one CSV file containing the selected columns of the
/// synchronized sources, e.g. one file per sensor type across devices.
pub type TableSpec = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Export synchronized data to a directory.
///
/// Always writes the parameter table. When `tables` is given, one CSV per
/// root key is written with columns named `{source}_{column}`. With
/// `save_total_table`, an outer join over every synchronized source lands in
/// `TOTAL.csv`.
pub fn save_data(
    synchronizer: &mut Synchronizer,
    target_dir: &Path,
    tables: Option<&TableSpec>,
    save_total_table: bool,
) -> SyncResult<()> {
    if let Some(tables) = tables {
        if tables.contains_key(SYNC_TABLE) {
            return Err(SyncError::Configuration(format!(
                "{SYNC_TABLE} must not be one of the table names, \
                 it is reserved for the synchronization parameters"
            )));
        }
        if save_total_table && tables.contains_key(TOTAL_TABLE) {
            return Err(SyncError::Configuration(format!(
                "{TOTAL_TABLE} must not be one of the table names \
                 if the table with all data should be saved"
            )));
        }
    }

    let params = synchronizer.sync_params(false)?;
    let synced = synchronizer.synced_data(false)?;

    write_sync_table(&params, target_dir)?;

    if let Some(tables) = tables {
        for (table_name, spec) in tables {
            if spec.is_empty() {
                tracing::warn!(table = table_name.as_str(), "table spec requests no columns, skipping");
                continue;
            }

            let mut selected = Vec::new();
            for (source_name, columns) in spec {
                let data = synced.get(source_name).ok_or_else(|| {
                    SyncError::Configuration(format!(
                        "table '{table_name}' requests non-existing source '{source_name}'"
                    ))
                })?;
                for column in columns {
                    if !data.has_column(column) {
                        return Err(SyncError::Configuration(format!(
                            "table '{table_name}' requests non-existing {source_name}->{column}"
                        )));
                    }
                    selected.push(
                        data.series(column)?
                            .renamed(format!("{source_name}_{column}")),
                    );
                }
            }

            let frame = Frame::from_series(&selected)?;
            write_frame_csv(&frame, &target_dir.join(format!("{table_name}.csv")))?;
            tracing::info!(
                table = table_name.as_str(),
                columns = frame.num_columns(),
                "exported column-subset table"
            );
        }
    }

    if save_total_table {
        let mut selected = Vec::new();
        for (source_name, data) in &synced {
            for column in data.column_names().map(str::to_string).collect::<Vec<_>>() {
                selected.push(
                    data.series(&column)?
                        .renamed(format!("{source_name}_{column}")),
                );
            }
        }
        let total = Frame::from_series(&selected)?;
        write_frame_csv(&total, &target_dir.join(format!("{TOTAL_TABLE}.csv")))?;
        tracing::info!(columns = total.num_columns(), "exported total table");
    }

    Ok(())
}

/// Write the synchronization parameters as `SYNC.csv` and `SYNC.json`.
///
/// The CSV holds one column per source with `stretch_factor` and
/// `timeshift_ns` rows; the JSON snapshot carries the same values for
/// programmatic consumers.
pub fn write_sync_table(
    params: &BTreeMap<String, crate::types::SyncParams>,
    target_dir: &Path,
) -> SyncResult<()> {
    let mut csv = String::from("param");
    for name in params.keys() {
        csv.push(',');
        csv.push_str(name);
    }
    csv.push('\n');

    csv.push_str("stretch_factor");
    for p in params.values() {
        csv.push_str(&format!(",{}", p.stretch_factor));
    }
    csv.push('\n');

    csv.push_str("timeshift_ns");
    for p in params.values() {
        match p.timeshift.and_then(|d| d.num_nanoseconds()) {
            Some(ns) => csv.push_str(&format!(",{ns}")),
            None => csv.push(','),
        }
    }
    csv.push('\n');

    fs::write(target_dir.join(format!("{SYNC_TABLE}.csv")), csv)?;

    let json = serde_json::to_string_pretty(params)
        .map_err(|e| SyncError::Configuration(format!("cannot serialize sync params: {e}")))?;
    fs::write(target_dir.join(format!("{SYNC_TABLE}.json")), json)?;
    Ok(())
}

/// Write a frame as CSV with RFC 3339 timestamps; NaN becomes an empty cell.
/// Rows with no valid value at all are dropped.
fn write_frame_csv(frame: &Frame, path: &Path) -> SyncResult<()> {
    let mut out = String::from("timestamp");
    let names: Vec<&str> = frame.column_names().collect();
    for name in &names {
        out.push(',');
        out.push_str(name);
    }
    out.push('\n');

    let columns: Vec<&[f64]> = names
        .iter()
        .map(|name| frame.values(name))
        .collect::<SyncResult<_>>()?;

    for (row, ts) in frame.index().iter().enumerate() {
        if columns.iter().all(|values| values[row].is_nan()) {
            continue;
        }
        out.push_str(&ts.to_rfc3339());
        for values in &columns {
            out.push(',');
            if !values[row].is_nan() {
                out.push_str(&format!("{}", values[row]));
            }
        }
        out.push('\n');
    }

    fs::write(path, out)?;
    Ok(())
}
