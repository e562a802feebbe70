use serde::Serialize;

/// Tabular-import TSV header, verbatim from spec.md §4.8/§6. `{table}` is
/// substituted with `Config.terra_run_table_name`.
const TERRA_TSV_HEADER_TEMPLATE: &str =
    "entity:{table}_id\tbiosample_attributes\tflowcell_tar\tsamplesheets\tsample_rename_map_tsv";

/// Provenance JSON published alongside the final archive (spec.md §4.8).
/// Field names match the spec's enumerated list exactly.
#[derive(Debug, Clone, Serialize)]
pub struct ProvenanceRecord {
    pub run_basename: String,
    pub run_path: String,
    pub destination: String,
    pub started_at: String,
    pub finished_at: String,
    pub duration_secs: u64,
    pub increment_count: u64,
    pub total_source_bytes: u64,
    pub cron_invoked: bool,
    pub host: String,
    pub user: String,
    pub ip: String,
    pub os: String,
    pub arch: String,
    pub tool_version: String,
    pub configured_knobs: serde_json::Value,
    pub exclusion_list: Vec<String>,
}

pub fn provenance_json(record: &ProvenanceRecord) -> crate::Result<String> {
    Ok(serde_json::to_string_pretty(record)?)
}

/// Short operator-facing explanation of how to extract the final archive.
pub fn readme_text(run_id: &str) -> String {
    format!(
        "{run_id}.tar.gz is a standard gzip-compressed tar archive.\n\n\
         Extract it with:\n\n    tar xzf {run_id}.tar.gz\n\n\
         The archive was produced by concatenating incrementally emitted\n\
         chunks server-side; any tar implementation that accepts\n\
         multi-member gzip input will extract it like any other\n\
         gzipped tar file.\n"
    )
}

/// Builds the two-line tabular-import TSV: header plus one data row with
/// the run id and final tar URI in their columns, LF line endings only
/// (spec.md §4.8, §6).
pub fn terra_tsv(table_name: &str, run_id: &str, final_tar_uri: &str) -> String {
    let header = TERRA_TSV_HEADER_TEMPLATE.replace("{table}", table_name);
    format!("{header}\n{run_id}\t\t{final_tar_uri}\t\t\n")
}
