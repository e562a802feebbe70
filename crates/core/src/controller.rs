use std::path::Path;
use std::time::{Duration, Instant, SystemTime};

use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::config::Config;
use crate::host_info;
use crate::naming;
use crate::object_store::ObjectStore;
use crate::progress::{ProgressSink, TaskProgress};
use crate::snapshot_index::SnapshotIndex;
use crate::volume_label::{VolumeLabelFields, encode_volume_label};
use crate::{Error, Result, composer, exclusions, sidecars, tar_encoder, upload_pipeline};

const COMPLETION_SENTINEL_NAMES: &[&str] = &["RTAComplete.txt", "RTAComplete.xml"];
const POST_SYNC_QUIESCE: Duration = Duration::from_secs(10);

/// Outcome of a controller run (SPEC_FULL §4.7): distinguishes the
/// idempotent pre-check short-circuit from an actual completed upload so
/// the caller can log the two cases differently without string matching.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    AlreadyComplete,
    Done {
        chunks: u32,
        bytes_uploaded: u64,
        duration: Duration,
    },
}

/// Drives one run's full lifecycle per spec.md §4.7: pre-check,
/// staging/sideloads, poll/measure/snapshot loop, final snapshot, compose,
/// sidecars, cleanup.
pub async fn run(
    config: &Config,
    store: &dyn ObjectStore,
    source_path: &Path,
    destination_prefix: &str,
    progress: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<RunOutcome> {
    let started_at = Instant::now();
    let started_wall = chrono::Utc::now();
    let run_id = naming::run_id_from_path(source_path)?;
    let destination_prefix = destination_prefix.trim_end_matches('/');
    let final_uri = format!("{destination_prefix}/{run_id}/{run_id}.tar.gz");

    tracing::info!(event = "controller.precheck", run_id = %run_id, "checking for existing final object");
    if store.exists(&final_uri).await? {
        tracing::info!(event = "controller.already_complete", run_id = %run_id, "final object already exists");
        return Ok(RunOutcome::AlreadyComplete);
    }

    check_not_stale(source_path, config.run_completion_timeout)?;

    let staging_dir = config.staging_root.join(&run_id);
    std::fs::create_dir_all(&staging_dir)?;
    tracing::info!(event = "controller.init_staging", run_id = %run_id, staging_dir = %staging_dir.display(), "staging ready");

    let result = run_body(
        config,
        store,
        source_path,
        destination_prefix,
        &run_id,
        &final_uri,
        &staging_dir,
        progress,
        cancel,
        started_at,
        started_wall,
    )
    .await;

    match result {
        Ok(outcome) => {
            remove_dir_all_if_present(&staging_dir)?;
            tracing::info!(event = "controller.cleanup", run_id = %run_id, "staging removed after success");
            Ok(outcome)
        }
        Err(Error::Interrupted) => {
            remove_dir_all_if_present(&staging_dir)?;
            tracing::warn!(event = "controller.interrupted", run_id = %run_id, "staging removed after interruption");
            Err(Error::Interrupted)
        }
        Err(other) => {
            tracing::error!(event = "controller.aborted", run_id = %run_id, error = %other, "run aborted, staging retained");
            Err(other)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_body(
    config: &Config,
    store: &dyn ObjectStore,
    source_path: &Path,
    destination_prefix: &str,
    run_id: &str,
    final_uri: &str,
    staging_dir: &Path,
    progress: &dyn ProgressSink,
    cancel: &CancellationToken,
    started_at: Instant,
    started_wall: chrono::DateTime<chrono::Utc>,
) -> Result<RunOutcome> {
    upload_sideloads(store, source_path, destination_prefix, run_id).await?;
    progress.on_progress(TaskProgress {
        phase: "sideloads".to_string(),
        ..Default::default()
    });

    let index_path = staging_dir.join("snapshot_index.json");
    let mut index = SnapshotIndex::load(&index_path)?;
    let mut part_no = 0u32;
    let mut size_at_last_check = total_source_bytes(source_path)?;
    let mut total_uploaded_bytes = 0u64;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.delay_between_increments) => {}
            _ = cancel.cancelled() => return Err(Error::Interrupted),
        }

        fs_sync_hint();
        let current_size = total_source_bytes(source_path)?;

        if completion_sentinel_present(source_path) {
            break;
        }

        if current_size.saturating_sub(size_at_last_check) >= config.chunk_size_bytes {
            tracing::info!(event = "controller.snapshot", run_id, part_no = part_no + 1, "size threshold reached");
            let outcome = do_snapshot(
                config,
                store,
                source_path,
                staging_dir,
                &index_path,
                destination_prefix,
                run_id,
                &mut index,
                &mut part_no,
                false,
                cancel,
            )
            .await?;
            total_uploaded_bytes += outcome.bytes_written;
            size_at_last_check = current_size;
            progress.on_progress(TaskProgress {
                phase: "snapshot".to_string(),
                chunks_done: Some(part_no as u64),
                bytes_written: Some(total_uploaded_bytes),
                ..Default::default()
            });
            continue;
        }

        if started_at.elapsed() >= config.run_completion_timeout {
            return Err(Error::Timeout {
                elapsed_days: started_at.elapsed().as_secs() / 86_400,
            });
        }
    }

    tokio::select! {
        _ = tokio::time::sleep(POST_SYNC_QUIESCE) => {}
        _ = cancel.cancelled() => return Err(Error::Interrupted),
    }
    fs_sync_hint();

    tracing::info!(event = "controller.final_snapshot", run_id, "completion sentinel observed");
    let final_outcome = do_snapshot(
        config,
        store,
        source_path,
        staging_dir,
        &index_path,
        destination_prefix,
        run_id,
        &mut index,
        &mut part_no,
        true,
        cancel,
    )
    .await?;
    total_uploaded_bytes += final_outcome.bytes_written;

    if !store.exists(final_uri).await? {
        store.upload_bytes(Vec::new(), final_uri).await?;
    }

    tracing::info!(event = "controller.compose", run_id, "composing parts");
    let parts_prefix = format!("{destination_prefix}/{run_id}/parts/");
    composer::compose_all(store, final_uri, &parts_prefix, cancel).await?;
    progress.on_progress(TaskProgress {
        phase: "compose".to_string(),
        ..Default::default()
    });

    tracing::info!(event = "controller.emit_sidecars", run_id, "publishing sidecars");
    emit_sidecars(
        config,
        store,
        source_path,
        destination_prefix,
        run_id,
        final_uri,
        started_at,
        started_wall,
        part_no,
        total_source_bytes(source_path).unwrap_or(0),
    )
    .await?;

    Ok(RunOutcome::Done {
        chunks: part_no,
        bytes_uploaded: total_uploaded_bytes,
        duration: started_at.elapsed(),
    })
}

#[allow(clippy::too_many_arguments)]
async fn do_snapshot(
    config: &Config,
    store: &dyn ObjectStore,
    source_path: &Path,
    staging_dir: &Path,
    index_path: &Path,
    destination_prefix: &str,
    run_id: &str,
    index: &mut SnapshotIndex,
    part_no: &mut u32,
    is_final: bool,
    cancel: &CancellationToken,
) -> Result<tar_encoder::SnapshotOutcome> {
    let exclusion_plan =
        exclusions::plan_exclusions(source_path, &config.extra_tar_exclusions, is_final, SystemTime::now());
    let epoch = unix_now_secs();
    *part_no += 1;
    let chunk_name = naming::chunk_object_name(epoch, *part_no);
    let chunk_path = staging_dir.join(&chunk_name);

    let label_fields = VolumeLabelFields {
        r: short_run_id(run_id),
        t: epoch,
        i: *part_no,
        h: host_info::hostname(),
        u: host_info::username(),
        ip: host_info::local_ip(config.capabilities.has_ip_discovery_tool),
        c: config.cron_invoked,
    };
    let label = encode_volume_label(&label_fields);

    let outcome = tar_encoder::snapshot(
        source_path,
        index,
        &exclusion_plan,
        is_final,
        config.source_on_nfs,
        &chunk_path,
        &label,
    )
    .map_err(|e| Error::SnapshotFailed {
        message: e.to_string(),
    })?;

    let remote_uri = format!("{destination_prefix}/{run_id}/parts/{chunk_name}");
    upload_pipeline::upload_chunk_with_retry(
        store,
        &chunk_path,
        &remote_uri,
        config.retry_max_attempts,
        config.retry_delay_base,
        cancel,
    )
    .await?;

    outcome.index.persist(index_path)?;
    *index = outcome.index.clone();

    Ok(outcome)
}

async fn upload_sideloads(
    store: &dyn ObjectStore,
    source_path: &Path,
    destination_prefix: &str,
    run_id: &str,
) -> Result<()> {
    for (file_name, suffix) in [("SampleSheet.csv", "_SampleSheet.csv"), ("RunInfo.xml", "_RunInfo.xml")] {
        let local = source_path.join(file_name);
        if !local.exists() {
            continue;
        }
        let remote_uri = format!("{destination_prefix}/{run_id}/{run_id}{suffix}");
        if store.exists(&remote_uri).await? {
            continue;
        }
        store.upload(&local, &remote_uri).await?;
    }
    Ok(())
}

async fn emit_sidecars(
    config: &Config,
    store: &dyn ObjectStore,
    source_path: &Path,
    destination_prefix: &str,
    run_id: &str,
    final_uri: &str,
    started_at: Instant,
    started_wall: chrono::DateTime<chrono::Utc>,
    increment_count: u32,
    total_source_bytes: u64,
) -> Result<()> {
    let readme = sidecars::readme_text(run_id);
    store
        .upload_bytes(readme.into_bytes(), &format!("{destination_prefix}/{run_id}/{run_id}.tar.gz.README.txt"))
        .await?;

    let mut exclusion_list: Vec<String> = exclusions::STATIC_EXCLUSIONS.iter().map(|s| s.to_string()).collect();
    exclusion_list.extend(config.extra_tar_exclusions.iter().cloned());

    let record = sidecars::ProvenanceRecord {
        run_basename: run_id.to_string(),
        run_path: source_path.display().to_string(),
        destination: destination_prefix.to_string(),
        started_at: started_wall.to_rfc3339(),
        finished_at: chrono::Utc::now().to_rfc3339(),
        duration_secs: started_at.elapsed().as_secs(),
        increment_count: increment_count as u64,
        total_source_bytes,
        cron_invoked: config.cron_invoked,
        host: host_info::hostname(),
        user: host_info::username(),
        ip: host_info::local_ip(config.capabilities.has_ip_discovery_tool),
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        configured_knobs: serde_json::json!({
            "chunk_size_bytes": config.chunk_size_bytes,
            "delay_between_increments_secs": config.delay_between_increments.as_secs(),
            "run_completion_timeout_days": config.run_completion_timeout.as_secs() / 86_400,
            "retry_max_attempts": config.retry_max_attempts,
            "retry_delay_base_secs": config.retry_delay_base.as_secs(),
            "terra_run_table_name": config.terra_run_table_name,
        }),
        exclusion_list,
    };
    let provenance = sidecars::provenance_json(&record)?;
    store
        .upload_bytes(
            provenance.into_bytes(),
            &format!("{destination_prefix}/{run_id}/{run_id}.upload_metadata.json"),
        )
        .await?;

    let tsv = sidecars::terra_tsv(&config.terra_run_table_name, run_id, final_uri);
    store
        .upload_bytes(tsv.into_bytes(), &format!("{destination_prefix}/{run_id}/{run_id}.terra.tsv"))
        .await?;

    Ok(())
}

fn check_not_stale(source_path: &Path, timeout: Duration) -> Result<()> {
    let run_info = source_path.join("RunInfo.xml");
    let metadata = match std::fs::metadata(&run_info) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::Io(e)),
    };
    let modified = metadata.modified()?;
    let age = SystemTime::now().duration_since(modified).unwrap_or(Duration::ZERO);
    if age > timeout {
        return Err(Error::StaleRun {
            message: format!(
                "RunInfo.xml last modified {} days ago, exceeds RUN_COMPLETION_TIMEOUT_DAYS",
                age.as_secs() / 86_400
            ),
        });
    }
    Ok(())
}

fn completion_sentinel_present(source_path: &Path) -> bool {
    COMPLETION_SENTINEL_NAMES
        .iter()
        .any(|name| source_path.join(name).exists())
}

fn total_source_bytes(source_path: &Path) -> Result<u64> {
    let mut total = 0u64;
    let walker = WalkDir::new(source_path).follow_links(false).same_file_system(true);
    for entry in walker {
        let entry = entry.map_err(Error::Walkdir)?;
        if entry.file_type().is_file() {
            total += entry.metadata().map_err(Error::Walkdir)?.len();
        }
    }
    Ok(total)
}

fn fs_sync_hint() {
    #[cfg(unix)]
    unsafe {
        libc::sync();
    }
}

fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn short_run_id(run_id: &str) -> String {
    if run_id.len() <= 40 {
        run_id.to_string()
    } else {
        run_id[..40].to_string()
    }
}

fn remove_dir_all_if_present(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(e)),
    }
}
