use std::{
    io::ErrorKind,
    num::NonZeroU32,
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::fs;
use tracing::{debug, info, warn};

use crate::{
    acquire::AUDIO_EXTENSION,
    audio::{AudioCodec, CodecError},
    error::{RecapError, Result},
    plan::{PlannedSegment, plan_segments},
};

const CHUNK_PREFIX: &str = "segment_";

pub fn chunk_file_name(index: usize) -> String {
    format!("{CHUNK_PREFIX}{index}.{AUDIO_EXTENSION}")
}

/// Segment index encoded in a chunk file name, `segment_<i>.mp3`
pub fn chunk_index(path: &Path) -> Option<usize> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(AUDIO_EXTENSION)?.strip_suffix('.')?;
    stem.strip_prefix(CHUNK_PREFIX)?.parse().ok()
}

/// Chunk files in `dir` ordered by their numeric segment index.
///
/// Sorting on the parsed index rather than the file name keeps
/// `segment_10` after `segment_9`.
pub async fn find_chunks(dir: &Path) -> Vec<PathBuf> {
    let Ok(mut entries) = fs::read_dir(dir).await else {
        return Vec::new();
    };

    let mut chunks: Vec<(usize, PathBuf)> = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if let Some(index) = chunk_index(&path) {
            chunks.push((index, path));
        }
    }
    chunks.sort_by_key(|(index, _)| *index);

    chunks.into_iter().map(|(_, path)| path).collect()
}

/// Where chunks are written before the full set is moved to `output_dir`
fn staging_dir(output_dir: &Path) -> PathBuf {
    let mut name = output_dir.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    output_dir.with_file_name(name)
}

/// Splits one audio file into fixed-length chunk files.
///
/// The chunk directory is only ever populated with a complete set: chunks are
/// encoded into a `<dir>.partial` sibling which replaces `<dir>` once every
/// segment is written.
pub struct Segmenter {
    codec: Arc<dyn AudioCodec>,
    segment_length_secs: u32,
    sample_rate: u32,
}

impl Segmenter {
    pub fn new(codec: Arc<dyn AudioCodec>, segment_length_secs: u32, sample_rate: u32) -> Self {
        Self {
            codec,
            segment_length_secs,
            sample_rate,
        }
    }

    /// Return the chunk files for `audio_path` in segment order, writing them
    /// to `output_dir` unless chunks are already there.
    pub async fn segment(&self, audio_path: &Path, output_dir: &Path) -> Result<Vec<PathBuf>> {
        let existing = find_chunks(output_dir).await;
        if !existing.is_empty() {
            info!(count = existing.len(), "audio already chunked");
            return Ok(existing);
        }

        let failed = |reason: String| RecapError::Segmentation {
            audio_path: audio_path.to_path_buf(),
            reason,
        };

        let segment_length = NonZeroU32::new(self.segment_length_secs)
            .ok_or_else(|| failed("segment length must be greater than zero".to_string()))?;

        let samples = self
            .codec
            .decode(audio_path, self.sample_rate)
            .await
            .map_err(|e| failed(e.to_string()))?;

        let duration_secs = samples.len() as f64 / f64::from(self.sample_rate);
        let plan = plan_segments(duration_secs, segment_length, self.sample_rate);
        info!(
            duration_secs,
            segments = plan.len(),
            segment_length_secs = self.segment_length_secs,
            "chunking audio"
        );

        let staging = staging_dir(output_dir);
        if fs::try_exists(&staging).await? {
            debug!(path = %staging.display(), "removing chunks of an interrupted run");
            fs::remove_dir_all(&staging).await?;
        }
        fs::create_dir_all(&staging).await?;

        if let Err(e) = self.write_chunks(&samples, &plan, &staging).await {
            if let Err(cleanup) = fs::remove_dir_all(&staging).await {
                warn!(path = %staging.display(), error = %cleanup, "cannot remove partial chunks");
            }
            return Err(failed(e.to_string()));
        }

        // Holds no chunks here; remove_dir refuses if anything else is inside
        match fs::remove_dir(output_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(failed(format!("cannot replace {}: {e}", output_dir.display()))),
        }
        fs::rename(&staging, output_dir).await?;

        Ok(plan
            .iter()
            .map(|segment| output_dir.join(chunk_file_name(segment.index)))
            .collect())
    }

    async fn write_chunks(
        &self,
        samples: &[i16],
        plan: &[PlannedSegment],
        dir: &Path,
    ) -> std::result::Result<(), CodecError> {
        for segment in plan {
            let dest = dir.join(chunk_file_name(segment.index));
            let slice = &samples[segment.clamp(samples.len())];
            debug!(index = segment.index, samples = slice.len(), "writing chunk");

            self.codec.encode(slice, self.sample_rate, &dest).await?;
        }
        Ok(())
    }
}
