use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("cannot decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("cannot encode {path}: {reason}")]
    Encode { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns audio files into mono 16-bit PCM and back.
#[async_trait]
pub trait AudioCodec: Send + Sync {
    /// Decode the whole file, downmixed to mono and resampled to `sample_rate`.
    async fn decode(&self, path: &Path, sample_rate: u32) -> Result<Vec<i16>, CodecError>;

    async fn encode(&self, samples: &[i16], sample_rate: u32, dest: &Path)
    -> Result<(), CodecError>;
}

/// Codec backed by the `ffmpeg` binary with WAV as the interchange format.
pub struct FfmpegCodec {
    binary: PathBuf,
    bitrate: String,
}

impl FfmpegCodec {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            bitrate: "192k".to_string(),
        }
    }

    pub fn with_bitrate(mut self, bitrate: impl Into<String>) -> Self {
        self.bitrate = bitrate.into();
        self
    }
}

impl Default for FfmpegCodec {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

fn wav_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn read_wav(path: &Path) -> Result<Vec<i16>, hound::Error> {
    let reader = hound::WavReader::open(path)?;
    reader.into_samples::<i16>().collect()
}

fn write_wav(path: &Path, samples: &[i16], sample_rate: u32) -> Result<(), hound::Error> {
    let mut writer = hound::WavWriter::create(path, wav_spec(sample_rate))?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()
}

#[async_trait]
impl AudioCodec for FfmpegCodec {
    async fn decode(&self, path: &Path, sample_rate: u32) -> Result<Vec<i16>, CodecError> {
        let wav = tempfile::Builder::new().suffix(".wav").tempfile()?;

        let output = Command::new(&self.binary)
            .arg("-y")
            .arg("-i")
            .arg(path)
            .arg("-vn")
            .arg("-acodec")
            .arg("pcm_s16le")
            .arg("-ar")
            .arg(sample_rate.to_string())
            .arg("-ac")
            .arg("1")
            .arg(wav.path())
            .output()
            .await?;

        if !output.status.success() {
            return Err(CodecError::Decode {
                path: path.to_path_buf(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let wav_path = wav.path().to_path_buf();
        tokio::task::spawn_blocking(move || read_wav(&wav_path))
            .await
            .map_err(std::io::Error::other)?
            .map_err(|e| CodecError::Decode {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    async fn encode(
        &self,
        samples: &[i16],
        sample_rate: u32,
        dest: &Path,
    ) -> Result<(), CodecError> {
        let wav = tempfile::Builder::new().suffix(".wav").tempfile()?;
        let encode_failed = |reason: String| CodecError::Encode {
            path: dest.to_path_buf(),
            reason,
        };

        let wav_path = wav.path().to_path_buf();
        let pcm = samples.to_vec();
        tokio::task::spawn_blocking(move || write_wav(&wav_path, &pcm, sample_rate))
            .await
            .map_err(std::io::Error::other)?
            .map_err(|e| encode_failed(e.to_string()))?;

        let output = Command::new(&self.binary)
            .arg("-y")
            .arg("-f")
            .arg("wav")
            .arg("-i")
            .arg(wav.path())
            .arg("-codec:a")
            .arg("libmp3lame")
            .arg("-b:a")
            .arg(&self.bitrate)
            .arg(dest)
            .output()
            .await?;

        if !output.status.success() {
            return Err(encode_failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wav_helpers_keep_samples() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("tone.wav");
        let samples: Vec<i16> = (0..1_000).map(|i| ((i * 37) % 2_000 - 1_000) as i16).collect();

        write_wav(&path, &samples, 16_000).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec(), wav_spec(16_000));
        assert_eq!(read_wav(&path).unwrap(), samples);
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_io_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let codec = FfmpegCodec::new(temp.path().join("no-such-ffmpeg"));

        let err = codec
            .decode(&temp.path().join("in.mp3"), 44_100)
            .await
            .unwrap_err();

        assert!(matches!(err, CodecError::Io(_)));
    }
}
