//! WAV encoding and decoding for clips.

use crate::error::{Result, VoxswitchError};
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

fn mono_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Writes 16-bit mono PCM as WAV to any seekable writer.
pub fn write_wav<W: Write + Seek>(writer: W, samples: &[i16], sample_rate: u32) -> Result<()> {
    let mut wav = hound::WavWriter::new(writer, mono_spec(sample_rate))?;
    for &sample in samples {
        wav.write_sample(sample)?;
    }
    wav.finalize()?;
    Ok(())
}

/// Encodes samples into an in-memory WAV file.
pub fn encode_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    write_wav(&mut cursor, samples, sample_rate)?;
    Ok(cursor.into_inner())
}

/// Writes samples to a WAV file at `path`, creating parent directories.
pub fn save_wav(path: &Path, samples: &[i16], sample_rate: u32) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::io::BufWriter::new(std::fs::File::create(path)?);
    write_wav(file, samples, sample_rate)
}

/// Decoded 16-bit audio, downmixed to mono.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedWav {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

/// Reads 16-bit integer WAV data. Stereo is averaged to mono.
pub fn read_wav<R: Read>(reader: R) -> Result<DecodedWav> {
    let mut wav = hound::WavReader::new(reader)?;
    let spec = wav.spec();
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(VoxswitchError::Other(format!(
            "unsupported WAV format: {} bit {:?}",
            spec.bits_per_sample, spec.sample_format
        )));
    }

    let raw: Vec<i16> = wav
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let channels = usize::from(spec.channels.max(1));
    let samples = if channels == 1 {
        raw
    } else {
        raw.chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
                (sum / channels as i32) as i16
            })
            .collect()
    };

    Ok(DecodedWav {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Reads a WAV file from disk.
pub fn load_wav(path: &Path) -> Result<DecodedWav> {
    let file = std::fs::File::open(path)?;
    read_wav(std::io::BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_encode_produces_riff_header() {
        let bytes = encode_wav(&[0, 1, -1, i16::MAX], 16000).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(bytes.len(), 44 + 8);
    }

    #[test]
    fn test_decode_reads_back_samples_and_rate() {
        let samples = vec![100, -200, 300, i16::MIN];
        let bytes = encode_wav(&samples, 8000).unwrap();
        let decoded = read_wav(Cursor::new(bytes)).unwrap();
        assert_eq!(decoded.samples, samples);
        assert_eq!(decoded.sample_rate, 8000);
    }

    #[test]
    fn test_stereo_is_downmixed() {
        let spec = hound::WavSpec {
            channels: 2,
            ..mono_spec(16000)
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for s in [100i16, 300, -50, -150] {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.set_position(0);
        let decoded = read_wav(cursor).unwrap();
        assert_eq!(decoded.samples, vec![200, -100]);
    }

    #[test]
    fn test_rejects_non_wav_data() {
        let result = read_wav(Cursor::new(b"not a wav file".to_vec()));
        assert!(matches!(result, Err(VoxswitchError::Wav(_))));
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clips").join("clip-0.wav");
        save_wav(&path, &[1, 2, 3], 16000).unwrap();
        let decoded = load_wav(&path).unwrap();
        assert_eq!(decoded.samples, vec![1, 2, 3]);
    }
}
