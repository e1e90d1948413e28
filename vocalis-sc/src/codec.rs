//! Decoding, WAV re-encoding and duration measurement

use crate::error::AudioError;
use bytes::Bytes;
use std::io::Cursor;
use tracing::debug;
use vocalis_core::AudioFormat;

/// Security: upper bound on decoded length (one hour at 48 kHz)
const MAX_FRAMES: usize = 48_000 * 3600;

/// Decoded audio, one sample vector per channel
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
    pub format: AudioFormat,
    /// Original WAV layout, kept so re-encoding preserves it
    pub wav_spec: Option<hound::WavSpec>,
}

impl DecodedAudio {
    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            channels: vec![samples],
            sample_rate,
            format: AudioFormat::Wav,
            wav_spec: Some(hound::WavSpec {
                channels: 1,
                sample_rate,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            }),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel
    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Channel average
    pub fn mono(&self) -> Vec<f32> {
        match self.channels.len() {
            0 => Vec::new(),
            1 => self.channels[0].clone(),
            n => (0..self.frames())
                .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() / n as f32)
                .collect(),
        }
    }
}

/// Decode audio bytes of the given container
pub fn decode(audio: &Bytes, format: AudioFormat) -> Result<DecodedAudio, AudioError> {
    if audio.is_empty() {
        return Err(AudioError::Format("Empty audio data".to_string()));
    }
    match format {
        AudioFormat::Wav => decode_wav(audio),
        AudioFormat::Mp3 | AudioFormat::Ogg => decode_compressed(audio, format),
    }
}

fn decode_wav(audio: &[u8]) -> Result<DecodedAudio, AudioError> {
    let mut reader = hound::WavReader::new(Cursor::new(audio))?;
    let spec = reader.spec();
    if spec.sample_rate == 0 || spec.channels == 0 {
        return Err(AudioError::Format("WAV header has zero rate or channels".to_string()));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
    };

    let channels = deinterleave(&interleaved, spec.channels as usize)?;
    debug!(
        sample_rate = spec.sample_rate,
        channels = spec.channels,
        bits = spec.bits_per_sample,
        "Decoded WAV"
    );
    Ok(DecodedAudio {
        channels,
        sample_rate: spec.sample_rate,
        format: AudioFormat::Wav,
        wav_spec: Some(spec),
    })
}

fn decode_compressed(audio: &Bytes, format: AudioFormat) -> Result<DecodedAudio, AudioError> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::errors::Error as SymphoniaError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let source = Cursor::new(audio.clone());
    let mss = MediaSourceStream::new(Box::new(source), MediaSourceStreamOptions::default());

    let mut hint = Hint::new();
    hint.with_extension(format.extension());

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AudioError::Decode(e.to_string()))?;

    let mut reader = probed.format;
    let track = reader
        .default_track()
        .ok_or_else(|| AudioError::Decode("no audio track found".to_string()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let mut sample_rate = codec_params.sample_rate.unwrap_or(0);
    let mut channel_count = codec_params.channels.map(|c| c.count()).unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::Decode(e.to_string()))?;

    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut interleaved: Vec<f32> = Vec::new();

    loop {
        let packet = match reader.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(_)) | Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(AudioError::Decode(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                if sample_rate == 0 {
                    sample_rate = spec.rate;
                }
                if channel_count == 0 {
                    channel_count = spec.channels.count();
                }
                let buf = sample_buf.get_or_insert_with(|| SampleBuffer::new(decoded.capacity() as u64, spec));
                buf.copy_interleaved_ref(decoded);
                interleaved.extend_from_slice(buf.samples());
                if interleaved.len() / channel_count.max(1) > MAX_FRAMES {
                    return Err(AudioError::Format("Decoded audio too long".to_string()));
                }
            }
            Err(SymphoniaError::IoError(_)) | Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(AudioError::Decode(e.to_string())),
        }
    }

    if sample_rate == 0 || channel_count == 0 {
        return Err(AudioError::Decode("stream has no decodable audio".to_string()));
    }

    let channels = deinterleave(&interleaved, channel_count)?;
    debug!(format = %format.extension(), sample_rate, channels = channel_count, "Decoded compressed audio");
    Ok(DecodedAudio {
        channels,
        sample_rate,
        format,
        wav_spec: None,
    })
}

fn deinterleave(interleaved: &[f32], channels: usize) -> Result<Vec<Vec<f32>>, AudioError> {
    if channels == 0 {
        return Err(AudioError::Format("Zero channels".to_string()));
    }
    let frames = interleaved.len() / channels;
    if frames > MAX_FRAMES {
        return Err(AudioError::Format(format!(
            "Too many frames: {} (max {})",
            frames, MAX_FRAMES
        )));
    }
    let mut out = vec![Vec::with_capacity(frames); channels];
    for frame in interleaved.chunks_exact(channels) {
        for (ch, &sample) in frame.iter().enumerate() {
            out[ch].push(sample);
        }
    }
    Ok(out)
}

/// Encode channels as WAV with the given layout
pub fn encode_wav(channels: &[Vec<f32>], spec: hound::WavSpec) -> Result<Bytes, AudioError> {
    if channels.len() != spec.channels as usize {
        return Err(AudioError::Encode(format!(
            "Channel count mismatch: {} buffers for {} channels",
            channels.len(),
            spec.channels
        )));
    }
    let frames = channels.first().map(Vec::len).unwrap_or(0);
    if channels.iter().any(|c| c.len() != frames) {
        return Err(AudioError::Encode("Channels differ in length".to_string()));
    }

    let mut cursor = Cursor::new(Vec::with_capacity(44 + frames * channels.len() * 4));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        match spec.sample_format {
            hound::SampleFormat::Int => {
                let max = ((1i64 << (spec.bits_per_sample.max(1) - 1)) - 1) as f32;
                for i in 0..frames {
                    for channel in channels {
                        let value = (channel[i].clamp(-1.0, 1.0) * max).round() as i32;
                        writer.write_sample(value)?;
                    }
                }
            }
            hound::SampleFormat::Float => {
                for i in 0..frames {
                    for channel in channels {
                        writer.write_sample(channel[i])?;
                    }
                }
            }
        }
        writer.finalize()?;
    }
    Ok(Bytes::from(cursor.into_inner()))
}

/// Measured duration of encoded audio, in seconds
pub fn measure_duration(audio: &Bytes, format: AudioFormat) -> Result<f64, AudioError> {
    match format {
        AudioFormat::Wav => {
            let reader = hound::WavReader::new(Cursor::new(audio.as_ref()))?;
            let spec = reader.spec();
            if spec.sample_rate == 0 {
                return Err(AudioError::Format("WAV sample rate is zero".to_string()));
            }
            Ok(reader.duration() as f64 / spec.sample_rate as f64)
        }
        AudioFormat::Mp3 | AudioFormat::Ogg => Ok(decode(audio, format)?.duration()),
    }
}
