//! MFCC front end: waveform in, fixed-length feature vector out.

use std::f64::consts::PI;
use std::path::Path;

use ndarray::Array2;
use rustfft::{num_complex::Complex, FftPlanner};
use statrs::statistics::Statistics;
use tracing::debug;

use crate::config::FeatureConfig;
use crate::error::DecodeError;
use crate::load_and_show::{load_wav, AudioSample};

/// Time-averaged MFCC profile of one clip.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.0
    }
}

impl From<Vec<f64>> for FeatureVector {
    fn from(values: Vec<f64>) -> Self {
        FeatureVector(values)
    }
}

/// Stateless extractor. Cheap to share between threads.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: FeatureConfig,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Number of values every extracted vector has.
    pub fn vector_len(&self) -> usize {
        self.config.n_mfcc
    }

    pub fn extract(&self, audio_path: &Path) -> Result<FeatureVector, DecodeError> {
        let audio = load_wav(audio_path)?;
        debug!(
            path = %audio_path.display(),
            sample_rate = audio.sample_rate,
            duration = audio.duration_secs(),
            "decoded clip"
        );
        Ok(self.extract_samples(&audio))
    }

    pub fn extract_samples(&self, audio: &AudioSample) -> FeatureVector {
        let mfcc = compute_mfcc(&audio.samples, audio.sample_rate, &self.config);
        mean_pool(&mfcc)
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(FeatureConfig::default())
    }
}

/// Mean of every coefficient (row) across all frames (columns).
pub fn mean_pool(mfcc: &Array2<f64>) -> FeatureVector {
    mfcc.rows()
        .into_iter()
        .map(|row| if row.is_empty() { 0.0 } else { row.iter().mean() })
        .collect::<Vec<f64>>()
        .into()
}

/// MFCC matrix with shape `(n_mfcc, frames)`.
pub fn compute_mfcc(samples: &[f32], sample_rate: u32, config: &FeatureConfig) -> Array2<f64> {
    let power = power_spectrogram(samples, config.n_fft, config.hop_length);
    let filterbank = mel_filterbank(config.n_mels, config.n_fft, sample_rate as f64);
    let mel = filterbank.dot(&power);
    let log_mel = power_to_db(&mel, config.top_db);
    let dct = dct_matrix(config.n_mfcc, config.n_mels);
    dct.dot(&log_mel)
}

/// Periodic Hann window.
pub fn hann_window(window_size: usize) -> Vec<f64> {
    (0..window_size)
        .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f64 / window_size as f64).cos())
        .collect()
}

/// Centred STFT power spectrum, shape `(n_fft / 2 + 1, frames)`.
///
/// The signal is zero-padded by `n_fft / 2` on both sides so a clip shorter
/// than one window still yields a frame.
pub fn power_spectrogram(samples: &[f32], n_fft: usize, hop_length: usize) -> Array2<f64> {
    let pad = n_fft / 2;
    let mut padded = vec![0.0f64; pad];
    padded.extend(samples.iter().map(|&s| s as f64));
    padded.extend(std::iter::repeat(0.0).take(pad));

    let n_frames = if padded.len() >= n_fft {
        1 + (padded.len() - n_fft) / hop_length
    } else {
        0
    };
    let n_bins = n_fft / 2 + 1;

    let window = hann_window(n_fft);
    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n_fft);

    let mut spectrogram = Array2::<f64>::zeros((n_bins, n_frames));
    let mut buffer = vec![Complex::new(0.0, 0.0); n_fft];

    for frame in 0..n_frames {
        let start = frame * hop_length;
        for (slot, (&s, &w)) in buffer
            .iter_mut()
            .zip(padded[start..start + n_fft].iter().zip(window.iter()))
        {
            *slot = Complex::new(s * w, 0.0);
        }
        fft.process(&mut buffer);

        for (bin, c) in buffer.iter().take(n_bins).enumerate() {
            spectrogram[[bin, frame]] = c.norm_sqr();
        }
    }

    spectrogram
}

fn hz_to_mel(f: f64) -> f64 {
    2595.0 * (1.0 + f / 700.0).log10()
}

fn mel_to_hz(m: f64) -> f64 {
    700.0 * (10f64.powf(m / 2595.0) - 1.0)
}

/// Triangular filters from 0 Hz to Nyquist, area-normalised, shape
/// `(n_filters, n_fft / 2 + 1)`.
pub fn mel_filterbank(n_filters: usize, n_fft: usize, sample_rate: f64) -> Array2<f64> {
    let n_bins = n_fft / 2 + 1;
    let low_mel = hz_to_mel(0.0);
    let high_mel = hz_to_mel(sample_rate / 2.0);

    // n_filters + 2 edges equally spaced on the mel scale
    let hz_points: Vec<f64> = (0..n_filters + 2)
        .map(|i| mel_to_hz(low_mel + i as f64 * (high_mel - low_mel) / (n_filters + 1) as f64))
        .collect();
    let bin_freqs: Vec<f64> = (0..n_bins)
        .map(|k| k as f64 * sample_rate / n_fft as f64)
        .collect();

    let mut filterbank = Array2::<f64>::zeros((n_filters, n_bins));
    for m in 0..n_filters {
        let (left, center, right) = (hz_points[m], hz_points[m + 1], hz_points[m + 2]);
        let norm = 2.0 / (right - left);
        for (k, &f) in bin_freqs.iter().enumerate() {
            let rising = (f - left) / (center - left);
            let falling = (right - f) / (right - center);
            let weight = rising.min(falling).max(0.0);
            filterbank[[m, k]] = weight * norm;
        }
    }

    filterbank
}

/// `10 * log10(power)`, floored at `top_db` below the maximum.
pub fn power_to_db(power: &Array2<f64>, top_db: f64) -> Array2<f64> {
    let db = power.mapv(|p| 10.0 * p.max(1e-10).log10());
    let peak = db.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if peak.is_finite() {
        let floor = peak - top_db;
        db.mapv(|v| v.max(floor))
    } else {
        db
    }
}

/// Orthonormal DCT-II basis truncated to the first `n_coeffs` rows.
pub fn dct_matrix(n_coeffs: usize, n_inputs: usize) -> Array2<f64> {
    let n = n_inputs as f64;
    Array2::from_shape_fn((n_coeffs, n_inputs), |(k, i)| {
        let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
        scale * (PI * k as f64 * (2 * i + 1) as f64 / (2.0 * n)).cos()
    })
}
