use std::path::{Path, PathBuf};
use std::{fs, io};

use hound::SampleFormat;
use palette::{LinSrgb, Mix};
use plotters::prelude::*;

use crate::error::DecodeError;

/// Decoded mono waveform. Lives for the duration of one extraction.
#[derive(Debug, Clone)]
pub struct AudioSample {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioSample {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

pub fn load_wav(file_path: &Path) -> Result<AudioSample, DecodeError> {
    /* Load file into mono f32 samples in [-1, 1] */
    let reader = hound::WavReader::open(file_path).map_err(|source| DecodeError::Open {
        path: file_path.to_path_buf(),
        source,
    })?;
    let spec = reader.spec();
    let read_err = |source| DecodeError::Read {
        path: file_path.to_path_buf(),
        source,
    };

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(read_err)?,
        (SampleFormat::Int, bits @ (8 | 16 | 24 | 32)) => {
            let scale = 1.0 / (1i64 << (bits - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .map_err(read_err)?
        }
        (format, bits) => {
            return Err(DecodeError::UnsupportedFormat {
                path: file_path.to_path_buf(),
                bits,
                format: match format {
                    SampleFormat::Float => "float",
                    SampleFormat::Int => "int",
                },
            })
        }
    };

    let channels = spec.channels.max(1) as usize;
    let samples: Vec<f32> = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    if samples.is_empty() {
        return Err(DecodeError::Empty {
            path: file_path.to_path_buf(),
        });
    }

    Ok(AudioSample {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// `.wav` files directly inside `dir`, sorted by path.
pub fn list_wav_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_wav(path))
        .collect();
    files.sort();
    Ok(files)
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("wav"))
        .unwrap_or(false)
}

// plotting

fn get_color_from_palette(x: f64) -> RGBAColor {
    /* white -> blue gradient, x in [0, 1] */
    let white = LinSrgb::new(1.0, 1.0, 1.0);
    let light = LinSrgb::new(0.55, 0.7, 0.95);
    let blue = LinSrgb::new(0.05, 0.2, 0.6);

    let x = x.clamp(0.0, 1.0) as f32;
    let color = if x < 0.5 {
        white.mix(light, x * 2.0)
    } else {
        light.mix(blue, (x - 0.5) * 2.0)
    };

    RGBAColor(
        (color.red * 255.0) as u8,
        (color.green * 255.0) as u8,
        (color.blue * 255.0) as u8,
        1.0,
    )
}

/// Render a confusion matrix (`matrix[true][predicted]`) as an annotated heatmap.
pub fn plot_confusion_matrix(
    matrix: &[Vec<usize>],
    labels: &[String],
    file_path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let n = labels.len() as u32;
    let max_count = matrix.iter().flatten().copied().max().unwrap_or(0).max(1) as f64;

    let root = BitMapBackend::new(file_path, (1024, 768)).into_drawing_area();
    root.fill(&WHITE)?;

    let label_at = |i: &u32| labels.get(*i as usize).cloned().unwrap_or_default();

    let mut chart = ChartBuilder::on(&root)
        .caption("Confusion Matrix of Accent Detector", ("sans-serif", 32))
        .margin(10)
        .x_label_area_size(60)
        .y_label_area_size(120)
        .build_cartesian_2d(0..n, 0..n)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(n as usize)
        .y_labels(n as usize)
        .x_label_formatter(&label_at)
        .y_label_formatter(&label_at)
        .x_desc("Predicted Accent")
        .y_desc("True Accent")
        .draw()?;

    chart.draw_series(matrix.iter().enumerate().flat_map(|(t, row)| {
        row.iter().enumerate().map(move |(p, &count)| {
            Rectangle::new(
                [(p as u32, t as u32), (p as u32 + 1, t as u32 + 1)],
                ShapeStyle {
                    color: get_color_from_palette(count as f64 / max_count),
                    filled: true,
                    stroke_width: 0,
                },
            )
        })
    }))?;

    chart.draw_series(matrix.iter().enumerate().flat_map(|(t, row)| {
        row.iter().enumerate().map(move |(p, &count)| {
            Text::new(
                count.to_string(),
                (p as u32, t as u32 + 1),
                ("sans-serif", 20).into_font(),
            )
        })
    }))?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn write_known_signal(
    file_path: &Path,
    sample_rate: u32,
    duration: f64,
    freqs: &[f64],
) {
    /* Sum of sine waves written as 16-bit mono, for fixtures */
    use std::f64::consts::PI;

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(file_path, spec).unwrap();
    let num_samples = (sample_rate as f64 * duration) as usize;
    let amp = 0.9 / freqs.len().max(1) as f64;

    for i in 0..num_samples {
        let t = i as f64 / sample_rate as f64;
        let sample: f64 = freqs.iter().map(|f| amp * (2.0 * PI * f * t).sin()).sum();
        writer.write_sample((sample * i16::MAX as f64) as i16).unwrap();
    }
    writer.finalize().unwrap();
}
