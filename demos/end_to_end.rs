use holochar::estimation::{A_P, N_P, Z_P};
use holochar::{
    Crop, CropShape, Detection, DetectionSet, Detector, Estimator, Instrument, Pipeline,
    RegressionResult,
};
use image::{DynamicImage, GrayImage, Luma};
use std::sync::Arc;
use tracing::info;

/// Synthetic hologram: concentric fringes around each center
fn render(width: u32, height: u32, centers: &[(f32, f32)]) -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_fn(width, height, |x, y| {
        let value = centers.iter().fold(100.0f32, |acc, &(cx, cy)| {
            let r = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
            acc + 60.0 * (r / 4.0).cos() * (-r / 40.0).exp()
        });
        Luma([value.clamp(0.0, 255.0) as u8])
    }))
}

/// Proposes a detection at every local intensity maximum above a threshold
struct PeakDetector {
    instrument: Instrument,
    threshold: u8,
}

impl Detector for PeakDetector {
    fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    fn detect(&self, images: &[DynamicImage]) -> anyhow::Result<DetectionSet> {
        Ok(images
            .iter()
            .map(|image| {
                let gray = image.to_luma8();
                let (w, h) = gray.dimensions();
                let mut found = Vec::new();
                for y in 1..h.saturating_sub(1) {
                    for x in 1..w.saturating_sub(1) {
                        let v = gray.get_pixel(x, y)[0];
                        let is_peak = v >= self.threshold
                            && [(0, 1), (2, 1), (1, 0), (1, 2)]
                                .iter()
                                .all(|&(dx, dy)| gray.get_pixel(x + dx - 1, y + dy - 1)[0] <= v);
                        if is_peak {
                            found.push(Detection::new(
                                x as f32,
                                y as f32,
                                64.0,
                                64.0,
                                v as f32 / 255.0,
                            ));
                        }
                    }
                }
                found
            })
            .collect())
    }
}

/// Reports the mean crop intensity as the axial position
struct MeanEstimator {
    instrument: Instrument,
}

impl Estimator for MeanEstimator {
    fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    fn crop_shape(&self) -> CropShape {
        CropShape::new(64, 64)
    }

    fn estimate(&self, crops: &[Crop]) -> anyhow::Result<RegressionResult> {
        let z = crops
            .iter()
            .map(|crop| {
                let gray = crop.image.to_luma8();
                gray.pixels().map(|p| p[0] as f64).sum::<f64>() / gray.len() as f64
            })
            .collect();
        Ok(RegressionResult::new()
            .with_quantity(Z_P, z)
            .with_quantity(A_P, vec![0.75; crops.len()])
            .with_quantity(N_P, vec![1.45; crops.len()]))
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("holochar=debug,end_to_end=info")
        .init();

    let images = vec![
        render(320, 240, &[(80.0, 60.0), (220.0, 170.0)]),
        render(320, 240, &[]),
        render(320, 240, &[(8.0, 230.0)]),
    ];

    let pipeline = Pipeline::new(
        Arc::new(PeakDetector {
            instrument: Instrument::default(),
            threshold: 158,
        }),
        Arc::new(MeanEstimator {
            instrument: Instrument::default(),
        }),
    )
    .with_tolerance(10.0);

    let output = pipeline.run_images(images)?;

    info!("Structure: {:?}", output.structure.counts());
    for prediction in output.predictions() {
        info!(
            "particle at ({:.1}, {:.1}) z={:.2} a={:.2} n={:.2}",
            prediction.x, prediction.y, prediction.z, prediction.a, prediction.n
        );
    }

    Ok(())
}
