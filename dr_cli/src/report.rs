//! JSON reports printed by the subcommands.

use serde::Serialize;

use dr_core::Result;
use dr_scene::image::{Image, CHANNELS};

/// Value range of one colour channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelRange {
    pub channel: char,
    pub min: f64,
    pub max: f64,
}

/// Summary of a gradient image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradientSummary {
    /// Symmetric colour-map range `[-vlim, vlim]`.
    pub vlim: f64,
    pub channels: Vec<ChannelRange>,
    /// Pixels with a nonzero gradient in any channel.
    pub nonzero_pixels: usize,
}

impl GradientSummary {
    pub fn of(image: &Image) -> Result<Self> {
        let channels = (0..CHANNELS)
            .map(|c| {
                let values = image.channel(c)?;
                let (min, max) = values
                    .data()
                    .iter()
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
                        (lo.min(x), hi.max(x))
                    });
                Ok(ChannelRange {
                    channel: ['R', 'G', 'B'][c],
                    min,
                    max,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let nonzero_pixels = image
            .pixels
            .data()
            .chunks(CHANNELS)
            .filter(|p| p.iter().any(|&x| x != 0.0))
            .count();
        Ok(GradientSummary {
            vlim: image.max_abs(),
            channels,
            nonzero_pixels,
        })
    }
}

/// Raw pixels of an image, row-major RGB.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageDump {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<f64>,
}

impl From<&Image> for ImageDump {
    fn from(image: &Image) -> Self {
        ImageDump {
            width: image.width,
            height: image.height,
            pixels: image.pixels.data().to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ParameterEntry {
    pub key: String,
    pub value: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GradientsReport {
    pub key: String,
    pub spp: u32,
    /// d(image)/d(key) along a unit tangent on every component.
    pub parameter: GradientSummary,
    pub theta: f64,
    pub theta_color: Vec<f64>,
    /// d(image)/d(theta) with the key driven by `theta * theta_color`.
    pub seeded: GradientSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_image: Option<ImageDump>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seeded_image: Option<ImageDump>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IterationRecord {
    pub iteration: usize,
    /// Image loss against the reference.
    pub loss: f64,
    /// Squared distance to the reference parameter after the step.
    pub parameter_error: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizeReport {
    pub key: String,
    pub learning_rate: f64,
    pub reference: Vec<f64>,
    pub initial: Vec<f64>,
    pub recovered: Vec<f64>,
    pub iterations: Vec<IterationRecord>,
    /// Loss of a render at the gradient sample count with the recovered value.
    pub final_image_loss: f64,
}
