//! A small reference scene: flat coloured patches lit by one point light.
//!
//! The image plane is the unit square, `y` pointing down. Every pixel shows
//! the last patch whose regions contain its centre. Radiance is
//! `reflectance * irradiance * intensity`, where the irradiance of a point
//! light hovering above the plane is estimated per pixel from jittered
//! samples, so low sample counts give noisy images.

use dr_core::{Error, ParamKey, Result, Value};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::image::{Image, CHANNELS};
use crate::scene::{Renderer, Scene};

/// Axis-aligned region of the unit square, half-open on the far edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rect {
    pub const FULL: Rect = Rect::new(0.0, 0.0, 1.0, 1.0);

    pub const fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Rect { x0, y0, x1, y1 }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        (self.x0..self.x1).contains(&x) && (self.y0..self.y1).contains(&y)
    }
}

/// Point light above the image plane.
#[derive(Debug, Clone)]
pub struct PointLight {
    /// Position projected onto the image plane.
    pub position: (f64, f64),
    /// Distance above the plane.
    pub height: f64,
    /// Scalar intensity; differentiable as `light.intensity.value`.
    pub intensity: Value,
}

impl PointLight {
    /// Irradiance at a point of the plane for unit intensity.
    fn irradiance_at(&self, x: f64, y: f64) -> f64 {
        let (dx, dy) = (x - self.position.0, y - self.position.1);
        let h = self.height;
        h / (dx * dx + dy * dy + h * h).powf(1.5)
    }
}

#[derive(Debug, Clone)]
struct Patch {
    name: String,
    key: ParamKey,
    reflectance: Value,
    regions: Vec<Rect>,
}

/// Flat patch scene with a cached per-pixel albedo image.
#[derive(Debug, Clone)]
pub struct PatchScene {
    width: usize,
    height: usize,
    patches: Vec<Patch>,
    light: PointLight,
    light_key: ParamKey,
    /// Patch index per pixel.
    labels: Vec<Option<usize>>,
    /// Albedo per pixel and channel, rebuilt by `parameters_changed`.
    albedo: Vec<f64>,
}

impl PatchScene {
    pub fn new(width: usize, height: usize, light: PointLight) -> Result<Self> {
        if light.intensity.len() != 1 {
            return Err(Error::shape_mismatch("light intensity", 1, light.intensity.len()));
        }
        Ok(PatchScene {
            width,
            height,
            patches: Vec::new(),
            light,
            light_key: ParamKey::parse("light.intensity.value")?,
            labels: vec![None; width * height],
            albedo: vec![0.0; width * height * CHANNELS],
        })
    }

    /// Add a patch drawn over the existing ones. Its reflectance becomes
    /// differentiable as `<name>.reflectance.value`.
    pub fn with_patch(mut self, name: &str, reflectance: [f64; 3], regions: &[Rect]) -> Result<Self> {
        let key = ParamKey::parse(&format!("{name}.reflectance.value"))?;
        if name == self.light_key.object() || self.patches.iter().any(|p| p.key == key) {
            return Err(Error::InvalidKey {
                key: key.to_string(),
                reason: "duplicate scene object".to_string(),
            });
        }
        let index = self.patches.len();
        for (p, label) in self.labels.iter_mut().enumerate() {
            let x = ((p % self.width) as f64 + 0.5) / self.width as f64;
            let y = ((p / self.width) as f64 + 0.5) / self.height as f64;
            if regions.iter().any(|r| r.contains(x, y)) {
                *label = Some(index);
            }
        }
        self.patches.push(Patch {
            name: name.to_string(),
            key,
            reflectance: Value::from(reflectance),
            regions: regions.to_vec(),
        });
        self.rebuild_albedo();
        Ok(self)
    }

    /// Cornell-box-like preset: white back wall with red and green side walls.
    pub fn cornell_box(width: usize, height: usize) -> Result<Self> {
        let light = PointLight {
            position: (0.5, 0.1),
            height: 0.6,
            intensity: Value::scalar(1.0),
        };
        PatchScene::new(width, height, light)?
            .with_patch("white", [0.885809, 0.698859, 0.666422], &[Rect::FULL])?
            .with_patch("red", [0.570068, 0.0430135, 0.0443706], &[Rect::new(0.0, 0.0, 0.2, 1.0)])?
            .with_patch("green", [0.105421, 0.37798, 0.076425], &[Rect::new(0.8, 0.0, 1.0, 1.0)])
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn light(&self) -> &PointLight {
        &self.light
    }

    pub fn reflectance(&self, name: &str) -> Option<&Value> {
        self.patches
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.reflectance)
    }

    /// Regions covered by the named patch.
    pub fn regions(&self, name: &str) -> Option<&[Rect]> {
        self.patches
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.regions.as_slice())
    }

    /// Number of pixels showing the named patch.
    pub fn coverage(&self, name: &str) -> usize {
        let index = self.patches.iter().position(|p| p.name == name);
        self.labels.iter().filter(|&&l| l.is_some() && l == index).count()
    }

    /// Patch name shown at a pixel.
    pub fn patch_at(&self, x: usize, y: usize) -> Option<&str> {
        self.labels[y * self.width + x].map(|i| self.patches[i].name.as_str())
    }

    fn rebuild_albedo(&mut self) {
        for (p, label) in self.labels.iter().enumerate() {
            let rgb: &[f64] = match label {
                Some(i) => self.patches[*i].reflectance.data(),
                None => &[0.0; CHANNELS],
            };
            self.albedo[p * CHANNELS..(p + 1) * CHANNELS].copy_from_slice(rgb);
        }
    }

    /// Albedo image. Pixels of patches with tracked reflectance are built
    /// from graph operations, the rest come from the cache.
    pub fn albedo_image(&self) -> Result<Value> {
        let tracked: Vec<usize> = (0..self.patches.len())
            .filter(|&i| self.patches[i].reflectance.is_tracked())
            .collect();
        if tracked.is_empty() {
            return Ok(Value::from_vec(self.albedo.clone()));
        }

        let n = self.labels.len();
        let channel_index: Vec<usize> = (0..n * CHANNELS).map(|i| i % CHANNELS).collect();
        let mut base = self.albedo.clone();
        let mut image = None;
        for &k in &tracked {
            let mut mask = vec![0.0; n * CHANNELS];
            for (p, _) in self.labels.iter().enumerate().filter(|(_, l)| **l == Some(k)) {
                base[p * CHANNELS..(p + 1) * CHANNELS].fill(0.0);
                mask[p * CHANNELS..(p + 1) * CHANNELS].fill(1.0);
            }
            let contribution = self.patches[k]
                .reflectance
                .gather(&channel_index)?
                .try_mul(&Value::from_vec(mask))?;
            image = Some(match image {
                Some(acc) => contribution.try_add(&acc)?,
                None => contribution,
            });
        }
        match image {
            Some(tracked) => Value::from_vec(base).try_add(&tracked),
            None => Ok(Value::from_vec(base)),
        }
    }
}

impl Scene for PatchScene {
    fn traverse(&self) -> Vec<(ParamKey, Value)> {
        self.patches
            .iter()
            .map(|p| (p.key.clone(), p.reflectance.clone()))
            .chain(std::iter::once((self.light_key.clone(), self.light.intensity.clone())))
            .collect()
    }

    fn write_parameter(&mut self, key: &ParamKey, value: Value) -> Result<()> {
        let slot = if *key == self.light_key {
            &mut self.light.intensity
        } else {
            &mut self
                .patches
                .iter_mut()
                .find(|p| p.key == *key)
                .ok_or_else(|| Error::KeyNotFound(key.to_string()))?
                .reflectance
        };
        if slot.len() != value.len() {
            return Err(Error::shape_mismatch(key.to_string(), slot.len(), value.len()));
        }
        *slot = value;
        Ok(())
    }

    fn parameters_changed(&mut self, keys: &[ParamKey]) {
        if keys.iter().any(|k| *k != self.light_key) {
            self.rebuild_albedo();
            log::debug!("rebuilt albedo cache after {} parameter changes", keys.len());
        }
    }
}

/// Direct-lighting renderer for [`PatchScene`].
#[derive(Debug, Clone, PartialEq)]
pub struct PatchRenderer {
    /// Irradiance added everywhere so unlit pixels keep a gradient.
    pub ambient: f64,
}

impl Default for PatchRenderer {
    fn default() -> Self {
        PatchRenderer { ambient: 0.1 }
    }
}

impl PatchRenderer {
    /// Per-pixel irradiance, averaged over `spp` jittered samples and
    /// repeated for each channel.
    pub fn irradiance(&self, scene: &PatchScene, spp: u32, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let spp = spp.max(1);
        let (w, h) = (scene.width as f64, scene.height as f64);
        let mut out = Vec::with_capacity(scene.width * scene.height * CHANNELS);
        for py in 0..scene.height {
            for px in 0..scene.width {
                let total: f64 = (0..spp)
                    .map(|_| {
                        let x = (px as f64 + rng.gen::<f64>()) / w;
                        let y = (py as f64 + rng.gen::<f64>()) / h;
                        scene.light.irradiance_at(x, y)
                    })
                    .sum();
                let e = total / spp as f64 + self.ambient;
                out.extend_from_slice(&[e; CHANNELS]);
            }
        }
        out
    }
}

impl Renderer<PatchScene> for PatchRenderer {
    fn render(&self, scene: &PatchScene, spp: u32, seed: u64) -> Result<Image> {
        let irradiance = Value::from_vec(self.irradiance(scene, spp, seed));
        let radiance = scene
            .albedo_image()?
            .try_mul(&irradiance)?
            .try_mul(&scene.light.intensity)?;
        log::debug!(
            "rendered {}x{} at {spp} spp (tracked: {})",
            scene.width,
            scene.height,
            radiance.is_tracked()
        );
        Image::new(scene.width, scene.height, radiance)
    }
}
