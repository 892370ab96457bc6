use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Colour look applied after the adjustment stages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    #[default]
    None,
    Mono,
    DramaticWarm,
    Noir,
    DramaticCool,
}

impl Preset {
    pub const ALL: [Preset; 5] = [
        Preset::None,
        Preset::Mono,
        Preset::DramaticWarm,
        Preset::Noir,
        Preset::DramaticCool,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::None => "none",
            Preset::Mono => "mono",
            Preset::DramaticWarm => "dramatic-warm",
            Preset::Noir => "noir",
            Preset::DramaticCool => "dramatic-cool",
        }
    }

    /// Whether the per-channel RGB gain still applies on top of this preset.
    /// Monochrome looks ignore it.
    pub fn keeps_rgb_gain(&self) -> bool {
        matches!(self, Preset::None | Preset::DramaticWarm | Preset::DramaticCool)
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown preset: {}", s))
    }
}

/// Crop box ratio choices
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CropRatio {
    #[default]
    Original,
    Custom,
    Square,
    #[serde(rename = "9:16")]
    NineSixteen,
    #[serde(rename = "4:5")]
    FourFive,
    #[serde(rename = "5:7")]
    FiveSeven,
    #[serde(rename = "3:4")]
    ThreeFour,
    #[serde(rename = "3:5")]
    ThreeFive,
    #[serde(rename = "2:3")]
    TwoThree,
}

impl CropRatio {
    pub const ALL: [CropRatio; 9] = [
        CropRatio::Original,
        CropRatio::Custom,
        CropRatio::Square,
        CropRatio::NineSixteen,
        CropRatio::FourFive,
        CropRatio::FiveSeven,
        CropRatio::ThreeFour,
        CropRatio::ThreeFive,
        CropRatio::TwoThree,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            CropRatio::Original => "Original",
            CropRatio::Custom => "Custom",
            CropRatio::Square => "Square",
            CropRatio::NineSixteen => "9:16",
            CropRatio::FourFive => "4:5",
            CropRatio::FiveSeven => "5:7",
            CropRatio::ThreeFour => "3:4",
            CropRatio::ThreeFive => "3:5",
            CropRatio::TwoThree => "2:3",
        }
    }

    /// Locked width/height ratio, `None` for free-form boxes
    pub fn aspect(&self) -> Option<f32> {
        match self {
            CropRatio::Original | CropRatio::Custom => None,
            CropRatio::Square => Some(1.0),
            CropRatio::NineSixteen => Some(9.0 / 16.0),
            CropRatio::FourFive => Some(4.0 / 5.0),
            CropRatio::FiveSeven => Some(5.0 / 7.0),
            CropRatio::ThreeFour => Some(3.0 / 4.0),
            CropRatio::ThreeFive => Some(3.0 / 5.0),
            CropRatio::TwoThree => Some(2.0 / 3.0),
        }
    }
}

impl fmt::Display for CropRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CropRatio {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CropRatio::ALL
            .into_iter()
            .find(|r| r.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow::anyhow!("Unknown crop ratio: {}", s))
    }
}

/// Crop rectangle in normalized image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRegion {
    pub enabled: bool,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl CropRegion {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            enabled: true,
            x,
            y,
            w,
            h,
        }
    }

    /// Disabled, full-frame region
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            x: 0.0,
            y: 0.0,
            w: 1.0,
            h: 1.0,
        }
    }
}

impl Default for CropRegion {
    fn default() -> Self {
        Self::disabled()
    }
}

impl FromStr for CropRegion {
    type Err = anyhow::Error;

    /// Parses `x,y,w,h`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<f32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow::anyhow!("Invalid crop region {:?}: {}", s, e))?;
        match parts.as_slice() {
            [x, y, w, h] => Ok(CropRegion::new(*x, *y, *w, *h)),
            _ => anyhow::bail!("Crop region needs four values x,y,w,h, got {:?}", s),
        }
    }
}

/// Slider-backed parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Adjustment {
    Brightness,
    Sharpness,
    Denoise,
    Red,
    Green,
    Blue,
}

impl Adjustment {
    pub const ALL: [Adjustment; 6] = [
        Adjustment::Brightness,
        Adjustment::Sharpness,
        Adjustment::Denoise,
        Adjustment::Red,
        Adjustment::Green,
        Adjustment::Blue,
    ];

    /// Inclusive slider range
    pub fn range(&self) -> (i32, i32) {
        match self {
            Adjustment::Denoise => (0, 100),
            _ => (-100, 100),
        }
    }

    pub fn clamp(&self, value: i32) -> i32 {
        let (lo, hi) = self.range();
        value.clamp(lo, hi)
    }
}

/// Full set of live editing parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditParams {
    pub brightness: i32,
    pub sharpness: i32,
    pub denoise: i32,
    pub red: i32,
    pub green: i32,
    pub blue: i32,
    pub mono: bool,
    pub preset: Preset,
    pub crop_ratio: CropRatio,
    pub crop: CropRegion,
}

impl EditParams {
    pub fn get(&self, adjustment: Adjustment) -> i32 {
        match adjustment {
            Adjustment::Brightness => self.brightness,
            Adjustment::Sharpness => self.sharpness,
            Adjustment::Denoise => self.denoise,
            Adjustment::Red => self.red,
            Adjustment::Green => self.green,
            Adjustment::Blue => self.blue,
        }
    }

    /// Set a slider value, clamped to its range
    pub fn set(&mut self, adjustment: Adjustment, value: i32) {
        let value = adjustment.clamp(value);
        match adjustment {
            Adjustment::Brightness => self.brightness = value,
            Adjustment::Sharpness => self.sharpness = value,
            Adjustment::Denoise => self.denoise = value,
            Adjustment::Red => self.red = value,
            Adjustment::Green => self.green = value,
            Adjustment::Blue => self.blue = value,
        }
    }

    /// Clamp every slider into range
    pub fn clamped(mut self) -> Self {
        for adjustment in Adjustment::ALL {
            self.set(adjustment, self.get(adjustment));
        }
        self
    }

    pub fn is_neutral(&self) -> bool {
        *self == EditParams::default()
    }
}
