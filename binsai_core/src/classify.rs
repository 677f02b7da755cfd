//! Pure mapping from `(fill %, ppm)` to capacity, waste class and priority.
//!
//! Boundaries are upper-inclusive and there is no hysteresis. Labels, colours
//! and LED states come from lookup tables keyed by the enums.

pub const FILL_EMPTY_MAX: f32 = 35.0;
pub const FILL_HALF_MAX: f32 = 50.0;
pub const FILL_ALMOST_MAX: f32 = 90.0;

pub const PPM_CLEAN_MAX: f32 = 199.0;
pub const PPM_INORGANIC_MAX: f32 = 449.0;
pub const PPM_ORGANIC_L1_MAX: f32 = 800.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capacity {
    Empty,
    Half,
    AlmostFull,
    Full,
}

const CAPACITY_LABEL: [&str; 4] = ["EMPTY", "HALF", "ALMOST FULL", "FULL"];
const CAPACITY_COLOR: [&str; 4] = ["#00FF00", "#FFFF00", "#FF9900", "#FF0000"];

impl Capacity {
    pub fn from_fill(fill_percent: f32) -> Self {
        if fill_percent <= FILL_EMPTY_MAX {
            Self::Empty
        } else if fill_percent <= FILL_HALF_MAX {
            Self::Half
        } else if fill_percent <= FILL_ALMOST_MAX {
            Self::AlmostFull
        } else {
            Self::Full
        }
    }

    pub const fn ordinal(self) -> u8 {
        self as u8
    }

    pub const fn label(self) -> &'static str {
        CAPACITY_LABEL[self as usize]
    }

    pub const fn color(self) -> &'static str {
        CAPACITY_COLOR[self as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WasteClass {
    Clean,
    Inorganic,
    OrganicL1,
    OrganicL2,
}

const CLASS_LABEL: [&str; 4] = ["CLEAN", "INORGANIC", "ORGANIC L1", "ORGANIC L2"];
const RECOMMENDATION: [&str; 4] = [
    "Monitor only",
    "Schedule routine collection",
    "Prepare specialised containers",
    "Collect immediately; decomposition risk",
];

impl WasteClass {
    pub fn from_ppm(ppm: f32) -> Self {
        if ppm <= PPM_CLEAN_MAX {
            Self::Clean
        } else if ppm <= PPM_INORGANIC_MAX {
            Self::Inorganic
        } else if ppm <= PPM_ORGANIC_L1_MAX {
            Self::OrganicL1
        } else {
            Self::OrganicL2
        }
    }

    pub const fn priority(self) -> u8 {
        self as u8
    }

    pub const fn label(self) -> &'static str {
        CLASS_LABEL[self as usize]
    }

    pub const fn recommendation(self) -> &'static str {
        RECOMMENDATION[self as usize]
    }
}

/// Dashboard LEDs, one per capacity level (Full, AlmostFull, Half, Empty).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Leds {
    pub full: bool,
    pub almost_full: bool,
    pub half: bool,
    pub empty: bool,
}

impl From<Capacity> for Leds {
    fn from(c: Capacity) -> Self {
        Self {
            full: c == Capacity::Full,
            almost_full: c == Capacity::AlmostFull,
            half: c == Capacity::Half,
            empty: c == Capacity::Empty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub fill_percent: f32,
    pub ppm: f32,
    pub capacity: Capacity,
    pub waste_class: WasteClass,
    pub priority: u8,
    pub recommendation: &'static str,
}

impl Classification {
    pub fn leds(&self) -> Leds {
        self.capacity.into()
    }
}

/// `(1 − distance/bin_height) · 100`, clipped to [0, 100].
pub fn fill_percent(distance_cm: f32, bin_height_cm: f32) -> f32 {
    if !(distance_cm.is_finite() && bin_height_cm > 0.0) {
        return 0.0;
    }
    ((1.0 - distance_cm / bin_height_cm) * 100.0).clamp(0.0, 100.0)
}

pub fn classify(fill_percent: f32, ppm: f32) -> Classification {
    let fill = if fill_percent.is_nan() {
        0.0
    } else {
        fill_percent.clamp(0.0, 100.0)
    };
    let capacity = Capacity::from_fill(fill);
    let waste_class = WasteClass::from_ppm(ppm);
    Classification {
        fill_percent: fill,
        ppm,
        capacity,
        waste_class,
        priority: waste_class.priority(),
        recommendation: waste_class.recommendation(),
    }
}
