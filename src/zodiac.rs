use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{normalize_degrees, ZodiacSign};

/// Sign and degree within the sign for one ecliptic longitude.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZodiacPlacement {
    pub sign: ZodiacSign,
    /// Degrees into `sign`, in `[0, 30)`.
    pub degree: f64,
}

impl ZodiacPlacement {
    pub fn from_longitude(longitude: f64) -> Self {
        let longitude = normalize_degrees(longitude);
        let degree = longitude % 30.0;
        // Derive the index from the remainder so that index * 30 + degree == longitude.
        let sign_index = ((longitude - degree) / 30.0).round() as usize % 12;
        ZodiacPlacement {
            sign: ZodiacSign::from_index(sign_index),
            degree,
        }
    }

    pub fn sign_index(&self) -> usize {
        self.sign.index()
    }

    pub fn longitude(&self) -> f64 {
        self.sign_index() as f64 * 30.0 + self.degree
    }
}

impl fmt::Display for ZodiacPlacement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {:.2}°", self.sign, self.degree)
    }
}
