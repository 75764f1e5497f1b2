use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6_371.0;

/// A validated latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    /// Fallback depot used when neither the request nor the configuration
    /// supplies one.
    pub const DEFAULT_DEPOT: Coordinate = Coordinate {
        lat: 11.0168,
        lng: 76.9558,
    };

    pub fn new(lat: f64, lng: f64) -> Option<Self> {
        let valid = lat.is_finite()
            && lng.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lng);

        valid.then_some(Self { lat, lng })
    }

    /// Parses a coordinate stored as a pair of optional decimal strings.
    /// Anything missing, blank or out of range yields `None`.
    pub fn parse(lat: Option<&str>, lng: Option<&str>) -> Option<Self> {
        let lat = lat?.trim().parse::<f64>().ok()?;
        let lng = lng?.trim().parse::<f64>().ok()?;
        Self::new(lat, lng)
    }
}

/// Degrees as they arrive from clients: either a JSON number or a decimal
/// string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawDegrees {
    Number(f64),
    Text(String),
}

impl RawDegrees {
    fn as_f64(&self) -> Option<f64> {
        match self {
            RawDegrees::Number(value) => Some(*value),
            RawDegrees::Text(raw) => raw.trim().parse::<f64>().ok(),
        }
    }
}

pub fn coordinate_from_raw(
    lat: Option<&RawDegrees>,
    lng: Option<&RawDegrees>,
) -> Option<Coordinate> {
    Coordinate::new(lat?.as_f64()?, lng?.as_f64()?)
}

pub fn haversine_km(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().atan2((1.0 - haversine).sqrt());

    EARTH_RADIUS_KM * central_angle
}

#[cfg(test)]
mod tests {
    use super::{Coordinate, RawDegrees, coordinate_from_raw, haversine_km};

    fn point(lat: f64, lng: f64) -> Coordinate {
        Coordinate::new(lat, lng).unwrap()
    }

    #[test]
    fn zero_distance_for_same_point() {
        let p = point(11.0168, 76.9558);
        let distance = haversine_km(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn distance_is_symmetric() {
        let depot = point(11.0168, 76.9558);
        let stop = point(11.05, 77.0);
        assert_eq!(haversine_km(&depot, &stop), haversine_km(&stop, &depot));
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let london = point(51.5074, -0.1278);
        let paris = point(48.8566, 2.3522);
        let distance = haversine_km(&london, &paris);
        assert!((distance - 343.0).abs() < 5.0);
    }

    #[test]
    fn rejects_out_of_range_and_non_finite() {
        assert!(Coordinate::new(91.0, 0.0).is_none());
        assert!(Coordinate::new(0.0, -180.5).is_none());
        assert!(Coordinate::new(f64::NAN, 0.0).is_none());
    }

    #[test]
    fn parses_decimal_strings() {
        assert_eq!(
            Coordinate::parse(Some(" 11.05 "), Some("77.0")),
            Some(point(11.05, 77.0))
        );
        assert!(Coordinate::parse(Some(""), Some("77.0")).is_none());
        assert!(Coordinate::parse(Some("11.05"), None).is_none());
        assert!(Coordinate::parse(Some("north"), Some("77.0")).is_none());
    }

    #[test]
    fn raw_degrees_accept_numbers_and_strings() {
        let lat = RawDegrees::Text("11.05".to_string());
        let lng = RawDegrees::Number(77.0);
        assert_eq!(coordinate_from_raw(Some(&lat), Some(&lng)), Some(point(11.05, 77.0)));
        assert!(coordinate_from_raw(Some(&lat), None).is_none());
    }
}
