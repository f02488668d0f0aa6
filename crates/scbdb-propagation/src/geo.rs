//! Great-circle distance and a latitude-band index for radius queries.
//!
//! Entities are bucketed into bands `radius` tall; within a band points are
//! sorted by longitude so a query only scans the three bands around it and a
//! longitude window widened for the band's latitude.

use std::collections::HashMap;

use scbdb_core::Coordinates;

const EARTH_RADIUS_KM: f64 = 6371.0;
const KM_PER_LAT_DEGREE: f64 = 111.32;

/// Haversine distance in kilometres.
#[must_use]
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlng = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

#[derive(Debug)]
pub(crate) struct GeoIndex {
    band_deg: f64,
    /// Band number to `(longitude, entity index)` sorted by longitude.
    bands: HashMap<i64, Vec<(f64, usize)>>,
}

impl GeoIndex {
    pub(crate) fn new(points: impl IntoIterator<Item = (usize, Coordinates)>, radius_km: f64) -> Self {
        let band_deg = (radius_km / KM_PER_LAT_DEGREE).max(1e-6);
        let mut bands: HashMap<i64, Vec<(f64, usize)>> = HashMap::new();
        for (idx, c) in points {
            bands
                .entry(band_of(c.latitude, band_deg))
                .or_default()
                .push((c.longitude, idx));
        }
        for band in bands.values_mut() {
            band.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        }
        Self { band_deg, bands }
    }

    /// Indices that may lie within `radius_km` of `origin`. Callers still
    /// filter with [`haversine_km`]; the window is a superset.
    pub(crate) fn candidates(&self, origin: Coordinates, radius_km: f64, out: &mut Vec<usize>) {
        let band = band_of(origin.latitude, self.band_deg);
        let lat_reach = origin.latitude.abs() + radius_km / KM_PER_LAT_DEGREE;
        let cos = lat_reach.min(89.999).to_radians().cos().max(1e-6);
        let lng_reach = radius_km / (KM_PER_LAT_DEGREE * cos);

        for b in band - 1..=band + 1 {
            let Some(points) = self.bands.get(&b) else {
                continue;
            };
            if lng_reach >= 180.0 {
                out.extend(points.iter().map(|&(_, i)| i));
                continue;
            }
            let lo = origin.longitude - lng_reach;
            let hi = origin.longitude + lng_reach;
            scan(points, lo.max(-180.0), hi.min(180.0), out);
            // Antimeridian wrap.
            if lo < -180.0 {
                scan(points, lo + 360.0, 180.0, out);
            }
            if hi > 180.0 {
                scan(points, -180.0, hi - 360.0, out);
            }
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn band_of(latitude: f64, band_deg: f64) -> i64 {
    (latitude / band_deg).floor() as i64
}

fn scan(points: &[(f64, usize)], lo: f64, hi: f64, out: &mut Vec<usize>) {
    let start = points.partition_point(|&(lng, _)| lng < lo);
    out.extend(
        points[start..]
            .iter()
            .take_while(|&&(lng, _)| lng <= hi)
            .map(|&(_, i)| i),
    );
}
