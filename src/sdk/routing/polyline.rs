//! Encoded polyline geometry, always surfaced as `[longitude, latitude]` pairs.

use super::error::RoutingError;
use geo_types::Coord;

/// Five decimal places, the precision of the directions API's overview polylines.
pub const PRECISION: u32 = 5;

pub type LonLat = [f64; 2];

/// Decodes an overview polyline into `[longitude, latitude]` pairs.
///
/// The wire encoding stores latitude first; the returned pairs are swapped so
/// they can be handed to GeoJSON consumers as they are.
pub fn decode_lon_lat(encoded: &str) -> Result<Vec<LonLat>, RoutingError> {
    let line = ::polyline::decode_polyline(encoded, PRECISION)
        .map_err(|e| RoutingError::Polyline(e.to_string()))?;
    Ok(line.coords().map(|c| [c.x, c.y]).collect())
}

pub fn encode_lon_lat(points: &[LonLat]) -> Result<String, RoutingError> {
    ::polyline::encode_coordinates(
        points.iter().map(|&[lon, lat]| Coord { x: lon, y: lat }),
        PRECISION,
    )
    .map_err(|e| RoutingError::Polyline(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";

    fn close(a: LonLat, b: LonLat) -> bool {
        (a[0] - b[0]).abs() < 1e-5 && (a[1] - b[1]).abs() < 1e-5
    }

    #[test]
    fn test_decode_swaps_to_lon_lat() {
        let points = decode_lon_lat(SAMPLE).unwrap();
        assert_eq!(points.len(), 3);
        // Latitude-first on the wire: (38.5, -120.2), (40.7, -120.95), (43.252, -126.453)
        assert!(close(points[0], [-120.2, 38.5]));
        assert!(close(points[1], [-120.95, 40.7]));
        assert!(close(points[2], [-126.453, 43.252]));
    }

    #[test]
    fn test_reencode_matches_input() {
        let points = decode_lon_lat(SAMPLE).unwrap();
        assert_eq!(encode_lon_lat(&points).unwrap(), SAMPLE);
    }

    #[test]
    fn test_round_trip_within_precision() {
        let points = vec![
            [-73.985_131, 40.758_896],
            [-73.978_862, 40.761_432],
            [-73.968_285, 40.785_091],
        ];
        let decoded = decode_lon_lat(&encode_lon_lat(&points).unwrap()).unwrap();
        assert_eq!(decoded.len(), points.len());
        for (got, want) in decoded.iter().zip(&points) {
            assert!(close(*got, *want), "{got:?} != {want:?}");
        }
    }

    #[test]
    fn test_invalid_character() {
        let err = decode_lon_lat("_p~iF~ps|U_u\u{1F5D1}lLnnqC").unwrap_err();
        assert!(matches!(err, RoutingError::Polyline(_)));
    }

    #[test]
    fn test_empty_polyline() {
        assert!(decode_lon_lat("").unwrap().is_empty());
    }
}
