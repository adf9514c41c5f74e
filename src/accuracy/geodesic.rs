//! Ellipsoidal distance on WGS84.

const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;

const MAX_ITERATIONS: usize = 200;

/// Geodesic distance in meters between two `(longitude, latitude)` points in degrees.
///
/// Vincenty's inverse formula on the WGS84 ellipsoid. Nearly antipodal pairs,
/// where the iteration does not converge, fall back to the great-circle
/// distance on a sphere of the semi-major radius.
pub fn geodesic_distance(p1: (f64, f64), p2: (f64, f64)) -> f64 {
    let (lon1, lat1) = (p1.0.to_radians(), p1.1.to_radians());
    let (lon2, lat2) = (p2.0.to_radians(), p2.1.to_radians());

    let a = WGS84_A;
    let f = WGS84_F;
    let b = a * (1.0 - f);

    // reduced latitudes
    let u1 = ((1.0 - f) * lat1.tan()).atan();
    let u2 = ((1.0 - f) * lat2.tan()).atan();
    let (sin_u1, cos_u1) = u1.sin_cos();
    let (sin_u2, cos_u2) = u2.sin_cos();
    let l = lon2 - lon1;

    let mut lambda = l;
    for _ in 0..MAX_ITERATIONS {
        let (sin_lambda, cos_lambda) = lambda.sin_cos();
        let sin_sigma = ((cos_u2 * sin_lambda).powi(2)
            + (cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda).powi(2))
        .sqrt();
        if sin_sigma < 1e-15 {
            return 0.0;
        }
        let cos_sigma = sin_u1 * sin_u2 + cos_u1 * cos_u2 * cos_lambda;
        let sigma = sin_sigma.atan2(cos_sigma);

        let sin_alpha = cos_u1 * cos_u2 * sin_lambda / sin_sigma;
        let cos2_alpha = 1.0 - sin_alpha * sin_alpha;
        // equatorial line: cos2_alpha = 0
        let cos_2sm = if cos2_alpha > 1e-15 {
            cos_sigma - 2.0 * sin_u1 * sin_u2 / cos2_alpha
        } else {
            0.0
        };

        let c = f / 16.0 * cos2_alpha * (4.0 + f * (4.0 - 3.0 * cos2_alpha));
        let prev = lambda;
        lambda = l
            + (1.0 - c)
                * f
                * sin_alpha
                * (sigma + c * sin_sigma * (cos_2sm + c * cos_sigma * (-1.0 + 2.0 * cos_2sm * cos_2sm)));

        if (lambda - prev).abs() < 1e-12 {
            let u_sq = cos2_alpha * (a * a - b * b) / (b * b);
            let big_a =
                1.0 + u_sq / 16384.0 * (4096.0 + u_sq * (-768.0 + u_sq * (320.0 - 175.0 * u_sq)));
            let big_b = u_sq / 1024.0 * (256.0 + u_sq * (-128.0 + u_sq * (74.0 - 47.0 * u_sq)));
            let delta_sigma = big_b
                * sin_sigma
                * (cos_2sm
                    + big_b / 4.0
                        * (cos_sigma * (-1.0 + 2.0 * cos_2sm * cos_2sm)
                            - big_b / 6.0
                                * cos_2sm
                                * (-3.0 + 4.0 * sin_sigma * sin_sigma)
                                * (-3.0 + 4.0 * cos_2sm * cos_2sm)));
            return b * big_a * (sigma - delta_sigma);
        }
    }

    let central = (lat1.sin() * lat2.sin() + lat1.cos() * lat2.cos() * l.cos()).clamp(-1.0, 1.0);
    a * central.acos()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_distances() {
        // one degree of longitude on the equator
        let d = geodesic_distance((0.0, 0.0), (1.0, 0.0));
        assert!((d - 111_319.49).abs() < 0.1, "{d}");

        // Flinders Peak to Buninyong, Vincenty's reference line
        let d = geodesic_distance(
            (144.0 + 25.0 / 60.0 + 29.52440 / 3600.0, -(37.0 + 57.0 / 60.0 + 3.72030 / 3600.0)),
            (143.0 + 55.0 / 60.0 + 35.38390 / 3600.0, -(37.0 + 39.0 / 60.0 + 10.15610 / 3600.0)),
        );
        assert!((d - 54_972.271).abs() < 0.01, "{d}");
    }

    #[test]
    fn test_zero_and_symmetry() {
        assert_eq!(geodesic_distance((10.75, 59.91), (10.75, 59.91)), 0.0);
        let a = geodesic_distance((5.32, 60.39), (10.75, 59.91));
        let b = geodesic_distance((10.75, 59.91), (5.32, 60.39));
        assert!((a - b).abs() < 1e-6);
    }

    #[test]
    fn test_near_antipodal_is_finite() {
        let d = geodesic_distance((0.0, 0.0), (179.7, 0.5));
        assert!(d.is_finite() && d > 19_000_000.0);
    }
}
