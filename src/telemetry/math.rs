use super::{GeoPosition, Quaternion};

/// Converts a unit quaternion to aerospace Euler angles (roll, pitch, yaw)
/// in radians, with the pitch singularity clamped to ±π/2.
pub fn euler_from_quaternion(q: &Quaternion) -> (f64, f64, f64) {
    let sinr_cosp = 2.0 * (q.w * q.x + q.y * q.z);
    let cosr_cosp = 1.0 - 2.0 * (q.x * q.x + q.y * q.y);
    let roll = sinr_cosp.atan2(cosr_cosp);

    let sinp = 2.0 * (q.w * q.y - q.z * q.x);
    let pitch = if sinp.abs() >= 1.0 {
        (std::f64::consts::FRAC_PI_2).copysign(sinp)
    } else {
        sinp.asin()
    };

    let siny_cosp = 2.0 * (q.w * q.z + q.x * q.y);
    let cosy_cosp = 1.0 - 2.0 * (q.y * q.y + q.z * q.z);
    let yaw = siny_cosp.atan2(cosy_cosp);

    (roll, pitch, yaw)
}

/// Initial great-circle bearing from `from` to `to` in radians,
/// measured clockwise from true north.
pub fn initial_bearing(from: &GeoPosition, to: &GeoPosition) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let dlon = (to.lon - from.lon).to_radians();

    let x = dlon.sin() * lat2.cos();
    let y = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    x.atan2(y)
}
