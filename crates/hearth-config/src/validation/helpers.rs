//! Shared validation helpers.

/// Push an error if `value` is outside `[min, max]`.
pub(crate) fn validate_range(errors: &mut Vec<String>, name: &str, value: u64, min: u64, max: u64) {
    if value < min || value > max {
        errors.push(format!("{name} = {value} is out of range [{min}, {max}]"));
    }
}

/// Push an error unless `url` uses one of the ICE url schemes.
pub(crate) fn validate_ice_url(errors: &mut Vec<String>, name: &str, url: &str) {
    const SCHEMES: [&str; 4] = ["stun:", "stuns:", "turn:", "turns:"];
    if !SCHEMES.iter().any(|scheme| url.starts_with(scheme)) {
        errors.push(format!("{name} = {url:?} must start with stun:, stuns:, turn: or turns:"));
    }
}
