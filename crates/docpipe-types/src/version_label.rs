//! Rule-version label grammar (spec §6): `V<major>.<minor>`; publish
//! allocates the next `<minor>` above the maximum over published +
//! archived versions; first publish is `V1.0`.

/// Parse a `V<major>.<minor>` label. Returns `None` if malformed.
#[must_use]
pub fn parse(label: &str) -> Option<(u32, u32)> {
    let rest = label.strip_prefix('V')?;
    let (major, minor) = rest.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

#[must_use]
pub fn format(major: u32, minor: u32) -> String {
    format!("V{major}.{minor}")
}

/// Compute the next version label given the existing published+archived
/// labels. First publish (empty history) is `V1.0`; thereafter the major
/// stays fixed at 1 (multi-major lines are not modeled by this spec) and
/// the minor increments past the current maximum.
#[must_use]
pub fn next_label(existing: &[String]) -> String {
    let max_minor = existing
        .iter()
        .filter_map(|l| parse(l))
        .map(|(_, minor)| minor)
        .max();
    match max_minor {
        None => format(1, 0),
        Some(minor) => format(1, minor + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_publish_is_v1_0() {
        assert_eq!(next_label(&[]), "V1.0");
    }

    #[test]
    fn increments_past_maximum() {
        let existing = vec!["V1.0".to_string(), "V1.2".to_string(), "V1.1".to_string()];
        assert_eq!(next_label(&existing), "V1.3");
    }

    #[test]
    fn parse_round_trips() {
        assert_eq!(parse("V1.2"), Some((1, 2)));
        assert_eq!(format(1, 2), "V1.2");
        assert_eq!(parse("garbage"), None);
    }
}
