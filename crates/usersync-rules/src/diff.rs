//! Attribute diff engine.
//!
//! Compares the target-addressable attributes of a source identity with its
//! matched target identity. Only attributes present on the source side take
//! part; a missing source value never clears a target field.

use usersync_connector::identity::{IdentityAttributes, CORE_ATTRIBUTES};
use usersync_connector::AttributeMap;

/// Attributes whose source value differs from the target value.
///
/// Compares `email`, `firstname`, `lastname`, `country` and then each name in
/// `extended`. Values are compared after trimming, case preserved; the diff
/// carries the trimmed source value. An empty result means no update is needed.
pub fn diff_attributes<S, T>(source: &S, target: &T, extended: &[String]) -> AttributeMap
where
    S: IdentityAttributes + ?Sized,
    T: IdentityAttributes + ?Sized,
{
    let names = CORE_ATTRIBUTES
        .iter()
        .copied()
        .chain(extended.iter().map(String::as_str));

    let mut diff = AttributeMap::new();
    for name in names {
        let Some(wanted) = source.attribute(name).map(str::trim).filter(|v| !v.is_empty()) else {
            continue;
        };
        let current = target.attribute(name).map(str::trim).unwrap_or("");
        if wanted != current {
            diff.insert(name.to_string(), wanted.to_string());
        }
    }
    diff
}
