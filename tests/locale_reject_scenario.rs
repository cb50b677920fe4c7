//! End-to-end scenario S5 (spec.md §8): declaring a column with an explicit
//! invalid locale marker fails with `UnknownLocale` and never touches the
//! file.

use rusty_db::collation::Collation;
use rusty_db::error::DbError;

#[test]
fn locale_invalid_marker_is_rejected_with_unknown_locale() {
    let err = Collation::locale("invalid").unwrap_err();
    assert!(matches!(err, DbError::UnknownLocale(_)));
}

#[test]
fn locale_any_part_invalid_markers_are_rejected() {
    for tag in ["xx", "zz", "iv", "xx-US", "en-xx"] {
        let err = Collation::locale(tag).unwrap_err();
        assert!(
            matches!(err, DbError::UnknownLocale(_)),
            "tag '{tag}' should have been rejected"
        );
    }
}
