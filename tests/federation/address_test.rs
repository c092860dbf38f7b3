/*!
 * Address Tests
 * Parsing, round-trips and detection of composite addresses
 */

use fedfs_kernel::{Address, ArchiveDetector, FsError, MountPoint};
use proptest::prelude::*;

fn segment() -> impl Strategy<Value = String> {
    "[a-z0-9_][a-z0-9_.-]{0,7}".prop_filter("dot segments are rejected", |s| s != "." && s != "..")
}

fn entry_path() -> impl Strategy<Value = String> {
    prop::collection::vec(segment(), 0..4).prop_map(|segments| segments.join("/"))
}

fn address_string() -> impl Strategy<Value = String> {
    (
        "[a-z][a-z0-9+.-]{0,5}",
        prop::collection::vec(("[a-z][a-z0-9]{0,3}", prop::collection::vec(segment(), 1..3)), 0..3),
        entry_path(),
    )
        .prop_map(|(root, nesting, entry)| {
            let mut raw = format!("{}:/", root);
            for (scheme, backing) in nesting {
                raw = format!("{}:{}{}!/", scheme, raw, backing.join("/"));
            }
            raw + &entry
        })
}

proptest! {
    #[test]
    fn prop_parse_display_roundtrip(raw in address_string()) {
        let address = Address::parse(&raw).unwrap();
        prop_assert_eq!(address.to_string(), raw.clone());
        let reparsed = Address::parse(&address.to_string()).unwrap();
        prop_assert_eq!(reparsed, address);
    }

    #[test]
    fn prop_normalization_idempotent(raw in address_string(), extra in "/{0,3}") {
        let messy = format!("{}{}", raw, extra);
        let once = Address::parse(&messy).unwrap();
        let twice = Address::parse(&once.to_string()).unwrap();
        prop_assert_eq!(once, twice);
    }
}

#[test]
fn test_nested_mount_point_structure() {
    let address = Address::parse("zip:zip:mem:/a.zip!/nested.zip!/dir/x.txt").unwrap();
    assert_eq!(address.entry().as_str(), "dir/x.txt");

    let mp = address.mount_point();
    assert_eq!(mp.depth(), 2);
    assert_eq!(mp.scheme().as_str(), "zip");
    assert_eq!(mp.parent_address().unwrap().to_string(), "zip:mem:/a.zip!/nested.zip");
    assert_eq!(mp.parent().unwrap().to_string(), "zip:mem:/a.zip!/");
    assert!(mp.is_descendant_of(&MountPoint::parse("mem:/").unwrap()));
}

#[test]
fn test_rejects_backtracking() {
    for raw in ["zip:mem:/a.zip!/../x", "mem:/a/./b", "zip:mem:/!/x", "no-colon", "zip:mem:/a.zip!/b!/c"] {
        assert!(
            matches!(Address::parse(raw), Err(FsError::InvalidAddress(_))),
            "{} should be rejected",
            raw
        );
    }
}

#[test]
fn test_resolve_relative() {
    let mp = MountPoint::parse("tar:mem:/a.tar!/").unwrap();
    let address = Address::resolve(&mp, "x//y/").unwrap();
    assert_eq!(address.to_string(), "tar:mem:/a.tar!/x/y");
    assert_eq!(address.parent(), Some(MountPoint::parse("mem:/").unwrap()));
}

#[test]
fn test_detect_builds_composites() {
    let detector = ArchiveDetector::standard();
    let address = detector.detect("mem:/backup/site.tar/www/app.jar/META-INF/x").unwrap();
    assert_eq!(
        address.to_string(),
        "zip:tar:mem:/backup/site.tar!/www/app.jar!/META-INF/x"
    );
}
