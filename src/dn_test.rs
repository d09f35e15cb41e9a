use super::*;

#[test]
fn test_parent_offset() {
    assert_eq!(parent_offset(b"dc=example,dc=com"), Some(11));
    assert_eq!(parent_offset(b"dc=com"), None);
    assert_eq!(parent_offset(b""), None);
    // escaped comma belongs to the rdn value.
    assert_eq!(parent_offset(b"cn=a\\,b,dc=com"), Some(8));
    // escape at end of buffer must not scan past it.
    assert_eq!(parent_offset(b"cn=a\\"), None);
}

#[test]
fn test_dn_parent() {
    assert_eq!(dn_parent(b"uid=alice,ou=people,dc=example,dc=com"), &b"ou=people,dc=example,dc=com"[..]);
    assert_eq!(dn_parent(b"dc=com"), &b""[..]);

    let dn = b"ou=people,dc=example,dc=com";
    let p1 = dn_parent(dn);
    let p2 = dn_parent(p1);
    let p3 = dn_parent(p2);
    assert_eq!(p1, &b"dc=example,dc=com"[..]);
    assert_eq!(p2, &b"dc=com"[..]);
    assert_eq!(p3, &b""[..]);
}

#[test]
fn test_rdn_len() {
    let suffixes = vec![b"dc=example,dc=com".to_vec()];

    assert_eq!(rdn_len(b"uid=alice,ou=people,dc=example,dc=com", &suffixes), 9);
    assert_eq!(rdn_len(b"ou=people,dc=example,dc=com", &suffixes), 9);
    // suffix itself reports zero, callers store the full DN.
    assert_eq!(rdn_len(b"dc=example,dc=com", &suffixes), 0);
    // DN outside any suffix, without comma, is its own rdn.
    assert_eq!(rdn_len(b"dc=org", &suffixes), 6);
    assert_eq!(rdn_len(b"cn=a\\,b,dc=example,dc=com", &suffixes), 7);
}

#[test]
fn test_is_suffix() {
    let suffixes = vec![b"dc=example,dc=com".to_vec(), b"o=acme".to_vec()];

    assert!(is_suffix(b"dc=example,dc=com", &suffixes));
    assert!(is_suffix(b"o=acme", &suffixes));
    assert!(!is_suffix(b"ou=people,dc=example,dc=com", &suffixes));
    assert!(!is_suffix(b"", &suffixes));
}
