// application/x-www-form-urlencoded

use alloc::string::String;
use alloc::vec::Vec;

use crate::provisioning::Submission;

/// Decode one urlencoded component. Broken `%` escapes pass through as-is.
pub fn decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => match (hex(bytes.get(i + 1)), hex(bytes.get(i + 2))) {
                (Some(hi), Some(lo)) => {
                    out.push(hi << 4 | lo);
                    i += 2;
                }
                _ => out.push(b'%'),
            },
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex(b: Option<&u8>) -> Option<u8> {
    match *b? {
        c @ b'0'..=b'9' => Some(c - b'0'),
        c @ b'a'..=b'f' => Some(c - b'a' + 10),
        c @ b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Decoded `(name, value)` pairs in body order.
pub fn pairs(body: &str) -> impl Iterator<Item = (String, String)> + '_ {
    body.split('&').filter(|p| !p.is_empty()).map(|p| {
        let (k, v) = p.split_once('=').unwrap_or((p, ""));
        (decode(k), decode(v))
    })
}

/// Map the portal form onto a submission; unknown fields are ignored and
/// the last occurrence of a repeated field wins.
pub fn submission(body: &[u8]) -> Submission {
    let text = String::from_utf8_lossy(body);
    let mut s = Submission::default();
    for (name, value) in pairs(&text) {
        let slot = match name.as_str() {
            "ssid" => &mut s.ssid,
            "pass" => &mut s.password,
            "name" => &mut s.name,
            "location" => &mut s.location,
            "description" => &mut s.description,
            _ => continue,
        };
        *slot = value;
    }
    s
}
