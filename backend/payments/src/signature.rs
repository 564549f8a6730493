//! Webhook notification signatures.
//!
//! Mercado Pago signs notifications with the application's secret and sends
//! `x-signature: ts=<unix ms>,v1=<hex hmac>`. The signed manifest is
//! `id:<data.id>;request-id:<x-request-id>;ts:<ts>;` where parts whose value is
//! missing are left out.
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, PartialEq, Eq)]
pub struct SignatureHeader<'a> {
    pub ts: &'a str,
    pub v1: &'a str,
}

pub fn parse(header: &str) -> Option<SignatureHeader<'_>> {
    let mut ts = None;
    let mut v1 = None;

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("ts", value)) => ts = Some(value.trim()),
            Some(("v1", value)) => v1 = Some(value.trim()),
            _ => {}
        }
    }

    Some(SignatureHeader { ts: ts?, v1: v1? })
}

pub fn manifest(data_id: Option<&str>, request_id: Option<&str>, ts: &str) -> String {
    let mut manifest = String::new();

    if let Some(id) = data_id.filter(|id| !id.is_empty()) {
        // alphanumeric ids are signed lowercased
        manifest.push_str(&format!("id:{};", id.to_lowercase()));
    }
    if let Some(request_id) = request_id.filter(|id| !id.is_empty()) {
        manifest.push_str(&format!("request-id:{request_id};"));
    }
    manifest.push_str(&format!("ts:{ts};"));

    manifest
}

pub fn sign(secret: &str, manifest: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(manifest.as_bytes());

    mac.finalize()
        .into_bytes()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

pub fn verify(
    secret: &str,
    header: &str,
    data_id: Option<&str>,
    request_id: Option<&str>,
) -> bool {
    let Some(signature) = parse(header) else {
        return false;
    };
    let Some(expected) = decode_hex(signature.v1) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };

    mac.update(manifest(data_id, request_id, signature.ts).as_bytes());
    mac.verify_slice(&expected).is_ok()
}

fn decode_hex(input: &str) -> Option<Vec<u8>> {
    if input.len() % 2 != 0 {
        return None;
    }

    (0..input.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(input.get(i..i + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "webhook-secret";

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse("ts=1704908010,v1=abc123"),
            Some(SignatureHeader {
                ts: "1704908010",
                v1: "abc123"
            })
        );
        assert_eq!(
            parse(" v1=ff , ts=1 "),
            Some(SignatureHeader { ts: "1", v1: "ff" })
        );
        assert_eq!(parse("ts=1"), None);
        assert_eq!(parse(""), None);
    }

    #[test]
    fn test_manifest_skips_missing_parts() {
        assert_eq!(
            manifest(Some("ABC"), Some("req-1"), "42"),
            "id:abc;request-id:req-1;ts:42;"
        );
        assert_eq!(manifest(None, Some("req-1"), "42"), "request-id:req-1;ts:42;");
        assert_eq!(manifest(Some("7"), None, "42"), "id:7;ts:42;");
    }

    #[test]
    fn test_verify_accepts_own_signature() {
        let v1 = sign(SECRET, &manifest(Some("123"), Some("req"), "99"));
        let header = format!("ts=99,v1={v1}");

        assert!(verify(SECRET, &header, Some("123"), Some("req")));
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let v1 = sign(SECRET, &manifest(Some("123"), Some("req"), "99"));

        assert!(!verify(SECRET, &format!("ts=99,v1={v1}"), Some("124"), Some("req")));
        assert!(!verify(SECRET, &format!("ts=100,v1={v1}"), Some("123"), Some("req")));
        assert!(!verify("other", &format!("ts=99,v1={v1}"), Some("123"), Some("req")));
        assert!(!verify(SECRET, "ts=99,v1=zz", Some("123"), Some("req")));
        assert!(!verify(SECRET, "garbage", Some("123"), Some("req")));
    }
}
