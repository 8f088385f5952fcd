//! Payload normalizer. Pure; decides between an inline byte payload and a reference to an
//! externally-stored object, and enforces the inline size cap. Performs no I/O.
use serde::Serialize;

/// 256 KiB, the largest payload the store will accept inline.
pub const MAX_INLINE_BYTES: usize = 256 * 1024;

#[derive(Clone, Debug, Default)]
pub struct PayloadInput {
    pub inline: Option<Vec<u8>>,
    pub reference: Option<String>,
    pub size: Option<i64>,
    pub hash: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadDecision {
    Inline,
    Ref,
    Missing,
    Conflict,
    InlineTooLarge,
    RefMetaMissing,
}

#[derive(Serialize)]
struct RefPayload {
    payload_ref: String,
    payload_size: i64,
    payload_hash: String,
}

#[derive(Debug, thiserror::Error)]
#[error("failed to encode reference payload: {0}")]
pub struct PayloadEncodingError(#[from] serde_json::Error);

/// Normalizes `input` into canonical bytes, or a decision short-circuiting without bytes.
/// Trimming applies only to the reference and hash strings, never to inline bytes.
pub fn normalize(
    input: &PayloadInput,
    max_inline_bytes: usize,
) -> Result<(PayloadDecision, Option<Vec<u8>>), PayloadEncodingError> {
    let trimmed_ref = input.reference.as_deref().unwrap_or("").trim();
    let trimmed_hash = input.hash.as_deref().unwrap_or("").trim();

    let inline_provided = input.inline.as_ref().is_some_and(|b| !b.is_empty());
    let ref_provided = !trimmed_ref.is_empty();

    if inline_provided && ref_provided {
        return Ok((PayloadDecision::Conflict, None));
    }
    if !inline_provided && !ref_provided {
        return Ok((PayloadDecision::Missing, None));
    }
    if inline_provided {
        let bytes = input.inline.as_ref().expect("checked above");
        if bytes.len() > max_inline_bytes {
            return Ok((PayloadDecision::InlineTooLarge, None));
        }
        return Ok((PayloadDecision::Inline, Some(bytes.clone())));
    }

    let size = input.size.unwrap_or(0);
    if size <= 0 || trimmed_hash.is_empty() {
        return Ok((PayloadDecision::RefMetaMissing, None));
    }

    let encoded = serde_json::to_vec(&RefPayload {
        payload_ref: trimmed_ref.to_string(),
        payload_size: size,
        payload_hash: trimmed_hash.to_string(),
    })?;
    Ok((PayloadDecision::Ref, Some(encoded)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inline(bytes: &[u8]) -> PayloadInput {
        PayloadInput {
            inline: Some(bytes.to_vec()),
            ..Default::default()
        }
    }

    #[test]
    fn conflict_when_both_present() {
        let input = PayloadInput {
            inline: Some(b"hi".to_vec()),
            reference: Some("s3://bucket/obj".to_string()),
            size: Some(10),
            hash: Some("abc".to_string()),
        };
        let (decision, _) = normalize(&input, MAX_INLINE_BYTES).unwrap();
        assert_eq!(decision, PayloadDecision::Conflict);
    }

    #[test]
    fn missing_when_neither_present() {
        let (decision, _) = normalize(&PayloadInput::default(), MAX_INLINE_BYTES).unwrap();
        assert_eq!(decision, PayloadDecision::Missing);
    }

    #[test]
    fn inline_too_large_over_cap() {
        let (decision, bytes) = normalize(&inline(&vec![0u8; MAX_INLINE_BYTES + 1]), MAX_INLINE_BYTES)
            .unwrap();
        assert_eq!(decision, PayloadDecision::InlineTooLarge);
        assert!(bytes.is_none());
    }

    #[test]
    fn inline_at_cap_is_accepted() {
        let (decision, bytes) = normalize(&inline(&vec![0u8; MAX_INLINE_BYTES]), MAX_INLINE_BYTES)
            .unwrap();
        assert_eq!(decision, PayloadDecision::Inline);
        assert_eq!(bytes.unwrap().len(), MAX_INLINE_BYTES);
    }

    #[test]
    fn ref_meta_missing_without_size_or_hash() {
        let input = PayloadInput {
            reference: Some("s3://bucket/obj".to_string()),
            ..Default::default()
        };
        let (decision, _) = normalize(&input, MAX_INLINE_BYTES).unwrap();
        assert_eq!(decision, PayloadDecision::RefMetaMissing);

        let input = PayloadInput {
            reference: Some("s3://bucket/obj".to_string()),
            size: Some(0),
            hash: Some("abc".to_string()),
            ..Default::default()
        };
        let (decision, _) = normalize(&input, MAX_INLINE_BYTES).unwrap();
        assert_eq!(decision, PayloadDecision::RefMetaMissing);
    }

    #[test]
    fn ref_emits_canonical_json() {
        let input = PayloadInput {
            reference: Some("  s3://bucket/obj  ".to_string()),
            size: Some(42),
            hash: Some("  deadbeef  ".to_string()),
            ..Default::default()
        };
        let (decision, bytes) = normalize(&input, MAX_INLINE_BYTES).unwrap();
        assert_eq!(decision, PayloadDecision::Ref);
        let value: serde_json::Value = serde_json::from_slice(&bytes.unwrap()).unwrap();
        assert_eq!(value["payload_ref"], "s3://bucket/obj");
        assert_eq!(value["payload_size"], 42);
        assert_eq!(value["payload_hash"], "deadbeef");
    }
}
