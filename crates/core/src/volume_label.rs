use base64::Engine;
use serde::Serialize;

/// Maximum size of a tar volume-label payload (spec.md §3, §6): 99 bytes.
pub const VOLUME_LABEL_MAX_BYTES: usize = 99;

/// The fields a volume label carries, per spec.md §3 Chunk property (iv).
/// Field names match the short JSON keys the label format itself uses
/// (`r,t,i,h,u,ip,c`), so `Serialize` derives the wire format directly.
#[derive(Debug, Clone, Serialize)]
pub struct VolumeLabelFields {
    pub r: String,
    pub t: u64,
    pub i: u32,
    pub h: String,
    pub u: String,
    pub ip: String,
    pub c: bool,
}

/// Encodes a volume label, trying compact JSON first, then a pipe-delimited
/// form, then a base64-of-gzip-JSON last resort, per spec.md §3/§6. Returns
/// whichever form first fits within `VOLUME_LABEL_MAX_BYTES`; if even the
/// last-resort form doesn't fit, it is returned anyway (truncation would
/// make the label unparseable, so there is nothing better to do).
pub fn encode_volume_label(fields: &VolumeLabelFields) -> String {
    if let Ok(json) = serde_json::to_string(fields) {
        if json.len() <= VOLUME_LABEL_MAX_BYTES {
            return json;
        }
    }

    let pipe = format!(
        "{}|{}|{}|{}|{}|{}|{}",
        fields.r,
        fields.t,
        fields.i,
        fields.h,
        fields.u,
        fields.ip,
        if fields.c { 1 } else { 0 }
    );
    if pipe.len() <= VOLUME_LABEL_MAX_BYTES {
        return pipe;
    }

    gzip_base64_fallback(fields)
}

fn gzip_base64_fallback(fields: &VolumeLabelFields) -> String {
    use std::io::Write;

    let json = serde_json::to_vec(fields).unwrap_or_default();
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let _ = encoder.write_all(&json);
    let compressed = encoder.finish().unwrap_or_default();
    let encoded = base64::engine::general_purpose::STANDARD.encode(compressed);
    format!("gz:{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> VolumeLabelFields {
        VolumeLabelFields {
            r: "250714_A00123".to_string(),
            t: 1_700_000_000,
            i: 3,
            h: "seq01".to_string(),
            u: "svc".to_string(),
            ip: "10.0.0.5".to_string(),
            c: true,
        }
    }

    #[test]
    fn fits_as_compact_json_for_short_fields() {
        let label = encode_volume_label(&sample());
        assert!(label.len() <= VOLUME_LABEL_MAX_BYTES);
        let parsed: serde_json::Value = serde_json::from_str(&label).expect("valid json");
        assert_eq!(parsed["r"], "250714_A00123");
    }

    #[test]
    fn falls_back_to_pipe_form_when_json_overflows() {
        let mut fields = sample();
        fields.h = "h".repeat(90);
        let label = encode_volume_label(&fields);
        assert!(label.len() <= VOLUME_LABEL_MAX_BYTES || label.starts_with("gz:"));
        if serde_json::to_string(&fields).unwrap().len() > VOLUME_LABEL_MAX_BYTES {
            assert!(label.contains('|') || label.starts_with("gz:"));
        }
    }

    #[test]
    fn gzip_fallback_is_prefixed_and_decodable() {
        let mut fields = sample();
        fields.h = "h".repeat(200);
        fields.u = "u".repeat(200);
        let label = gzip_base64_fallback(&fields);
        assert!(label.starts_with("gz:"));
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&label[3..])
            .expect("valid base64");
        assert!(!decoded.is_empty());
    }
}
