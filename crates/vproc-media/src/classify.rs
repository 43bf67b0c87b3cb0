//! Mapping raw transcoder stderr to user-facing failure categories.

/// Friendly message for the family of filter-graph failures caused by
/// concatenating streams with mismatched resolution, frame rate, or layout.
pub const VIDEO_SOURCES_INCOMPATIBLE: &str = "The input video sources are incompatible \
     (mismatched resolution, frame rate, or stream layout). \
     Re-encode the inputs to a common format and try again.";

/// Map raw stderr to a friendly, actionable message.
///
/// Returns `None` when no mapping is available; the caller then surfaces
/// the raw text instead. Blank input never matches.
pub fn classify(stderr: &str) -> Option<&'static str> {
    if stderr.trim().is_empty() {
        return None;
    }

    let lower = stderr.to_lowercase();

    // Concat filter failures from resolution/aspect mismatch.
    if lower.contains("failed to configure output pad")
        || (lower.contains("input link") && lower.contains("do not match"))
    {
        return Some(VIDEO_SOURCES_INCOMPATIBLE);
    }

    // Filter-graph reconfiguration failures surface the same root cause.
    if lower.contains("error reinitializing filters")
        || lower.contains("failed to inject frame into filter network")
    {
        return Some(VIDEO_SOURCES_INCOMPATIBLE);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_input_yields_none() {
        assert_eq!(classify(""), None);
        assert_eq!(classify("   "), None);
        assert_eq!(classify("\n\t"), None);
    }

    #[test]
    fn test_output_pad_failure_any_case() {
        for text in [
            "failed to configure output pad",
            "Failed to configure output pad",
            "FAILED TO CONFIGURE OUTPUT PAD",
        ] {
            assert_eq!(classify(text), Some(VIDEO_SOURCES_INCOMPATIBLE));
        }
    }

    #[test]
    fn test_input_link_mismatch_needs_both_fragments() {
        assert_eq!(
            classify("Input link in0:v0 parameters do not match"),
            Some(VIDEO_SOURCES_INCOMPATIBLE)
        );
        // Either fragment alone is not enough.
        assert_eq!(classify("input link established"), None);
        assert_eq!(classify("checksums do not match"), None);
    }

    #[test]
    fn test_filter_reinit_failures() {
        assert_eq!(
            classify("Error reinitializing filters!"),
            Some(VIDEO_SOURCES_INCOMPATIBLE)
        );
        assert_eq!(
            classify("Failed to inject frame into filter network: Invalid argument"),
            Some(VIDEO_SOURCES_INCOMPATIBLE)
        );
    }

    #[test]
    fn test_unknown_errors_yield_none() {
        for text in [
            "Unknown error message",
            "File not found",
            "Permission denied",
            "Some random ffmpeg error",
        ] {
            assert_eq!(classify(text), None);
        }
    }

    #[test]
    fn test_signature_found_inside_full_transcript() {
        let transcript = "ffmpeg version 4.4.0 Copyright (c) 2000-2021\n\
            [Parsed_concat_0 @ 0x55a8] failed to configure output pad on Parsed_concat_0\n\
            Error while decoding stream #0:0: Invalid argument\n";
        assert_eq!(classify(transcript), Some(VIDEO_SOURCES_INCOMPATIBLE));
    }
}
