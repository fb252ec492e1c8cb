//! Mapping from (model version, variant) to the provider's queue path.
//!
//! Unknown pairs are an error at the caller, never a fallback: submitting to a
//! default path after the price for a different model was charged would bill
//! the wrong amount.

/// Queue path for a model version and variant, or `None` if the pair is not
/// served.
pub fn queue_path(model_version: &str, variant: &str) -> Option<&'static str> {
    let path = match (model_version, variant) {
        ("v2.6", "text-to-video") => "fal-ai/kling-video/v2.6/pro/text-to-video",
        ("v2.6", "image-to-video") => "fal-ai/kling-video/v2.6/pro/image-to-video",
        ("v2.6", "motion-control-standard") => "fal-ai/kling-video/v2.6/standard/motion-control",
        ("v2.6", "motion-control-pro") => "fal-ai/kling-video/v2.6/pro/motion-control",
        ("v2.5-turbo", "text-to-video-pro") => "fal-ai/kling-video/v2.5-turbo/pro/text-to-video",
        ("v2.5-turbo", "image-to-video-standard") => "fal-ai/kling-video/v2.5-turbo/standard/image-to-video",
        ("v2.5-turbo", "image-to-video-pro") => "fal-ai/kling-video/v2.5-turbo/pro/image-to-video",
        ("v2.1", "image-to-video-standard") => "fal-ai/kling-video/v2.1/standard/image-to-video",
        ("v2.1", "image-to-video-pro") => "fal-ai/kling-video/v2.1/pro/image-to-video",
        _ => return None,
    };
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_pairs_resolve() {
        assert_eq!(
            queue_path("v2.6", "motion-control-pro"),
            Some("fal-ai/kling-video/v2.6/pro/motion-control")
        );
        assert_eq!(
            queue_path("v2.1", "image-to-video-standard"),
            Some("fal-ai/kling-video/v2.1/standard/image-to-video")
        );
    }

    #[test]
    fn unknown_pairs_do_not_fall_back() {
        assert_eq!(queue_path("v2.1", "text-to-video"), None);
        assert_eq!(queue_path("v3.0", "text-to-video"), None);
        assert_eq!(queue_path("", ""), None);
    }
}
