//! AWS Bedrock cross-region inference-profile model-ID prefixing. GovCloud
//! is excluded; already-prefixed IDs pass through unchanged. The underlying
//! Bedrock documentation is the authority if this table and reality diverge
//! on APAC sub-regions.

const ALREADY_PREFIXED: &[&str] = &["global.", "us.", "eu.", "apac.", "au.", "jp."];

/// Model families known to require a cross-region inference profile prefix
/// when addressed outside their home region.
const CROSS_REGION_FAMILIES: &[&str] = &["anthropic.claude", "meta.llama", "amazon.nova", "mistral.", "cohere.command"];

fn region_prefix(region: &str) -> Option<&'static str> {
    if region.starts_with("us-gov-") {
        return None;
    }
    if region.starts_with("us-") {
        Some("us.")
    } else if region.starts_with("eu-") {
        Some("eu.")
    } else if matches!(region, "ap-northeast-1" | "ap-northeast-3") {
        Some("jp.")
    } else if matches!(region, "ap-southeast-2" | "ap-southeast-4") {
        Some("au.")
    } else if region.starts_with("ap-") {
        Some("apac.")
    } else {
        None
    }
}

pub fn bedrock_model_id(model_id: &str, region: &str) -> String {
    if ALREADY_PREFIXED.iter().any(|prefix| model_id.starts_with(prefix)) {
        return model_id.to_string();
    }
    if !CROSS_REGION_FAMILIES.iter().any(|family| model_id.starts_with(family)) {
        return model_id.to_string();
    }
    match region_prefix(region) {
        Some(prefix) => format!("{prefix}{model_id}"),
        None => model_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eu_region_gets_eu_prefix() {
        assert_eq!(bedrock_model_id("anthropic.claude-3-5-sonnet", "eu-central-1"), "eu.anthropic.claude-3-5-sonnet");
    }

    #[test]
    fn govcloud_is_never_prefixed() {
        assert_eq!(bedrock_model_id("anthropic.claude-3-5-sonnet", "us-gov-west-1"), "anthropic.claude-3-5-sonnet");
    }

    #[test]
    fn already_prefixed_ids_pass_through() {
        assert_eq!(bedrock_model_id("global.anthropic.claude-3-5-sonnet", "eu-central-1"), "global.anthropic.claude-3-5-sonnet");
        assert_eq!(bedrock_model_id("jp.anthropic.claude-3-5-sonnet", "eu-central-1"), "jp.anthropic.claude-3-5-sonnet");
    }

    #[test]
    fn unknown_family_is_never_prefixed() {
        assert_eq!(bedrock_model_id("stability.sd3", "eu-central-1"), "stability.sd3");
    }

    #[test]
    fn jp_and_au_sub_regions_take_precedence_over_generic_apac() {
        assert_eq!(bedrock_model_id("anthropic.claude-3-5-sonnet", "ap-northeast-1"), "jp.anthropic.claude-3-5-sonnet");
        assert_eq!(bedrock_model_id("anthropic.claude-3-5-sonnet", "ap-southeast-2"), "au.anthropic.claude-3-5-sonnet");
        assert_eq!(bedrock_model_id("anthropic.claude-3-5-sonnet", "ap-south-1"), "apac.anthropic.claude-3-5-sonnet");
    }
}
