/// Path parameter for `/groups/:id`; nested groups are url-encoded.
pub(crate) fn encode_group(group: &str) -> anyhow::Result<String> {
    let segments: Vec<&str> = group
        .trim_matches('/')
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();
    if segments.is_empty() {
        anyhow::bail!("gitlab group is not configured");
    }
    Ok(segments.join("%2F"))
}

pub(crate) fn normalize_branch(value: Option<String>) -> Option<String> {
    value
        .map(|branch| branch.trim_start_matches("refs/heads/").to_string())
        .filter(|branch| !branch.is_empty())
}
