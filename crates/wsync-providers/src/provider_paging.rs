use reqwest::header::HeaderMap;

/// Next page announced by GitLab; the header is empty on the last page.
pub(crate) fn next_page(headers: &HeaderMap) -> Option<u32> {
    headers
        .get("x-next-page")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u32>().ok())
}

pub(crate) fn total_pages(headers: &HeaderMap) -> Option<u32> {
    headers
        .get("x-total-pages")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u32>().ok())
}
