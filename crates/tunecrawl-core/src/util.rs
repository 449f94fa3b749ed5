use url::Url;

/// Normalize a URL for use as a cache key.
///
/// Drops the fragment and sorts query pairs so that equivalent URLs map
/// to the same key; the `url` crate already lower-cases scheme and host.
/// Unparsable input is returned trimmed and otherwise unchanged.
pub fn normalize_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw.trim()) else {
        return raw.trim().to_string();
    };
    url.set_fragment(None);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        pairs.sort();
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }
    url.to_string()
}
