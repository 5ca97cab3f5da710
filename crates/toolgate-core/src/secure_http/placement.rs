//! Finding `{alias}` placeholders in a request and substituting the secret.

use std::collections::BTreeMap;

use url::form_urlencoded::byte_serialize;
use url::Url;

use crate::result::PlaceholderLocation;

/// The parts of an agent-authored request a placeholder can appear in.
#[derive(Debug, Clone, Copy)]
pub struct RequestParts<'a> {
    pub url: &'a str,
    pub headers: &'a BTreeMap<String, String>,
    pub query: &'a BTreeMap<String, String>,
    pub body: Option<&'a str>,
}

/// Raw URL split into the text before `?`, the query string and the fragment.
fn split_url(raw: &str) -> (&str, Option<&str>, Option<&str>) {
    let (rest, fragment) = match raw.find('#') {
        Some(i) => (&raw[..i], Some(&raw[i + 1..])),
        None => (raw, None),
    };
    match rest.find('?') {
        Some(i) => (&rest[..i], Some(&rest[i + 1..]), fragment),
        None => (rest, None, fragment),
    }
}

/// Percent-encoded form of `value` as it appears in a query string.
pub fn query_encode(value: &str) -> String {
    byte_serialize(value.as_bytes()).collect()
}

/// Every location `placeholder` occurs in, in a fixed order (url, header,
/// query, body) and without duplicates.
pub fn locate(parts: &RequestParts<'_>, placeholder: &str) -> Vec<PlaceholderLocation> {
    let (base, url_query, fragment) = split_url(parts.url);
    let mut found = Vec::new();

    if base.contains(placeholder) || fragment.is_some_and(|f| f.contains(placeholder)) {
        found.push(PlaceholderLocation::Url);
    }
    if parts.headers.values().any(|v| v.contains(placeholder)) {
        found.push(PlaceholderLocation::Header);
    }
    if url_query.is_some_and(|q| q.contains(placeholder))
        || parts.query.values().any(|v| v.contains(placeholder))
    {
        found.push(PlaceholderLocation::Query);
    }
    if parts.body.is_some_and(|b| b.contains(placeholder)) {
        found.push(PlaceholderLocation::Body);
    }
    found
}

/// Request with the secret substituted. Holds secret material.
pub struct Interpolated {
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// Substitute `secret` for `placeholder` in headers, query values and body.
///
/// Callers must have rejected placeholders in the URL path already; the
/// text before `?` is left untouched. Placeholders in the URL's own query
/// string are replaced by the percent-encoded secret.
pub fn interpolate(
    parts: &RequestParts<'_>,
    placeholder: &str,
    secret: &str,
) -> Result<Interpolated, url::ParseError> {
    let (base, url_query, fragment) = split_url(parts.url);
    let mut raw = base.to_string();
    if let Some(query) = url_query {
        raw.push('?');
        raw.push_str(&query.replace(placeholder, &query_encode(secret)));
    }
    if let Some(fragment) = fragment {
        raw.push('#');
        raw.push_str(fragment);
    }

    let mut url = Url::parse(&raw)?;
    if !parts.query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in parts.query {
            pairs.append_pair(key, &value.replace(placeholder, secret));
        }
    }

    let headers = parts
        .headers
        .iter()
        .map(|(name, value)| (name.clone(), value.replace(placeholder, secret)))
        .collect();
    let body = parts.body.map(|b| b.replace(placeholder, secret));

    Ok(Interpolated { url, headers, body })
}
