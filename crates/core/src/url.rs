//! URL canonicalization and archive-path helpers.
//!
//! Every URL entering the store passes through [`canonicalize_url`] so that
//! the same resource submitted from different front-ends collapses onto one
//! row: tracking parameters are stripped, common redirector wrappers are
//! unwrapped, and cosmetic differences (fragment, trailing slash, host case)
//! are removed.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::CoreError;

/// Query parameters that only identify the click, not the resource.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "igshid", "mc_cid", "mc_eid", "ref", "ref_src",
];

/// Redirector endpoints that wrap the real destination in a query
/// parameter: `(host, path, parameter)`.
const REDIRECTORS: &[(&str, &str, &str)] = &[
    ("www.google.com", "/url", "q"),
    ("google.com", "/url", "q"),
    ("l.facebook.com", "/l.php", "u"),
    ("lm.facebook.com", "/l.php", "u"),
    ("www.youtube.com", "/redirect", "q"),
    ("youtube.com", "/redirect", "q"),
];

fn is_tracking_param(name: &str) -> bool {
    name.starts_with("utm_") || TRACKING_PARAMS.contains(&name)
}

/// Unwrap one level of redirector indirection, if the URL points at a known
/// redirector endpoint and carries a destination parameter.
fn unwrap_redirector(url: &Url) -> Option<Url> {
    let host = url.host_str()?;
    let param = REDIRECTORS
        .iter()
        .find(|(redirector, path, _)| *redirector == host && url.path() == *path)
        .map(|(_, _, param)| *param)?;

    let target = url
        .query_pairs()
        .find(|(name, _)| name == param)
        .map(|(_, value)| value.into_owned())?;

    Url::parse(&target).ok().filter(|t| t.host_str().is_some())
}

/// Canonicalize a URL for storage.
///
/// Strips tracking parameters, unwraps redirector wrappers, drops the
/// fragment, lowercases scheme and host, and removes a trailing slash from
/// non-root paths. Returns an error for anything that is not an absolute
/// http(s) URL.
pub fn canonicalize_url(raw: &str) -> Result<String, CoreError> {
    let parsed = Url::parse(raw.trim()).map_err(|e| CoreError::InvalidUrl(e.to_string()))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(CoreError::InvalidUrl(format!(
            "unsupported scheme: {}",
            parsed.scheme()
        )));
    }
    if parsed.host_str().is_none() {
        return Err(CoreError::InvalidUrl("missing host".to_owned()));
    }

    // One unwrap level is enough in practice; nested wrappers are rare and
    // unwrapping again on the next insert converges anyway.
    let mut url = unwrap_redirector(&parsed).unwrap_or(parsed);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| !is_tracking_param(name))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (name, value) in &kept {
            serializer.append_pair(name, value);
        }
        url.set_query(Some(&serializer.finish()));
    }

    url.set_fragment(None);

    let mut out = url.to_string();
    // Url::parse already lowercases scheme and host; normalize the trailing
    // slash that `to_string` keeps on bare-path URLs.
    if out.ends_with('/') && url.path() == "/" && url.query().is_none() {
        out.pop();
    } else if url.path().len() > 1 && url.path().ends_with('/') && url.query().is_none() {
        out.pop();
    }

    Ok(out)
}

/// Whether a string parses as an absolute http(s) URL with a host.
#[must_use]
pub fn is_valid_url(raw: &str) -> bool {
    Url::parse(raw)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

/// Default domains that are never worth archiving.
const EXCLUDED_DOMAINS: &[&str] = &["localhost", "127.0.0.1", "0.0.0.0", "*.local", "*.internal"];

/// Whether a URL should be handed to the archiving pipeline.
///
/// Rejects invalid URLs and anything on the exclusion list (wildcard
/// patterns match domain suffixes).
#[must_use]
pub fn should_archive_url(raw: &str, exclude_domains: &[String]) -> bool {
    let Ok(url) = Url::parse(raw) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_lowercase();

    let defaults = EXCLUDED_DOMAINS.iter().map(|d| (*d).to_owned());
    for pattern in defaults.chain(exclude_domains.iter().cloned()) {
        if let Some(suffix) = pattern.strip_prefix("*.") {
            if host.ends_with(suffix) {
                return false;
            }
        } else if host == pattern {
            return false;
        }
    }
    true
}

/// Build the archive artifact filename for a URL:
/// `{domain}_{sha256(url)[:8]}_{YYYYMMDD_HHMMSS}.{ext}`.
///
/// The hash keeps special characters out of the filesystem; the timestamp
/// makes every archiving call produce a fresh artifact.
#[must_use]
pub fn archive_filename(url: &str, ext: &str, at: DateTime<Utc>) -> String {
    let domain = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_else(|| "unknown".to_owned())
        .replace(':', "_");

    let digest = Sha256::digest(url.as_bytes());
    let hash = hex::encode(&digest[..4]);

    format!("{domain}_{hash}_{}.{ext}", at.format("%Y%m%d_%H%M%S"))
}
