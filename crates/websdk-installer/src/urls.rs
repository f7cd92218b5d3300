//! URL helpers for OAuth redirects.

use crate::InstallerError;
use websdk_core::{OAuthVersion, REDIRECT_MARKER, Session};

/// Split off a `#fragment`, if any.
fn split_fragment(url: &str) -> (&str, Option<&str>) {
    match url.split_once('#') {
        Some((rest, fragment)) => (rest, Some(fragment)),
        None => (url, None),
    }
}

/// Append `param` to the query string, keeping any fragment last.
fn append_param(url: &str, param: &str) -> String {
    let (rest, fragment) = split_fragment(url);
    let sep = if rest.contains('?') { '&' } else { '?' };
    let mut out = format!("{rest}{sep}{param}");
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

/// True when the URL's query string carries the redirect marker.
pub fn has_redirect_marker(url: &str) -> bool {
    let (rest, _) = split_fragment(url);
    rest.split_once('?')
        .is_some_and(|(_, query)| query.split('&').any(|p| p == REDIRECT_MARKER))
}

/// Remove the redirect marker, keeping every other parameter.
pub fn strip_redirect_marker(url: &str) -> String {
    let (rest, fragment) = split_fragment(url);
    let mut out = match rest.split_once('?') {
        Some((base, query)) => {
            let kept: Vec<&str> = query
                .split('&')
                .filter(|p| !p.is_empty() && *p != REDIRECT_MARKER)
                .collect();
            if kept.is_empty() {
                base.to_string()
            } else {
                format!("{base}?{}", kept.join("&"))
            }
        }
        None => rest.to_string(),
    };
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

/// The host URL an integration should hand to OAuth providers as callback.
///
/// Adds the redirect marker unless an `integration=` parameter is already
/// present.
pub fn redirect_url(current: &str) -> String {
    if current.contains("integration=") {
        current.to_string()
    } else {
        append_param(current, REDIRECT_MARKER)
    }
}

/// Who an OAuth URL is being built for.
#[derive(Debug, Clone, Copy)]
pub struct OAuthTarget<'a> {
    pub ref_type: &'a str,
    pub instance_id: &'a str,
    pub session: Option<&'a Session>,
}

/// Resolve the authorization URL for linking a third-party provider.
///
/// An override pushed earlier by the integration is used verbatim as the
/// base; otherwise the base is derived from the session's auth URL. Either
/// way `redirect_to` and the contextual identifiers are appended.
pub fn app_oauth_url(
    target: &OAuthTarget<'_>,
    override_url: Option<&str>,
    redirect_to: &str,
    version: Option<OAuthVersion>,
    baseuri: Option<&str>,
) -> Result<String, InstallerError> {
    let mut url = match override_url {
        Some(url) => url.to_string(),
        None => {
            let session = target.session.ok_or(InstallerError::MissingSession)?;
            let auth_url = session.auth_url.trim_end_matches('/');
            match version {
                Some(OAuthVersion::Version1) => format!(
                    "{auth_url}/oauth1/{}/{}/{}",
                    target.ref_type,
                    target.instance_id,
                    urlencoding::encode(baseuri.unwrap_or_default())
                ),
                _ => format!("{auth_url}/oauth/{}", target.ref_type),
            }
        }
    };

    url = append_param(&url, &format!("redirect_to={}", urlencoding::encode(redirect_to)));
    if let Some(session) = target.session {
        url = append_param(&url, &format!("customer_id={}", urlencoding::encode(&session.customer.id)));
        url = append_param(&url, &format!("user_id={}", urlencoding::encode(&session.user.id)));
    }
    url = append_param(
        &url,
        &format!("integration_instance_id={}", urlencoding::encode(target.instance_id)),
    );
    Ok(url)
}
