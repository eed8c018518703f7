//! Share token handling: bootstrap tokens in, shareable links out.
//!
//! A share token is an opaque identifier for a source snapshot persisted by
//! the remote service. It travels in a `?share=<token>` query parameter:
//! appended to the channel URL at connect time to request replay, and
//! embedded in the public page URL when composing a link for display.

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use url::Url;

/// Query parameter carrying a stored-session token
pub const SHARE_PARAM: &str = "share";

/// Characters escaped when embedding a token in a query string
const QUERY_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'&')
    .add(b'=')
    .add(b'+')
    .add(b'%');

/// Extract a share token from a raw token or a pasted playground link.
pub fn extract_token(input: &str) -> String {
    if let Ok(url) = Url::parse(input)
        && let Some((_, token)) = url.query_pairs().find(|(key, _)| key == SHARE_PARAM)
    {
        return token.into_owned();
    }
    input.trim().to_string()
}

/// Attach `?share=<token>` to the channel URL for replay at connect time.
pub fn channel_url_with_token(base: &Url, token: &str) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut().append_pair(SHARE_PARAM, token);
    url
}

/// Fallback page URL when none is configured: the channel endpoint with an
/// http(s) scheme and no query.
pub fn page_from_channel(channel: &Url) -> Url {
    let mut page = channel.clone();
    let scheme = match channel.scheme() {
        "wss" => "https",
        _ => "http",
    };
    // set_scheme only rejects scheme classes that cannot occur here
    let _ = page.set_scheme(scheme);
    page.set_query(None);
    page.set_fragment(None);
    page
}

/// Composes public links from minted tokens.
pub struct ShareManager {
    page: Url,
}

impl ShareManager {
    pub fn new(page: Url) -> Self {
        Self { page }
    }

    /// `<origin><path>?share=<token>`: the page URL stripped of any query
    /// and fragment, with the token as its only parameter.
    pub fn link_for(&self, token: &str) -> String {
        let mut page = self.page.clone();
        page.set_query(None);
        page.set_fragment(None);
        format!(
            "{page}?{SHARE_PARAM}={}",
            utf8_percent_encode(token, QUERY_SET)
        )
    }
}
