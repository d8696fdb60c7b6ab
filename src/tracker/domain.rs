use std::sync::Arc;

use tracing::debug;
use url::Url;

/// Normalized host of a trackable page, e.g. `example.com` for `https://www.example.com/a`.
pub type Domain = Arc<str>;

/// Maps a page address to the domain time is credited to. Anything that is not a plain web page
/// (browser internals, extension pages, local files, unparseable input) is not trackable.
pub fn resolve_domain(address: &str) -> Option<Domain> {
    let url = match Url::parse(address) {
        Ok(url) => url,
        Err(e) => {
            debug!("Not tracking unparseable address {address:?}: {e}");
            return None;
        }
    };

    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    let host = url.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    if host.is_empty() {
        return None;
    }
    Some(host.into())
}

/// Normalizes a domain typed by the user (`www.Example.com`, `example.com/page`, a full address)
/// the same way page addresses are.
pub fn parse_domain_input(input: &str) -> Option<Domain> {
    let input = input.trim();
    if input.contains("://") {
        resolve_domain(input)
    } else {
        resolve_domain(&format!("https://{input}"))
    }
}
