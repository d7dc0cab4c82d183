//! Secret redaction for RPC endpoints in logs and debug output
//!
//! Hosted RPC URLs routinely embed an API key in the path, the query or the
//! userinfo. [`redact_url`] keeps only what is needed to tell endpoints apart.

use std::fmt::{self, Debug, Display};
use url::Url;

/// Wrapper that redacts its inner value when formatted or serialized.
///
/// ```ignore
/// tracing::info!(key = %Redacted(api_key), "Making request");
/// // Logs: key = <redacted>
/// ```
#[derive(Clone, Copy)]
pub struct Redacted<T>(pub T);

impl<T> Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl<T> Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl<T> serde::Serialize for Redacted<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        "<redacted>".serialize(serializer)
    }
}

/// Scheme, host and port of an RPC URL; anything after is replaced by `<redacted>`
///
/// Unparseable input is fully redacted.
pub fn redact_url(raw: &str) -> String {
    let Ok(url) = Url::parse(raw) else {
        return Redacted(raw).to_string();
    };
    let Some(host) = url.host_str() else {
        return Redacted(raw).to_string();
    };

    let mut out = format!("{}://{}", url.scheme(), host);
    if let Some(port) = url.port() {
        out.push_str(&format!(":{}", port));
    }

    let has_secret_parts = !url.username().is_empty()
        || url.password().is_some()
        || url.query().is_some()
        || !matches!(url.path(), "" | "/");
    if has_secret_parts {
        out.push_str("/<redacted>");
    }
    out
}
