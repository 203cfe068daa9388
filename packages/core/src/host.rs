//! Throttling key derivation.

use url::Url;

/// Host key shared by every job that does not talk to a remote site.
pub const LOCAL_HOST: &str = "localhost";

/// The only command whose input is treated as a remote location.
pub const INGEST_COMMAND: &str = "ingest";

/// Derive the host key for a job.
///
/// `ingest` jobs whose input parses as a URL with a host are keyed by that
/// hostname, lowercased and without a leading `www.`. Everything else shares
/// [`LOCAL_HOST`].
pub fn derive_host(command: &str, input: &str) -> String {
    if command != INGEST_COMMAND {
        return LOCAL_HOST.to_string();
    }

    let Ok(url) = Url::parse(input.trim()) else {
        return LOCAL_HOST.to_string();
    };

    match url.host_str() {
        Some(host) if !host.is_empty() => {
            let host = host.to_ascii_lowercase();
            host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
        }
        _ => LOCAL_HOST.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_urls_use_their_hostname() {
        assert_eq!(derive_host("ingest", "http://example.com/x"), "example.com");
        assert_eq!(derive_host("ingest", "https://WWW.Example.COM/watch?v=1"), "example.com");
        assert_eq!(derive_host("ingest", "https://media.example.com:8443/a"), "media.example.com");
    }

    #[test]
    fn non_urls_fall_back_to_localhost() {
        assert_eq!(derive_host("ingest", "/home/me/video.mkv"), LOCAL_HOST);
        assert_eq!(derive_host("ingest", "not a url"), LOCAL_HOST);
        assert_eq!(derive_host("ingest", "file:///tmp/a.mp4"), LOCAL_HOST);
    }

    #[test]
    fn other_commands_are_always_local() {
        assert_eq!(derive_host("metadata", "/local/file"), LOCAL_HOST);
        assert_eq!(derive_host("transcribe", "https://example.com/a"), LOCAL_HOST);
    }
}
