pub const BASE_URL: &str = "https://www.youtube.com";
pub const WATCH_URL: &str = "https://www.youtube.com/watch?v=";
pub const EMBED_URL: &str = "https://www.youtube.com/embed/";

/// Resolves a script reference found in a page against the watch URL.
pub fn absolutize(reference: &str) -> String {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        reference.to_string()
    } else if let Some(rest) = reference.strip_prefix("//") {
        format!("https://{}", rest)
    } else if reference.starts_with('/') {
        format!("{}{}", BASE_URL, reference)
    } else {
        format!("{}/{}", BASE_URL, reference)
    }
}

/// Decoded value of the first `name` query parameter of `url`.
pub fn query_param(url: &str, name: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    let query = query.split('#').next().unwrap_or(query);

    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key == name {
            urlencoding::decode(value).ok().map(|v| v.into_owned())
        } else {
            None
        }
    })
}

/// Replaces (or appends) the `name` query parameter, encoding `value`.
pub fn set_query_param(url: &str, name: &str, value: &str) -> String {
    let encoded = urlencoding::encode(value);
    let (base, fragment) = match url.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (url, None),
    };

    let mut out = match base.split_once('?') {
        Some((path, query)) => {
            let mut replaced = false;
            let mut pairs: Vec<String> = query
                .split('&')
                .filter(|pair| !pair.is_empty())
                .filter_map(|pair| {
                    let key = pair.split_once('=').map_or(pair, |(k, _)| k);
                    if key != name {
                        Some(pair.to_string())
                    } else if replaced {
                        None
                    } else {
                        replaced = true;
                        Some(format!("{}={}", name, encoded))
                    }
                })
                .collect();
            if !replaced {
                pairs.push(format!("{}={}", name, encoded));
            }
            format!("{}?{}", path, pairs.join("&"))
        }
        None => format!("{}?{}={}", base, name, encoded),
    };

    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolutize_forms() {
        assert_eq!(
            absolutize("/s/player/abc/player_ias.vflset/en_US/base.js"),
            "https://www.youtube.com/s/player/abc/player_ias.vflset/en_US/base.js"
        );
        assert_eq!(
            absolutize("//www.youtube.com/s/player/abc/base.js"),
            "https://www.youtube.com/s/player/abc/base.js"
        );
        assert_eq!(
            absolutize("https://www.youtube.com/s/player/abc/base.js"),
            "https://www.youtube.com/s/player/abc/base.js"
        );
    }

    #[test]
    fn test_query_param_roundtrip() {
        let url = "https://rr1.googlevideo.com/videoplayback?expire=1&n=abc%2Bd&itag=18";
        assert_eq!(query_param(url, "n").as_deref(), Some("abc+d"));
        assert_eq!(query_param(url, "sig"), None);

        let replaced = set_query_param(url, "n", "x/y");
        assert_eq!(
            replaced,
            "https://rr1.googlevideo.com/videoplayback?expire=1&n=x%2Fy&itag=18"
        );

        let appended = set_query_param(url, "sig", "SIG");
        assert!(appended.ends_with("&itag=18&sig=SIG"));
        assert_eq!(set_query_param("https://a.test/p", "n", "1"), "https://a.test/p?n=1");
    }
}
