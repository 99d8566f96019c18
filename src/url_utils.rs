//! URL normalization and resolution as pure string functions.
//!
//! Normalized form is the identity used by the visited set and the store,
//! so every URL entering the engine passes through [`normalize`] first.
//! Malformed input is returned after best-effort cleanup rather than
//! rejected; the crawl simply fails to fetch it later.

const INDEX_FILES: [&str; 4] = ["/index.html", "/index.php", "/index.htm", "/default.html"];

/// Canonicalize a URL string.
///
/// Lowercases the scheme and host, supplies a missing `http://` scheme,
/// repairs `http:/host` to `http://host`, drops fragments, collapses
/// duplicate slashes in the path, rewrites trailing index files
/// (`/index.html` and friends) to a bare directory, and strips the
/// trailing slash when the path is exactly `/`. Idempotent.
pub fn normalize(url: &str) -> String {
    let mut s = url.trim().to_string();
    if s.is_empty() {
        return s;
    }

    if let Some(pos) = s.find('#') {
        s.truncate(pos);
    }

    let (scheme, rest) = split_scheme(&s);
    let scheme = scheme.to_ascii_lowercase();
    let rest = rest.trim_start_matches('/');

    let (host, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, ""),
    };
    let host = host.to_ascii_lowercase();

    let mut path = collapse_slashes(path);
    for index in INDEX_FILES {
        if let Some(stripped) = path.strip_suffix(index) {
            path = format!("{stripped}/");
            break;
        }
    }
    if path == "/" {
        path.clear();
    }

    format!("{scheme}://{host}{path}")
}

/// Resolve `href` against `base_url` and normalize the result.
///
/// Absolute references pass straight through; `//host/...` inherits the
/// base scheme; `/path` replaces the base path; anything else is joined
/// onto the directory portion of the base with `.`/`..` segments resolved.
pub fn make_absolute(base_url: &str, href: &str) -> String {
    if href.is_empty() {
        return normalize(base_url);
    }
    let lower = href.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return normalize(href);
    }

    if let Some(rest) = href.strip_prefix("//") {
        let scheme = base_url
            .find("://")
            .map(|i| base_url[..i].to_ascii_lowercase())
            .unwrap_or_else(|| "http".to_string());
        return normalize(&format!("{scheme}://{rest}"));
    }

    let base = normalize(base_url);
    let host_end = match base.find("://") {
        Some(i) => base[i + 3..]
            .find('/')
            .map(|j| i + 3 + j)
            .unwrap_or(base.len()),
        None => base.len(),
    };

    if href.starts_with('/') {
        return normalize(&format!("{}{}", &base[..host_end], href));
    }

    // Relative reference: join onto the directory of the base path.
    let dir_end = base.rfind('/').filter(|&i| i >= host_end).map(|i| i + 1);
    let joined = match dir_end {
        Some(end) => format!("{}{}", &base[..end], href),
        None => format!("{base}/{href}"),
    };
    let joined = match joined.find("://").map(|i| i + 3) {
        Some(start) => match joined[start..].find('/') {
            Some(j) => {
                let split = start + j;
                format!(
                    "{}{}",
                    &joined[..split],
                    resolve_dot_segments(&joined[split..])
                )
            }
            None => joined,
        },
        None => joined,
    };
    normalize(&joined)
}

/// Host portion of a URL without the leading `www.` and without a port.
pub fn extract_domain(url: &str) -> String {
    let start = url.find("://").map(|i| i + 3).unwrap_or(0);
    let rest = &url[start..];
    let end = rest.find('/').unwrap_or(rest.len());
    let mut host = rest[..end].to_ascii_lowercase();
    if let Some(colon) = host.find(':') {
        host.truncate(colon);
    }
    host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
}

/// True when the URL's domain equals `domain`, or either is a subdomain
/// of the other.
pub fn is_same_domain(url: &str, domain: &str) -> bool {
    let url_domain = extract_domain(url);
    if url_domain.is_empty() || domain.is_empty() {
        return url_domain == domain;
    }
    url_domain == domain
        || url_domain.ends_with(&format!(".{domain}"))
        || domain.ends_with(&format!(".{url_domain}"))
}

/// Path portion of a URL (everything after the host), defaulting to `/`.
pub fn extract_path(url: &str) -> String {
    let start = url.find("://").map(|i| i + 3).unwrap_or(0);
    let rest = &url[start..];
    match rest.find('/') {
        Some(i) => rest[i..].to_string(),
        None => "/".to_string(),
    }
}

fn split_scheme(s: &str) -> (&str, &str) {
    let lower = s.to_ascii_lowercase();
    for scheme in ["https", "http"] {
        if lower.starts_with(scheme) && s[scheme.len()..].starts_with(':') {
            return (&s[..scheme.len()], &s[scheme.len() + 1..]);
        }
    }
    if let Some(i) = s.find("://") {
        return (&s[..i], &s[i + 3..]);
    }
    ("http", s)
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_slash = false;
    for c in path.chars() {
        if c == '/' {
            if !prev_slash {
                out.push(c);
            }
            prev_slash = true;
        } else {
            out.push(c);
            prev_slash = false;
        }
    }
    out
}

fn resolve_dot_segments(path: &str) -> String {
    let trailing_slash = path.ends_with('/');
    let mut stack: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            s => stack.push(s),
        }
    }
    let mut out = format!("/{}", stack.join("/"));
    if trailing_slash && !out.ends_with('/') {
        out.push('/');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_lowercases_scheme_and_host() {
        assert_eq!(normalize("HTTP://Example.COM/Path"), "http://example.com/Path");
    }

    #[test]
    fn normalize_prepends_scheme() {
        assert_eq!(normalize("example.com/a"), "http://example.com/a");
    }

    #[test]
    fn normalize_repairs_scheme_slashes() {
        assert_eq!(normalize("http:/example.com/a"), "http://example.com/a");
        assert_eq!(normalize("http:example.com"), "http://example.com");
    }

    #[test]
    fn normalize_drops_fragment_and_collapses_slashes() {
        assert_eq!(
            normalize("HTTP://Example.COM/a//b/index.html#x"),
            "http://example.com/a/b/"
        );
    }

    #[test]
    fn normalize_is_idempotent() {
        for input in [
            "HTTP://Example.COM/a//b/index.html#x",
            "http://example.com/index.html",
            "example.com",
            "https://example.com/",
            "http://example.com/a/default.html",
        ] {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "not idempotent for {input}");
        }
    }

    #[test]
    fn normalize_strips_bare_root_slash() {
        assert_eq!(normalize("https://example.com/"), "https://example.com");
        assert_eq!(normalize("http://example.com/index.html"), "http://example.com");
        assert_eq!(normalize("http://example.com/a/"), "http://example.com/a/");
    }

    #[test]
    fn normalize_empty_is_empty() {
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn make_absolute_passes_through_absolute() {
        assert_eq!(
            make_absolute("http://example.com/x", "https://other.com/y"),
            "https://other.com/y"
        );
    }

    #[test]
    fn make_absolute_resolves_parent_segments() {
        assert_eq!(
            make_absolute("http://example.com/x/y.html", "../z"),
            "http://example.com/z"
        );
        assert_eq!(
            make_absolute("http://example.com/a/b/c.html", "./d"),
            "http://example.com/a/b/d"
        );
    }

    #[test]
    fn make_absolute_protocol_relative_inherits_scheme() {
        assert_eq!(
            make_absolute("https://example.com/", "//cdn.example.com/a"),
            "https://cdn.example.com/a"
        );
    }

    #[test]
    fn make_absolute_root_relative_uses_base_host() {
        assert_eq!(
            make_absolute("https://example.com/x/y", "/docs"),
            "https://example.com/docs"
        );
    }

    #[test]
    fn make_absolute_relative_joins_directory() {
        assert_eq!(
            make_absolute("http://example.com/x/y.html", "z.html"),
            "http://example.com/x/z.html"
        );
        assert_eq!(
            make_absolute("http://example.com", "z.html"),
            "http://example.com/z.html"
        );
    }

    #[test]
    fn extract_domain_strips_www_and_port() {
        assert_eq!(extract_domain("http://www.Example.com:8080/a"), "example.com");
        assert_eq!(extract_domain("example.com/a"), "example.com");
        assert_eq!(extract_domain(""), "");
    }

    #[test]
    fn extract_domain_round_trips_absolute_refs() {
        let absolute = "https://sub.example.org/page";
        assert_eq!(
            extract_domain(&make_absolute("http://example.com/", absolute)),
            extract_domain(absolute)
        );
    }

    #[test]
    fn same_domain_accepts_subdomains_both_ways() {
        assert!(is_same_domain("http://example.com/a", "example.com"));
        assert!(is_same_domain("http://blog.example.com/a", "example.com"));
        assert!(is_same_domain("http://example.com/a", "blog.example.com"));
        assert!(!is_same_domain("http://notexample.com/a", "example.com"));
        assert!(!is_same_domain("http://example.org/a", "example.com"));
    }

    #[test]
    fn same_domain_of_own_extraction_holds() {
        let url = "http://www.example.com/about";
        assert!(is_same_domain(url, &extract_domain(url)));
    }

    #[test]
    fn extract_path_defaults_to_root() {
        assert_eq!(extract_path("http://example.com"), "/");
        assert_eq!(extract_path("http://example.com/a/b?q=1"), "/a/b?q=1");
    }
}
