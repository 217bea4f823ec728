//! Thin HTTP glue (§4.9): the fabric's core never parses application HTTP,
//! it just needs to pull a URL/query back out of a request and hand a caller
//! a JSON or HTML response in the shape the control plane expects.

use std::collections::HashMap;

use axum::http::{StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use serde::Serialize;
use serde_json::json;

/// Reconstructs the full request URL (scheme + host + path + query) the way
/// the source's `Req2Url` stitches `r.Host` and `r.RequestURI` together.
pub fn req_to_url(uri: &Uri, host: &str) -> String {
    format!("http://{host}{uri}")
}

/// Same, with the query string stripped.
pub fn req_to_url_no_query(uri: &Uri, host: &str) -> String {
    format!("http://{host}{}", uri.path())
}

/// The request's query string, parsed into a flat map. Unlike `url::Url`'s
/// `query_pairs`, a bare `?flag` key with no `=` still shows up with an
/// empty value, matching the control plane's `?{neuronId}-start` usage.
pub fn req_to_query(uri: &Uri) -> HashMap<String, String> {
    uri.query()
        .map(|q| {
            q.split('&')
                .filter(|pair| !pair.is_empty())
                .map(|pair| {
                    let mut it = pair.splitn(2, '=');
                    let key = it.next().unwrap_or_default().to_string();
                    let value = it.next().unwrap_or_default().to_string();
                    (key, value)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Splits a full URL string into its host and path, the source's
/// `Url2HostPath` used to turn a forward target string into dial components.
pub fn url_to_host_path(raw: &str) -> (String, String) {
    match url::Url::parse(raw) {
        Ok(parsed) => (parsed.host_str().unwrap_or_default().to_string(), parsed.path().to_string()),
        Err(_) => (String::new(), raw.to_string()),
    }
}

/// Wraps one of the §7 taxonomy codes and a payload into a JSON body — the
/// shape the start/stop control plane answers with (§6, scenario S6).
pub fn code_response(code: i32, payload: impl Serialize) -> Response {
    axum::Json(json!({ "code": code, "payload": payload })).into_response()
}

/// An inline HTML error page for routes outside the JSON control surface
/// (unmatched static paths, WS upgrade failures).
pub fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Html(format!("<html><body><h1>{status}</h1><p>{message}</p></body></html>"))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_parses_bare_flag_as_empty_value() {
        let uri: Uri = "/svc?neuronId-start".parse().unwrap();
        let q = req_to_query(&uri);
        assert_eq!(q.get("neuronId-start"), Some(&String::new()));
    }

    #[test]
    fn query_parses_key_value_pairs() {
        let uri: Uri = "/svc?a=1&b=2".parse().unwrap();
        let q = req_to_query(&uri);
        assert_eq!(q.get("a"), Some(&"1".to_string()));
        assert_eq!(q.get("b"), Some(&"2".to_string()));
    }

    #[test]
    fn host_path_splits_a_full_url() {
        let (host, path) = url_to_host_path("http://example.com:9000/forward");
        assert_eq!(host, "example.com:9000");
        assert_eq!(path, "/forward");
    }

    #[test]
    fn host_path_falls_back_on_unparsable_input() {
        let (host, path) = url_to_host_path("not a url");
        assert_eq!(host, "");
        assert_eq!(path, "not a url");
    }
}
