//! k6 script rendering.
//!
//! The script runs inside the runner container's own network namespace, so
//! loopback hosts in the target URL are pointed at the host gateway alias.

use tracing::debug;

use crate::models::RunSpec;

const LOOPBACK_HOSTS: [&str; 2] = ["localhost", "127.0.0.1"];

/// Replace every loopback host token in `url` with `gateway_alias`.
pub fn rewrite_loopback(url: &str, gateway_alias: &str) -> String {
    LOOPBACK_HOSTS
        .iter()
        .fold(url.to_string(), |acc, host| acc.replace(host, gateway_alias))
}

/// Render the k6 script for `spec`.
pub fn generate_script(spec: &RunSpec, gateway_alias: &str) -> String {
    let url = rewrite_loopback(&spec.target_url, gateway_alias);
    if url != spec.target_url {
        debug!("Rewrote loopback target for container network: {}", url);
    }

    let payload = spec.effective_body().unwrap_or("null");

    format!(
        r#"import http from 'k6/http';
import {{ check, sleep }} from 'k6';

export const options = {{
  vus: {vus},
  duration: '{duration}s',
}};

export default function () {{
  const url = '{url}';
  const method = '{method}';
  const payload = {payload};
  const params = {{
    headers: {{ 'Content-Type': 'application/json' }},
  }};
  const bodyToSend = (method === 'POST' || method === 'PUT') && payload !== null ? JSON.stringify(payload) : null;
  const res = http.request(method, url, bodyToSend, params);
  check(res, {{ 'status is 200': (r) => r.status == 200 }});
  sleep(1);
}}
"#,
        vus = spec.virtual_users,
        duration = spec.duration,
        url = js_single_quoted(&url),
        method = spec.method.as_str(),
        payload = payload,
    )
}

fn js_single_quoted(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HttpMethod;

    const ALIAS: &str = "host.docker.internal";

    #[test]
    fn test_get_against_localhost() {
        let spec = RunSpec::new("http://localhost:8080/hello", 10, 30);
        let script = generate_script(&spec, ALIAS);

        assert!(script.contains("const url = 'http://host.docker.internal:8080/hello';"));
        assert!(script.contains("vus: 10,"));
        assert!(script.contains("duration: '30s',"));
        assert!(script.contains("const method = 'GET';"));
        assert!(script.contains("const payload = null;"));
        assert!(!script.contains("localhost"));
    }

    #[test]
    fn test_every_loopback_occurrence_replaced() {
        let spec = RunSpec::new(
            "http://127.0.0.1:9000/proxy?to=http://localhost/x&alt=127.0.0.1",
            1,
            1,
        );
        let script = generate_script(&spec, ALIAS);

        assert!(!script.contains("127.0.0.1"));
        assert!(!script.contains("localhost"));
        assert_eq!(script.matches(ALIAS).count(), 3);
    }

    #[test]
    fn test_remote_url_untouched() {
        let spec = RunSpec::new("https://api.example.com/v1/items", 2, 5);
        let script = generate_script(&spec, ALIAS);
        assert!(script.contains("const url = 'https://api.example.com/v1/items';"));
        assert!(!script.contains(ALIAS));
    }

    #[test]
    fn test_deterministic() {
        let spec = RunSpec::new("http://localhost:8080/api", 50, 120)
            .with_method(HttpMethod::Post)
            .with_body(r#"{"name":"k6"}"#);
        assert_eq!(generate_script(&spec, ALIAS), generate_script(&spec, ALIAS));
    }

    #[test]
    fn test_body_ignored_for_get_and_delete() {
        for method in [HttpMethod::Get, HttpMethod::Delete] {
            let spec = RunSpec::new("http://example.com", 1, 1)
                .with_method(method)
                .with_body(r#"{"ignored":true}"#);
            let script = generate_script(&spec, ALIAS);
            assert!(script.contains("const payload = null;"));
            assert!(!script.contains("ignored"));
        }
    }

    #[test]
    fn test_body_embedded_for_post_and_put() {
        for method in [HttpMethod::Post, HttpMethod::Put] {
            let spec = RunSpec::new("http://example.com", 1, 1)
                .with_method(method)
                .with_body(r#"{"test": "data"}"#);
            let script = generate_script(&spec, ALIAS);
            assert!(script.contains(r#"const payload = {"test": "data"};"#));
            assert!(script.contains(&format!("const method = '{}';", method)));
        }
    }

    #[test]
    fn test_blank_body_is_null() {
        let spec = RunSpec::new("http://example.com", 1, 1)
            .with_method(HttpMethod::Post)
            .with_body(" \n ");
        assert!(generate_script(&spec, ALIAS).contains("const payload = null;"));

        let absent = RunSpec::new("http://example.com", 1, 1).with_method(HttpMethod::Put);
        assert!(generate_script(&absent, ALIAS).contains("const payload = null;"));
    }

    #[test]
    fn test_quote_in_url_is_escaped() {
        let spec = RunSpec::new("http://example.com/it's", 1, 1);
        let script = generate_script(&spec, ALIAS);
        assert!(script.contains(r"const url = 'http://example.com/it\'s';"));
    }
}
