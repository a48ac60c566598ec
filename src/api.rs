//! Agent API URLs

const PROTOCOL: &str = "https://";
const AGENT_API: &str = "/api/v1/agent/";

/// Build `https://<endpoint>/api/v1/agent/<arg>/<arg>...`
///
/// Trailing slashes on the endpoint and surrounding slashes on each argument
/// are trimmed.
pub fn join_url(endpoint: &str, args: &[&str]) -> String {
    let path = args
        .iter()
        .map(|arg| arg.trim_matches('/'))
        .collect::<Vec<_>>()
        .join("/");

    format!(
        "{PROTOCOL}{}{AGENT_API}{path}",
        endpoint.trim_end_matches('/')
    )
}
