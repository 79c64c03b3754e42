//! Interactive OAuth consent flow
//!
//! One flow attempt owns the local callback port for its whole lifetime: the
//! listener is bound before the browser opens and dropped when the flow
//! resolves, so a concurrent attempt fails fast on the bind instead of
//! queueing. The browser round-trip is bounded by a wall-clock timeout.

use std::collections::HashMap;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{info, warn};

use super::provider::{google::GoogleProvider, OAuthProvider};
use super::provider::google::{generate_code_challenge, generate_code_verifier, generate_state};
use super::Credential;
use crate::common::{Error, Result};

/// Reference behavior: five minutes for the user to complete consent.
pub const CONSENT_TIMEOUT_SECS: u64 = 300;

/// Run one complete consent flow: bind the callback listener, open the
/// authorization URL, wait for the redirect, exchange the code.
pub async fn run_consent_flow(
    provider: &GoogleProvider,
    port: u16,
    timeout_secs: u64,
) -> Result<Credential> {
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .map_err(|_| Error::CallbackPortInUse(port))?;
    let redirect_uri = format!("http://127.0.0.1:{port}");

    let code_verifier = generate_code_verifier();
    let code_challenge = generate_code_challenge(&code_verifier);
    let state = generate_state();

    let auth_url = provider.authorize_url(
        &provider.default_scopes(),
        &state,
        &code_challenge,
        &redirect_uri,
    );

    // Best-effort launch; the URL is logged so the operator can open it by
    // hand when no browser is reachable.
    if let Err(e) = open::that(&auth_url) {
        warn!(error = %e, "could not open browser automatically");
    }
    info!(url = %auth_url, "waiting for OAuth consent callback");

    let code = timeout(
        Duration::from_secs(timeout_secs),
        wait_for_code(&listener, &state),
    )
    .await
    .map_err(|_| Error::ConsentTimeout(timeout_secs))??;

    // Release the port before the (possibly slow) exchange round-trip.
    drop(listener);

    let tokens = provider
        .exchange_code(&code, &code_verifier, &redirect_uri)
        .await?;

    info!("OAuth consent flow completed");
    Ok(Credential::from_tokens(tokens))
}

/// Accept connections until one delivers the authorization code.
///
/// Non-callback requests (favicon probes and the like) are ignored; a
/// callback with a wrong `state` or an `error` parameter fails the attempt.
async fn wait_for_code(listener: &TcpListener, expected_state: &str) -> Result<String> {
    loop {
        let (mut socket, _) = listener
            .accept()
            .await
            .map_err(|e| Error::OAuth(format!("callback listener error: {e}")))?;

        let mut reader = BufReader::new(&mut socket);
        let mut request_line = String::new();
        reader
            .read_line(&mut request_line)
            .await
            .map_err(|e| Error::OAuth(format!("callback read error: {e}")))?;

        // Request line: "GET /path?query HTTP/1.1"
        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() < 2 {
            continue;
        }

        let path_and_query = parts[1];
        let query = match path_and_query.find('?') {
            Some(idx) => &path_and_query[idx + 1..],
            None => "",
        };
        let params = parse_query_params(query);

        if let (Some(code), Some(received_state)) = (params.get("code"), params.get("state")) {
            if received_state != expected_state {
                let page = landing_page("Error: invalid state parameter. Please try again.");
                let _ = send_response(&mut socket, "400 Bad Request", &page).await;
                return Err(Error::StateMismatch);
            }

            let page = landing_page("Authentication successful! You can close this tab.");
            let _ = send_response(&mut socket, "200 OK", &page).await;
            return Ok(code.clone());
        }

        if let Some(error) = params.get("error") {
            let desc = params
                .get("error_description")
                .map(|s| s.as_str())
                .unwrap_or("unknown error");
            let page = landing_page(&format!("Error: {error} - {desc}"));
            let _ = send_response(&mut socket, "400 Bad Request", &page).await;
            return Err(Error::OAuth(format!("{error}: {desc}")));
        }

        // A callback hit with neither code nor error carries nothing usable.
        if path_and_query.starts_with("/?") || path_and_query == "/" {
            let page = landing_page("Error: no authorization code was received.");
            let _ = send_response(&mut socket, "400 Bad Request", &page).await;
            return Err(Error::MissingAuthCode);
        }
    }
}

/// Parse URL query parameters into a map.
fn parse_query_params(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|part| {
            let mut split = part.splitn(2, '=');
            match (split.next(), split.next()) {
                (Some(key), Some(value)) => {
                    let decoded = urlencoding::decode(value).ok()?;
                    Some((key.to_string(), decoded.into_owned()))
                }
                _ => None,
            }
        })
        .collect()
}

/// Send a minimal HTTP response to the browser.
async fn send_response(socket: &mut TcpStream, status: &str, html: &str) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\n\r\n{}",
        status,
        html.len(),
        html
    );
    socket.write_all(response.as_bytes()).await?;
    socket.flush().await?;
    Ok(())
}

fn landing_page(message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Geata - Google Authentication</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            background: #f4f4f5;
        }}
        .card {{
            background: white;
            padding: 2rem;
            border-radius: 12px;
            box-shadow: 0 10px 40px rgba(0,0,0,0.1);
            text-align: center;
            max-width: 400px;
        }}
        h1 {{ color: #333; margin-bottom: 1rem; }}
        p {{ color: #666; line-height: 1.6; }}
    </style>
</head>
<body>
    <div class="card">
        <h1>Geata</h1>
        <p>{}</p>
    </div>
</body>
</html>"#,
        message
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn send_callback(port: u16, path: &str) -> String {
        let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        client
            .write_all(format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n").as_bytes())
            .await
            .unwrap();
        client.flush().await.unwrap();
        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn test_parse_query_params() {
        let params = parse_query_params("code=4%2F0abc&state=deadbeef&scope=a%20b");
        assert_eq!(params.get("code").unwrap(), "4/0abc");
        assert_eq!(params.get("state").unwrap(), "deadbeef");
        assert_eq!(params.get("scope").unwrap(), "a b");
    }

    #[test]
    fn test_parse_query_params_ignores_bare_keys() {
        let params = parse_query_params("flag&code=x");
        assert_eq!(params.len(), 1);
        assert_eq!(params.get("code").unwrap(), "x");
    }

    #[tokio::test]
    async fn test_callback_delivers_code() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let waiter = tokio::spawn(async move {
            wait_for_code(&listener, "expected-state").await
        });

        let response = send_callback(port, "/?code=auth-code-1&state=expected-state").await;
        assert!(response.starts_with("HTTP/1.1 200"));

        let code = waiter.await.unwrap().unwrap();
        assert_eq!(code, "auth-code-1");
    }

    #[tokio::test]
    async fn test_callback_state_mismatch_fails_attempt() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let waiter = tokio::spawn(async move {
            wait_for_code(&listener, "expected-state").await
        });

        let response = send_callback(port, "/?code=auth-code-1&state=forged").await;
        assert!(response.starts_with("HTTP/1.1 400"));
        assert!(matches!(waiter.await.unwrap(), Err(Error::StateMismatch)));
    }

    #[tokio::test]
    async fn test_callback_error_param_fails_attempt() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let waiter = tokio::spawn(async move {
            wait_for_code(&listener, "expected-state").await
        });

        send_callback(port, "/?error=access_denied&state=expected-state").await;
        match waiter.await.unwrap() {
            Err(Error::OAuth(msg)) => assert!(msg.contains("access_denied")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bare_callback_reports_missing_code() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let waiter = tokio::spawn(async move {
            wait_for_code(&listener, "expected-state").await
        });

        send_callback(port, "/").await;
        assert!(matches!(waiter.await.unwrap(), Err(Error::MissingAuthCode)));
    }

    #[tokio::test]
    async fn test_timeout_releases_port() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let result = timeout(Duration::from_millis(50), wait_for_code(&listener, "s")).await;
        assert!(result.is_err(), "no callback should mean timeout");
        drop(listener);

        // A subsequent flow attempt can bind the same port again.
        TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    }

    #[tokio::test]
    async fn test_second_flow_fails_fast_on_bound_port() {
        let holder = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = holder.local_addr().unwrap().port();

        let provider = GoogleProvider::new(crate::config::OAuthClient {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
        });

        match run_consent_flow(&provider, port, 1).await {
            Err(Error::CallbackPortInUse(p)) => assert_eq!(p, port),
            other => panic!("expected port conflict, got {other:?}"),
        }
    }
}
