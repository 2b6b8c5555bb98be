//! CSRF header + re-login policy.
//!
//! Every call carries the current session and CSRF tokens. When the server
//! expires the session (every third greeting) the listener logs in again,
//! rotates both tokens and resends the call; the application only ever sees
//! successful greetings.
//!
//! Run with: cargo run --bin csrf-relogin

use std::sync::Arc;

use rpc_wrapper::policy::{Chain, HeaderListener, ReauthContext, ReauthListener};
use rpc_wrapper::{ClientError, RpcClient, RpcWrapper};
use rpc_wrapper_examples::{CSRF_HEADER, SESSION_HEADER, greeting_payload, server_addr, spawn_server};

/// Stamps session and CSRF headers; logs in again on 401.
type SessionPolicy = Chain<Chain<Arc<HeaderListener>, Arc<HeaderListener>>, ReauthListener>;

fn session_policy(login: RpcClient) -> Result<SessionPolicy, ClientError> {
    let session = Arc::new(HeaderListener::try_new(SESSION_HEADER, "none")?);
    let csrf = Arc::new(HeaderListener::try_new(CSRF_HEADER, "none")?);

    let (session_slot, csrf_slot) = (session.clone(), csrf.clone());
    let reauth = ReauthListener::new(move || {
        let login = login.clone();
        let session = session_slot.clone();
        let csrf = csrf_slot.clone();
        async move {
            tracing::info!("session expired, logging in again");
            let response = login.call(bytes::Bytes::new()).await?;
            let (token, csrf_token) = response
                .text()
                .and_then(|text| text.split_once('|'))
                .ok_or_else(|| ClientError::invocation("malformed login response"))?;
            session.set_value(token)?;
            csrf.set_value(csrf_token)
        }
    });

    Ok(Chain::new(Chain::new(session, csrf), reauth))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let addr = spawn_server(server_addr()?).await?;
    let base = format!("http://{}", addr);
    println!("=== Example: CSRF + re-login policy ===");
    println!("Server listening on {}", base);
    println!();

    let login = RpcClient::builder(format!("{}/app/login", base)).build()?;
    let wrapper = RpcWrapper::<ReauthContext>::with_listener(Arc::new(session_policy(login)?));
    let client = wrapper.wrap(
        RpcClient::builder(format!("{}/app/greet", base))
            .content_type("text/x-gwt-rpc; charset=utf-8")
            .build()?,
    );

    for name in ["alice", "bob", "carol", "dave", "erin", "frank"] {
        let response = client.call(greeting_payload(name)).await?;
        println!(
            "{} -> {} {}",
            name,
            response.status(),
            response.text().unwrap_or("<binary>")
        );
    }

    Ok(())
}
