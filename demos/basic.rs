//! Minimal palisade example: a form protected by the CSRF firewall, and a
//! counter kept in an encrypted cookie.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl -i -c jar -b jar http://localhost:3000/
//!   curl -i -c jar -b jar -X POST http://localhost:3000/      ← 412, no token
//!   curl -i -c jar -b jar -X POST http://localhost:3000/ \
//!        -H "x-csrf-token: $(awk '/csrf-token/ {print $7}' jar)"

use std::sync::Arc;

use palisade::middleware::CsrfToken;
use palisade::{CookieQueue, HttpConfig, HttpCore, Request, Response, SecretEncrypter, Server, Target};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut config = HttpConfig::load_from("palisade.toml")?;
    config.middleware = ["trace", "cookies", "csrf", "csrf-firewall"].map(String::from).to_vec();

    let mut core = HttpCore::new(config, Arc::new(SecretEncrypter::generate()))?;
    core.set_handler(Target::callable(index));

    Server::bind("0.0.0.0:3000".parse()?).serve(core).await?;
    Ok(())
}

// GET  /  → shows the visit counter and the form token
// POST /  → only reached with a valid token
async fn index(req: Request, _res: Response) -> serde_json::Value {
    let visits = req
        .cookie("visits")
        .and_then(|v| v.as_scalar())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;

    if let Some(queue) = req.attribute::<CookieQueue>() {
        queue.set("visits", visits.to_string());
    }

    let token = req.attribute::<CsrfToken>().map(|t| t.to_string());
    serde_json::json!({
        "method": req.method().as_str(),
        "visits": visits,
        "csrf": token,
    })
}
