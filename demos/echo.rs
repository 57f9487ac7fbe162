//! Echo - request/response over a named pipe.
//!
//! This example demonstrates:
//! - Serving requests with a [`Router`]
//! - Connecting a client with the builder pattern
//! - Sending a JSON body and reading the echoed response
//!
//! ```text
//! cargo run --example echo
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use streamwire::{
    verb, NamedPipeClient, NamedPipeServer, ReceiveRequest, Router, StreamingRequest, StreamingResponse,
};

/// Body of an echo request.
#[derive(Serialize, Deserialize, Debug)]
struct Message {
    text: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut router = Router::new();
    router.route(verb::POST, "/echo", |request: ReceiveRequest| async move {
        let message: Message = request.read_body_as_json().await.ok()?;
        let mut response = StreamingResponse::ok();
        response.set_body(&message).ok()?;
        Some(response)
    });

    let base_name = format!("streamwire-echo-{}", std::process::id());
    let server = Arc::new(NamedPipeServer::new(&base_name, Some(Arc::new(router)))?);
    let serving = {
        let server = server.clone();
        tokio::spawn(async move { server.start().await })
    };

    let client = NamedPipeClient::builder(&base_name)
        .auto_reconnect(false)
        .build()?;

    // Retry until the server is listening
    loop {
        match client.connect().await {
            Ok(()) => break,
            Err(_) => tokio::time::sleep(Duration::from_millis(10)).await,
        }
    }
    serving.await??;

    let mut request = StreamingRequest::new(verb::POST, "/echo");
    request.set_json_body(&Message {
        text: "hello".to_string(),
    })?;
    let response = client.send(request).await?;
    let echoed: Message = response.read_body_as_json().await?;
    println!("{} {:?}", response.status_code, echoed);

    client.disconnect().await;
    Ok(())
}
