#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use futures_util::StreamExt;
use quote_poller::model::{CanonicalQuote, Market, Symbol, SymbolPair};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

pub type ServerSocket = WebSocketStream<TcpStream>;

pub fn pair(id: i64, base: &str, quote: &str) -> SymbolPair {
    SymbolPair {
        id,
        market: Market {
            id: 1,
            name: "spot".to_string(),
        },
        base: Symbol {
            id: id * 10,
            name: base.to_string(),
        },
        quote: Symbol {
            id: id * 10 + 1,
            name: quote.to_string(),
        },
    }
}

/// Runs a local websocket server that plays `script` on every accepted
/// connection, in order. Returns the `ws://` endpoint.
pub async fn serve<F, Fut>(script: F) -> (String, JoinHandle<()>)
where
    F: Fn(usize, ServerSocket) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}", listener.local_addr().unwrap());

    let server = tokio::spawn(async move {
        let mut accepted = 0;
        while let Ok((stream, _)) = listener.accept().await {
            let socket = accept_async(stream).await.unwrap();
            tokio::spawn(script(accepted, socket));
            accepted += 1;
        }
    });

    (endpoint, server)
}

/// Next text frame sent by the client.
pub async fn next_text(socket: &mut ServerSocket) -> String {
    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => return text,
            Some(Ok(_)) => continue,
            other => panic!("expected a text frame, got {:?}", other),
        }
    }
}

/// Reads until the client hangs up.
pub async fn drain(mut socket: ServerSocket) {
    while let Some(Ok(message)) = socket.next().await {
        if message.is_close() {
            break;
        }
    }
}

pub async fn recv_quote(quotes: &flume::Receiver<CanonicalQuote>) -> CanonicalQuote {
    tokio::time::timeout(Duration::from_secs(5), quotes.recv_async())
        .await
        .expect("no quote within 5s")
        .expect("quote channel closed")
}
