use std::time::Duration;

use fcodex::{App, Request, Response, Router, Server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

async fn get(addr: std::net::SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    String::from_utf8(raw).unwrap()
}

#[tokio::test]
async fn serves_requests_and_shuts_down_gracefully() {
    async fn user(req: Request, res: Response) {
        res.json(&serde_json::json!({ "id": req.param("id") }));
    }

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = App::new(Router::new().mount("/api", Router::new().get("/users/:id", user)));

    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(
        Server::from_listener(listener).serve_with_shutdown(app, async {
            let _ = stopped.await;
        }),
    );

    let found = get(addr, "/api/users/42").await;
    assert!(found.starts_with("HTTP/1.1 200 OK"), "{found}");
    assert!(found.contains("content-type: application/json"), "{found}");
    assert!(found.ends_with(r#"{"id":"42"}"#), "{found}");

    let missing = get(addr, "/api/nope").await;
    assert!(missing.starts_with("HTTP/1.1 404 Not Found"), "{missing}");
    assert!(missing.ends_with("Not Found"), "{missing}");

    stop.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server drains and stops")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn invalid_bind_address_is_an_error() {
    let result = Server::bind("not-an-address")
        .serve_with_shutdown(App::new(Router::new()), async {})
        .await;
    assert!(matches!(result, Err(fcodex::Error::Addr(_))));
}
