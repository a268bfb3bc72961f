use std::collections::HashMap;
use std::io::{Read as _, Write as _};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
struct Route {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
    delay: Duration,
}

/// A local blog: routes are registered at runtime and every request is counted
/// by path (query string ignored).
pub struct SiteStub {
    pub base_url: String,
    routes: Arc<Mutex<HashMap<String, Route>>>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

#[allow(dead_code)]
impl SiteStub {
    pub fn spawn() -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start site stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}");

        let routes: Arc<Mutex<HashMap<String, Route>>> = Arc::default();
        let hits: Arc<Mutex<HashMap<String, usize>>> = Arc::default();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let server_routes = Arc::clone(&routes);
        let server_hits = Arc::clone(&hits);
        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let url = request.url().to_string();
                let path = url.split('?').next().unwrap_or(&url).to_owned();
                *server_hits.lock().unwrap().entry(path.clone()).or_default() += 1;

                let route = server_routes.lock().unwrap().get(&path).cloned();
                let Some(route) = route else {
                    let _ = request.respond(
                        tiny_http::Response::from_string("not found").with_status_code(404),
                    );
                    continue;
                };

                if !route.delay.is_zero() {
                    thread::sleep(route.delay);
                }

                let header = tiny_http::Header::from_bytes(
                    &b"Content-Type"[..],
                    route.content_type.as_bytes(),
                )
                .expect("build header");
                let response = tiny_http::Response::from_data(route.body)
                    .with_status_code(route.status)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            routes,
            hits,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn page(&self, path: &str, html: impl Into<String>) {
        self.route(path, 200, "text/html; charset=utf-8", html.into().into_bytes(), Duration::ZERO);
    }

    pub fn asset(&self, path: &str, bytes: &[u8]) {
        self.route(path, 200, "application/octet-stream", bytes.to_vec(), Duration::ZERO);
    }

    pub fn slow_asset(&self, path: &str, bytes: &[u8], delay: Duration) {
        self.route(path, 200, "application/octet-stream", bytes.to_vec(), delay);
    }

    pub fn status(&self, path: &str, status: u16) {
        self.route(path, status, "text/plain", b"unavailable".to_vec(), Duration::ZERO);
    }

    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.hits.lock().unwrap().values().sum()
    }

    fn route(
        &self,
        path: &str,
        status: u16,
        content_type: &'static str,
        body: Vec<u8>,
        delay: Duration,
    ) {
        self.routes.lock().unwrap().insert(
            path.to_owned(),
            Route {
                status,
                content_type,
                body,
                delay,
            },
        );
    }
}

impl Drop for SiteStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Serves a post page linking to `next_path` (when given), with the image
/// containers and audio link laid out like the archived blog.
#[allow(dead_code)]
pub fn post_html(
    title: &str,
    next_path: Option<&str>,
    images: &[(&str, &str)],
    audio_path: Option<&str>,
) -> String {
    let nav = match next_path {
        Some(next) => format!(
            r#"<div class="post-nav-next"><a href="{next}" title="Next: after {title}">next</a></div>"#
        ),
        None => String::new(),
    };
    let audio = match audio_path {
        Some(audio) => format!(r#"<p><a href="{audio}">Download episode</a></p>"#),
        None => String::new(),
    };
    let figures = images
        .iter()
        .enumerate()
        .map(|(idx, (src, caption))| {
            format!(
                r#"<div id="attachment_{idx}" class="wp-caption"><img src="{src}" alt="alt {caption}"><p class="wp-caption-text">{caption}</p></div>"#
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"<!doctype html>
<html>
  <head><title>{title}</title></head>
  <body>
    <h1>{title}</h1>
    <div class="post-content">
      {audio}
      {figures}
    </div>
    <nav class="post-navigation-inner">{nav}</nav>
  </body>
</html>
"#
    )
}

/// Accepts connections, announces `declared_len` bytes but sends only `body`
/// before closing. Returns the base URL and a connection counter.
#[allow(dead_code)]
pub fn spawn_truncating_server(declared_len: usize, body: &'static [u8]) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind truncating server");
    let base_url = format!("http://{}", listener.local_addr().expect("local addr"));
    let connections = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&connections);
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else {
                continue;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            read_request_head(&mut stream);
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: {declared_len}\r\nConnection: close\r\n\r\n"
            );
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(body);
            let _ = stream.flush();
        }
    });

    (base_url, connections)
}

/// Accepts connections and never answers them.
#[allow(dead_code)]
pub fn spawn_silent_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind silent server");
    let base_url = format!("http://{}", listener.local_addr().expect("local addr"));

    thread::spawn(move || {
        let mut held = Vec::new();
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else {
                continue;
            };
            read_request_head(&mut stream);
            held.push(stream);
        }
    });

    base_url
}

#[allow(dead_code)]
fn read_request_head(stream: &mut std::net::TcpStream) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let mut head = Vec::new();
    let mut buf = [0_u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
}
