//! Shared test support: scripted model-service servers and a mock device.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use mobile_agent::{Device, DeviceError, InstalledApp, Screenshot, SwipeCoords, SwipeDirection};

/// Read one HTTP request off the stream, returning `(path, body)`.
pub async fn read_request(stream: &mut TcpStream) -> Option<(String, String)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let header_end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let headers = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let path = headers
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string();
    let content_length: usize = headers
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse().ok())?
        })
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();
    Some((path, body))
}

pub async fn write_response(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Response rule: first rule whose path matches and whose marker (if any)
/// appears in the request body wins.
pub struct Rule {
    pub path: &'static str,
    pub body_contains: Option<&'static str>,
    pub response: String,
}

impl Rule {
    pub fn new(path: &'static str, body_contains: Option<&'static str>, response: String) -> Self {
        Self {
            path,
            body_contains,
            response,
        }
    }
}

/// HTTP server answering from a fixed rule list, counting hits per path.
pub struct ScriptedServer {
    pub host: String,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl ScriptedServer {
    pub async fn start(rules: Vec<Rule>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let host = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());
        let hits: Arc<Mutex<HashMap<String, usize>>> = Arc::default();
        let rules = Arc::new(rules);

        let hits_handle = hits.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let rules = rules.clone();
                let hits = hits_handle.clone();
                tokio::spawn(async move {
                    let Some((path, body)) = read_request(&mut stream).await else {
                        return;
                    };
                    *hits.lock().unwrap().entry(path.clone()).or_insert(0) += 1;
                    let matched = rules.iter().find(|rule| {
                        rule.path == path
                            && rule
                                .body_contains
                                .map_or(true, |marker| body.contains(marker))
                    });
                    match matched {
                        Some(rule) => write_response(&mut stream, "200 OK", &rule.response).await,
                        None => write_response(&mut stream, "404 Not Found", "{}").await,
                    }
                });
            }
        });

        Self { host, hits }
    }

    pub fn hits(&self, path: &str) -> usize {
        *self.hits.lock().unwrap().get(path).unwrap_or(&0)
    }
}

/// Server that fails the first `failures` requests with a 500 (or with a
/// non-JSON 200 when `malformed` is set), then serves `body`.
pub struct FlakyServer {
    pub host: String,
    requests: Arc<AtomicUsize>,
}

impl FlakyServer {
    pub async fn start(failures: usize, malformed: bool, body: String) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let host = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());
        let requests = Arc::new(AtomicUsize::new(0));

        let counter = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                if read_request(&mut stream).await.is_none() {
                    continue;
                }
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < failures {
                    if malformed {
                        write_response(&mut stream, "200 OK", "this is not json").await;
                    } else {
                        write_response(&mut stream, "500 Internal Server Error", "{}").await;
                    }
                } else {
                    write_response(&mut stream, "200 OK", &body).await;
                }
            }
        });

        Self { host, requests }
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

/// Server that accepts requests and never answers them.
pub struct BlackHoleServer {
    pub host: String,
}

impl BlackHoleServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let host = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let _ = read_request(&mut stream).await;
                    tokio::time::sleep(std::time::Duration::from_secs(120)).await;
                });
            }
        });
        Self { host }
    }
}

pub fn tiny_png() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(64, 128, image::Rgb([40, 40, 40]));
    let mut buf = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

/// Mock device recording every mutating call through a shared handle.
pub struct MockDevice {
    pub calls: Arc<Mutex<Vec<String>>>,
    pub home_screen: bool,
    pub keyboard_open: bool,
    pub apps: Vec<InstalledApp>,
}

impl MockDevice {
    pub fn new() -> (Self, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let device = Self {
            calls: calls.clone(),
            home_screen: false,
            keyboard_open: false,
            apps: Vec::new(),
        };
        (device, calls)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Device for MockDevice {
    fn screenshot(&mut self) -> Result<Screenshot, DeviceError> {
        Screenshot::from_png(tiny_png())
    }

    fn screen_size(&mut self) -> Result<(u32, u32), DeviceError> {
        Ok((64, 128))
    }

    fn tap(&mut self, x: i32, y: i32) -> Result<(), DeviceError> {
        self.record(format!("tap {x} {y}"));
        Ok(())
    }

    fn type_text(&mut self, text: &str) -> Result<(), DeviceError> {
        self.record(format!("type {text}"));
        Ok(())
    }

    fn swipe(&mut self, direction: SwipeDirection) -> Result<SwipeCoords, DeviceError> {
        self.record(format!("swipe {direction:?}"));
        Ok(mobile_agent::swipe_endpoints(direction, 64, 128))
    }

    fn home(&mut self) -> Result<(), DeviceError> {
        self.record("home".to_string());
        Ok(())
    }

    fn is_keyboard_open(&mut self) -> Result<bool, DeviceError> {
        Ok(self.keyboard_open)
    }

    fn is_home_screen(&mut self) -> Result<bool, DeviceError> {
        Ok(self.home_screen)
    }

    fn launch_app(&mut self, app_id: &str) -> Result<(), DeviceError> {
        self.record(format!("launch {app_id}"));
        Ok(())
    }

    fn installed_apps(&mut self) -> Result<Vec<InstalledApp>, DeviceError> {
        Ok(self.apps.clone())
    }
}

/// Chat-completions reply body carrying `content`.
pub fn chat_reply(content: &str) -> String {
    serde_json::json!({
        "choices": [{"message": {"role": "assistant", "content": content}}]
    })
    .to_string()
}

/// Worker reply body carrying `text`.
pub fn worker_reply(text: &str) -> String {
    serde_json::json!({"exit_code": 0, "text": text}).to_string()
}
