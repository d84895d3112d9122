//! Mock SMTP relay for submission tests.
//!
//! Speaks just enough of the protocol for the mailer's transaction:
//! greeting, EHLO, AUTH LOGIN, MAIL FROM, RCPT TO, DATA, QUIT. Commands
//! and message bodies are recorded for assertions, and the DATA response
//! can be scripted to inject failures.
#![allow(dead_code)] // test utility module, not every test uses every helper

use std::{net::SocketAddr, sync::Arc};

use parking_lot::Mutex;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Response to the end-of-data marker; `(250, "ok")` accepts.
    pub data_response: (u16, String),
    /// Reject AUTH attempts outright.
    pub reject_auth: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            data_response: (250, "ok".to_string()),
            reject_auth: false,
        }
    }
}

pub struct MockSmtpServer {
    addr: SocketAddr,
    commands: Arc<Mutex<Vec<String>>>,
    messages: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl MockSmtpServer {
    pub async fn start() -> Self {
        Self::start_with(MockConfig::default()).await
    }

    pub async fn start_with(config: MockConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock relay");
        let addr = listener.local_addr().expect("local addr");
        let commands = Arc::new(Mutex::new(Vec::new()));
        let messages = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let commands = Arc::clone(&commands);
            let messages = Arc::clone(&messages);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let commands = Arc::clone(&commands);
                    let messages = Arc::clone(&messages);
                    let config = config.clone();
                    tokio::spawn(async move {
                        let _ = serve_session(stream, &config, &commands, &messages).await;
                    });
                }
            })
        };

        Self {
            addr,
            commands,
            messages,
            handle,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Every command line received, in order.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    /// Every message body received via DATA.
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for MockSmtpServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn serve_session(
    stream: TcpStream,
    config: &MockConfig,
    commands: &Mutex<Vec<String>>,
    messages: &Mutex<Vec<String>>,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    writer.write_all(b"220 mock relay ready\r\n").await?;

    while let Some(line) = lines.next_line().await? {
        commands.lock().push(line.clone());
        let upper = line.to_ascii_uppercase();

        if upper.starts_with("EHLO") || upper.starts_with("HELO") {
            writer
                .write_all(b"250-mock.relay\r\n250 AUTH LOGIN\r\n")
                .await?;
        } else if upper.starts_with("AUTH LOGIN") {
            if config.reject_auth {
                writer.write_all(b"535 authentication failed\r\n").await?;
                continue;
            }
            // Username prompt, then password prompt, then accept.
            writer.write_all(b"334 VXNlcm5hbWU6\r\n").await?;
            if let Some(user) = lines.next_line().await? {
                commands.lock().push(user);
            }
            writer.write_all(b"334 UGFzc3dvcmQ6\r\n").await?;
            if let Some(pass) = lines.next_line().await? {
                commands.lock().push(pass);
            }
            writer.write_all(b"235 authenticated\r\n").await?;
        } else if upper.starts_with("MAIL FROM") || upper.starts_with("RCPT TO") {
            writer.write_all(b"250 ok\r\n").await?;
        } else if upper.starts_with("DATA") {
            writer.write_all(b"354 end with <CRLF>.<CRLF>\r\n").await?;

            let mut body = String::new();
            while let Some(data_line) = lines.next_line().await? {
                if data_line == "." {
                    break;
                }
                body.push_str(&data_line);
                body.push('\n');
            }
            messages.lock().push(body);

            let (code, text) = &config.data_response;
            writer
                .write_all(format!("{code} {text}\r\n").as_bytes())
                .await?;
        } else if upper.starts_with("QUIT") {
            writer.write_all(b"221 bye\r\n").await?;
            break;
        } else {
            writer.write_all(b"500 unrecognised\r\n").await?;
        }
    }

    Ok(())
}
