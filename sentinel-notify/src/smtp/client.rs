//! SMTP client connection handling: plain TCP, STARTTLS upgrade, AUTH.

use std::sync::Arc;

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_rustls::{
    TlsConnector,
    rustls::{ClientConfig, RootCertStore, pki_types::ServerName},
};
use tracing::warn;

use super::{
    error::{ClientError, Result},
    response::Response,
};

const BUFFER_SIZE: usize = 4096;

/// Maximum response buffer size; a relay sending more than this per
/// response is misbehaving.
const MAX_BUFFER_SIZE: usize = 64 * 1024;

enum Connection {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl Connection {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(stream) => stream.write_all(data).await?,
            Self::Tls(stream) => stream.write_all(data).await?,
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = match self {
            Self::Plain(stream) => stream.read(buf).await?,
            Self::Tls(stream) => stream.read(buf).await?,
        };
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(n)
    }

    async fn upgrade_to_tls(self, domain: &str) -> Result<Self> {
        let Self::Plain(stream) = self else {
            return Err(ClientError::Tls("connection is already TLS".to_string()));
        };

        let mut roots = RootCertStore::empty();
        let certs = rustls_native_certs::load_native_certs();
        for cert in certs.certs {
            roots
                .add(cert)
                .map_err(|e| ClientError::Tls(format!("failed to add certificate: {e}")))?;
        }
        if !certs.errors.is_empty() {
            warn!(errors = ?certs.errors, "some system certificates could not be loaded");
        }

        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(config));
        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|e| ClientError::Tls(format!("invalid server name: {e}")))?;

        let tls = connector
            .connect(server_name, stream)
            .await
            .map_err(|e| ClientError::Tls(e.to_string()))?;

        Ok(Self::Tls(Box::new(tls)))
    }
}

/// One SMTP session against the relay.
pub struct SmtpClient {
    connection: Option<Connection>,
    buffer: Vec<u8>,
    filled: usize,
    server_domain: String,
}

impl SmtpClient {
    /// Connects and reads the server greeting.
    pub async fn connect(addr: &str, server_domain: String) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let mut client = Self {
            connection: Some(Connection::Plain(stream)),
            buffer: vec![0u8; BUFFER_SIZE],
            filled: 0,
            server_domain,
        };

        let greeting = client.read_response().await?;
        if !greeting.is_success() {
            return Err(rejected(&greeting));
        }
        Ok(client)
    }

    /// Sends one command line and reads the response.
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        let data = format!("{command}\r\n");
        self.connection_mut()?.send(data.as_bytes()).await?;
        self.read_response().await
    }

    pub async fn ehlo(&mut self, domain: &str) -> Result<Response> {
        let response = self.command(&format!("EHLO {domain}")).await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(rejected(&response))
        }
    }

    /// Issues STARTTLS and upgrades the connection on acceptance.
    pub async fn starttls(&mut self) -> Result<Response> {
        let response = self.command("STARTTLS").await?;
        if !response.is_success() {
            return Err(rejected(&response));
        }

        let connection = self
            .connection
            .take()
            .ok_or(ClientError::ConnectionClosed)?;
        let domain = self.server_domain.clone();
        self.connection = Some(connection.upgrade_to_tls(&domain).await?);
        // Anything buffered before the upgrade belonged to the plain session.
        self.filled = 0;

        Ok(response)
    }

    /// `AUTH LOGIN` with base64-encoded credentials.
    pub async fn auth_login(&mut self, username: &str, password: &str) -> Result<Response> {
        let challenge = self.command("AUTH LOGIN").await?;
        if !challenge.is_intermediate() {
            return Err(rejected(&challenge));
        }

        let challenge = self.command(&base64(username.as_bytes())).await?;
        if !challenge.is_intermediate() {
            return Err(rejected(&challenge));
        }

        let accepted = self.command(&base64(password.as_bytes())).await?;
        if accepted.is_success() {
            Ok(accepted)
        } else {
            Err(rejected(&accepted))
        }
    }

    pub async fn mail_from(&mut self, from: &str) -> Result<Response> {
        let response = self.command(&format!("MAIL FROM:<{from}>")).await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(rejected(&response))
        }
    }

    pub async fn rcpt_to(&mut self, to: &str) -> Result<Response> {
        let response = self.command(&format!("RCPT TO:<{to}>")).await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(rejected(&response))
        }
    }

    /// DATA, the message, and the end-of-data marker.
    ///
    /// The message is sent as-is plus a terminating CRLF where missing.
    pub async fn send_message(&mut self, message: &str) -> Result<Response> {
        let response = self.command("DATA").await?;
        if !response.is_intermediate() {
            return Err(rejected(&response));
        }

        let connection = self.connection_mut()?;
        connection.send(message.as_bytes()).await?;
        if !message.ends_with("\r\n") {
            connection.send(b"\r\n").await?;
        }
        connection.send(b".\r\n").await?;

        let response = self.read_response().await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(rejected(&response))
        }
    }

    pub async fn quit(&mut self) -> Result<Response> {
        self.command("QUIT").await
    }

    fn connection_mut(&mut self) -> Result<&mut Connection> {
        self.connection.as_mut().ok_or(ClientError::ConnectionClosed)
    }

    async fn read_response(&mut self) -> Result<Response> {
        loop {
            if let Some((response, consumed)) = Response::parse(&self.buffer[..self.filled])? {
                self.buffer.copy_within(consumed..self.filled, 0);
                self.filled -= consumed;
                return Ok(response);
            }

            if self.filled >= self.buffer.len() {
                let grown = self.buffer.len() * 2;
                if grown > MAX_BUFFER_SIZE {
                    return Err(ClientError::Parse(format!(
                        "response exceeds {MAX_BUFFER_SIZE} bytes"
                    )));
                }
                self.buffer.resize(grown, 0);
            }

            let connection = self
                .connection
                .as_mut()
                .ok_or(ClientError::ConnectionClosed)?;
            let n = connection.read(&mut self.buffer[self.filled..]).await?;
            self.filled += n;
        }
    }
}

fn rejected(response: &Response) -> ClientError {
    ClientError::Smtp {
        code: response.code,
        message: response.message(),
    }
}

/// Standard base64 alphabet, no line wrapping (credentials are short).
fn base64(data: &[u8]) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::with_capacity(data.len().div_ceil(3) * 4);

    for chunk in data.chunks(3) {
        let mut buf = [0u8; 3];
        buf[..chunk.len()].copy_from_slice(chunk);

        out.push(ALPHABET[(buf[0] >> 2) as usize] as char);
        out.push(ALPHABET[(((buf[0] & 0x03) << 4) | (buf[1] >> 4)) as usize] as char);
        out.push(if chunk.len() > 1 {
            ALPHABET[(((buf[1] & 0x0F) << 2) | (buf[2] >> 6)) as usize] as char
        } else {
            '='
        });
        out.push(if chunk.len() > 2 {
            ALPHABET[(buf[2] & 0x3F) as usize] as char
        } else {
            '='
        });
    }

    out
}
