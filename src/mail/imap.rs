//! IMAP transport — raw tagged-command client over rustls.
//!
//! Blocking socket I/O, run under `spawn_blocking` so the async caller
//! stays responsive. One session per transport, opened lazily on the
//! first command and owned exclusively by the run.

use std::io::{Read as IoRead, Write as IoWrite};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::mail::MailTransport;

const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// IMAP connection parameters.
#[derive(Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

impl ImapConfig {
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>, password: SecretString) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password,
        }
    }
}

/// [`MailTransport`] backed by a real IMAP server.
pub struct ImapTransport {
    config: ImapConfig,
    session: Arc<Mutex<Option<ImapSession>>>,
}

impl ImapTransport {
    pub fn new(config: ImapConfig) -> Self {
        Self {
            config,
            session: Arc::new(Mutex::new(None)),
        }
    }

    /// Run `f` against the (lazily opened) session on the blocking pool.
    async fn with_session<T, F>(&self, f: F) -> Result<T, TransportError>
    where
        T: Send + 'static,
        F: FnOnce(&mut ImapSession) -> Result<T, TransportError> + Send + 'static,
    {
        let config = self.config.clone();
        let session = Arc::clone(&self.session);
        tokio::task::spawn_blocking(move || {
            let mut guard = session.lock().unwrap_or_else(|e| e.into_inner());
            let mut open = match guard.take() {
                Some(open) => open,
                None => ImapSession::open(&config)?,
            };
            let result = f(&mut open);
            *guard = Some(open);
            result
        })
        .await
        .map_err(|e| TransportError::TaskJoin(e.to_string()))?
    }
}

#[async_trait]
impl MailTransport for ImapTransport {
    async fn search(&self, subject: &str) -> Result<Vec<String>, TransportError> {
        let subject = subject.to_string();
        let ids = self
            .with_session(move |s| s.search_unseen(&subject))
            .await?;
        info!(count = ids.len(), "Unread messages matched subject filter");
        Ok(ids)
    }

    async fn fetch(&self, id: &str) -> Result<Vec<u8>, TransportError> {
        let id = id.to_string();
        self.with_session(move |s| s.fetch_rfc822(&id)).await
    }

    async fn mark_seen(&self, ids: &[String]) -> Result<(), TransportError> {
        let ids = ids.to_vec();
        self.with_session(move |s| {
            for id in &ids {
                if let Err(e) = s.store_seen(id) {
                    warn!(id = %id, error = %e, "Failed to mark message as seen");
                }
            }
            Ok(())
        })
        .await
    }
}

// ── Blocking session ────────────────────────────────────────────────

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

struct ImapSession {
    tls: TlsStream,
    tag_counter: u32,
}

impl ImapSession {
    /// Connect, negotiate TLS, log in, select INBOX.
    fn open(config: &ImapConfig) -> Result<Self, TransportError> {
        let tcp = TcpStream::connect((&*config.host, config.port)).map_err(|e| {
            TransportError::ConnectFailed {
                host: config.host.clone(),
                port: config.port,
                reason: e.to_string(),
            }
        })?;
        tcp.set_read_timeout(Some(READ_TIMEOUT))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name: rustls::pki_types::ServerName<'_> =
            rustls::pki_types::ServerName::try_from(config.host.clone())
                .map_err(|e| TransportError::Tls(e.to_string()))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| TransportError::Tls(e.to_string()))?;
        let tls = rustls::StreamOwned::new(conn, tcp);

        let mut session = Self {
            tls,
            tag_counter: 0,
        };

        let greeting = session.read_line()?;
        debug!(greeting = greeting.trim(), "IMAP server greeting");

        let login = session.command(&format!(
            "LOGIN \"{}\" \"{}\"",
            quote(&config.username),
            quote(config.password.expose_secret()),
        ))?;
        if !ok(&login) {
            return Err(TransportError::LoginFailed {
                user: config.username.clone(),
            });
        }

        let select = session.command("SELECT \"INBOX\"")?;
        if !ok(&select) {
            return Err(TransportError::CommandFailed {
                command: "SELECT".into(),
                reason: last_line(&select),
            });
        }

        info!(host = %config.host, user = %config.username, "IMAP session established");
        Ok(session)
    }

    /// Ids of unseen messages whose subject contains the filter text.
    fn search_unseen(&mut self, subject: &str) -> Result<Vec<String>, TransportError> {
        let resp = self.command(&format!("SEARCH UNSEEN SUBJECT \"{}\"", quote(subject)))?;
        if !ok(&resp) {
            return Err(TransportError::CommandFailed {
                command: "SEARCH".into(),
                reason: last_line(&resp),
            });
        }

        let mut ids = Vec::new();
        for line in &resp {
            if let Some(rest) = line.strip_prefix("* SEARCH") {
                ids.extend(rest.split_whitespace().map(str::to_string));
            }
        }
        Ok(ids)
    }

    /// Full RFC822 bytes for one message.
    fn fetch_rfc822(&mut self, id: &str) -> Result<Vec<u8>, TransportError> {
        let resp = self.command(&format!("FETCH {id} RFC822"))?;
        if !ok(&resp) {
            return Err(TransportError::FetchFailed {
                id: id.to_string(),
                reason: last_line(&resp),
            });
        }

        // Untagged FETCH line first, tagged completion last; the message
        // literal is everything in between.
        let raw: String = resp
            .iter()
            .skip(1)
            .take(resp.len().saturating_sub(2))
            .cloned()
            .collect();
        Ok(raw.into_bytes())
    }

    /// Flag a message `\Seen`.
    fn store_seen(&mut self, id: &str) -> Result<(), TransportError> {
        let resp = self.command(&format!("STORE {id} +FLAGS (\\Seen)"))?;
        if !ok(&resp) {
            return Err(TransportError::CommandFailed {
                command: "STORE".into(),
                reason: last_line(&resp),
            });
        }
        Ok(())
    }

    /// Send a tagged command and read lines through the tagged response.
    fn command(&mut self, cmd: &str) -> Result<Vec<String>, TransportError> {
        self.tag_counter += 1;
        let tag = format!("A{}", self.tag_counter);
        let full = format!("{tag} {cmd}\r\n");
        self.tls.write_all(full.as_bytes())?;
        self.tls.flush()?;

        let mut lines = Vec::new();
        loop {
            let line = self.read_line()?;
            let done = line.starts_with(&tag);
            lines.push(line);
            if done {
                return Ok(lines);
            }
        }
    }

    fn read_line(&mut self) -> Result<String, TransportError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match self.tls.read(&mut byte) {
                Ok(0) => return Err(TransportError::ConnectionClosed),
                Ok(_) => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).to_string());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for ImapSession {
    fn drop(&mut self) {
        let _ = self.command("LOGOUT");
    }
}

/// Escape quotes and backslashes for an IMAP quoted string.
fn quote(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn ok(lines: &[String]) -> bool {
    lines
        .last()
        .is_some_and(|l| l.split_whitespace().nth(1) == Some("OK"))
}

fn last_line(lines: &[String]) -> String {
    lines.last().map(|l| l.trim().to_string()).unwrap_or_default()
}
