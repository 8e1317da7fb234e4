//! RouterOS API client, spec.md §4.3/§6: plain-text login (no TLS) over TCP
//! port 8728, then arbitrary `/path` command dispatch.

mod protocol;
pub mod parse;

pub use protocol::{RouterOsError, RouterOsResult, Row};

use std::net::IpAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// A logged-in connection to a single device's RouterOS API.
pub struct RouterOsClient {
    stream: TcpStream,
}

impl RouterOsClient {
    /// Connects and logs in. Modern (post-6.43) RouterOS accepts the
    /// username/password in a single `/login` sentence — no MD5
    /// challenge-response round trip is needed.
    pub async fn connect(
        ip: IpAddr,
        port: u16,
        username: &str,
        password: &str,
        connect_timeout: Duration,
    ) -> RouterOsResult<Self> {
        let stream = timeout(connect_timeout, TcpStream::connect((ip, port)))
            .await
            .map_err(|_| RouterOsError::Io(std::io::Error::from(std::io::ErrorKind::TimedOut)))??;

        let mut client = Self { stream };
        client.login(username, password).await?;
        Ok(client)
    }

    async fn login(&mut self, username: &str, password: &str) -> RouterOsResult<()> {
        let words = vec![
            "/login".to_string(),
            format!("=name={username}"),
            format!("=password={password}"),
        ];
        protocol::write_sentence(&mut self.stream, &words).await?;

        let reply = protocol::read_sentence(&mut self.stream).await?;
        match reply.first().map(String::as_str) {
            Some("!done") => Ok(()),
            Some("!trap") => Err(RouterOsError::LoginFailed(trap_message(&reply))),
            other => Err(RouterOsError::LoginFailed(format!(
                "unexpected login reply: {other:?}"
            ))),
        }
    }

    /// Issues `path` with `args` (each already `key=value`, without the
    /// leading `=`) and collects every `!re` row until `!done`/`!trap`.
    pub async fn command(&mut self, path: &str, args: &[&str]) -> RouterOsResult<Vec<Row>> {
        let mut words = vec![path.to_string()];
        words.extend(args.iter().map(|a| format!("={a}")));
        protocol::write_sentence(&mut self.stream, &words).await?;

        let mut rows = Vec::new();
        loop {
            let reply = protocol::read_sentence(&mut self.stream).await?;
            match reply.first().map(String::as_str) {
                Some("!re") => rows.push(protocol::words_to_row(&reply[1..])),
                Some("!done") => break,
                Some("!trap") => return Err(RouterOsError::Trapped(trap_message(&reply))),
                _ => break,
            }
        }
        Ok(rows)
    }
}

fn trap_message(words: &[String]) -> String {
    protocol::words_to_row(&words[1..])
        .get("message")
        .cloned()
        .unwrap_or_else(|| "unknown error".to_string())
}
